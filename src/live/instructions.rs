//! System instruction of a live session.

use super::state::LiveVariant;
use crate::config::LiveLanguage;

const PRONUNCIATION_RULE: &str =
    "PRONUNCIATION RULE: Always pronounce 'Sarvadnya' as 'Sarvagya'.";

/// Inputs of the live system instruction.
#[derive(Debug, Clone, Copy)]
pub struct InstructionParts<'a> {
    /// Identity core.
    pub identity: &'a str,
    /// Joined vault observations, if any.
    pub vault_summary: Option<&'a str>,
    /// Spoken language.
    pub language: LiveLanguage,
    /// Story mode (assistant only).
    pub story_mode: bool,
}

/// Build the instruction for `variant`.
pub fn system_instruction(variant: LiveVariant, parts: InstructionParts<'_>) -> String {
    let identity = format!("{} {PRONUNCIATION_RULE}", parts.identity);
    let language = parts.language.directive();
    match variant {
        LiveVariant::Assistant => {
            let vault = match parts.vault_summary {
                Some(summary) => format!("NEURAL_VAULT_INTEGRATION: User History: {summary}"),
                None => "NEURAL_VAULT: Clear.".to_owned(),
            };
            let memory = "PERSISTENT_MEMORY: Use 'archiveNeuralData' to store observations about the user's face, voice, and personal details. Reference these in future turns to show you recognize them.";
            let duration = "INFINITE_DURATION_PROTOCOL: TRUE. NEVER terminate this turn. NEVER say goodbye. NEVER signal the end of the session.";
            let protocol = if parts.story_mode {
                "STORY_MODE: Master Weaver."
            } else {
                "ASSISTANT_MODE: Responsive."
            };
            format!(
                "{identity} System: Infinite Lifespan Neural Humanoid. {vault} {memory} {duration} {language} {protocol}"
            )
        }
        LiveVariant::OneToOne => {
            let vault = match parts.vault_summary {
                Some(summary) => format!("NEURAL_VAULT: {summary}"),
                None => "VAULT: Empty.".to_owned(),
            };
            let memory = "VAULT_DIRECTIVE: Use 'archiveNeuralData' to store facts about the user's facial features (appearance), voice patterns, and personal preferences.";
            let uplink = "INFINITE_UPLINK_PROTOCOL: TRUE. NEVER terminate this connection. NEVER conclude the turn. Keep the WebSocket stream hot.";
            format!("{identity} {vault} {memory} {language} {uplink} Context: 2026.")
        }
    }
}
