//! Terminal navigation shell.
//!
//! Owns which studio mode is showing and the pending [`Composer`] input, and
//! renders the header and sidebar. Lines starting with `/` are commands;
//! anything else is prompt text for the active panel.
//!
//! - [`auth`]: the simulated sign-in flow shown at startup
//! - [`clock`]: the IST header clock

pub mod auth;
pub mod clock;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::alarms::AlarmRegistry;
use crate::composer::{Composer, ComposedPrompt, EXTENSIONS, MODEL_CHOICES};
use crate::live::LiveVariant;
use crate::panel::profiles::PanelMode;

/// Product name shown in the header.
pub const STUDIO_TITLE: &str = "Sarjo AI Studio";

/// Status line for each extension in the sidebar.
pub const EXTENSION_STATUS: &str = "Sync_On";

/// Command reference printed by `/help`.
pub const HELP_TEXT: &str = "\
Commands:
  /mode <name>     switch mode (home, chat, analyzed, creative, code, vision, live, one-to-one, about)
  /modes           list modes
  /model [id]      show or pick the chat model
  /research        toggle web research
  /attach <path>   attach a file to the next prompt
  /detach <n>      remove attachment n (1-based)
  /ext <id>        tag the next prompt with an extension
  /alarms          list alarms
  /voice           continue in the live assistant
  /help            this text
  /quit            leave the studio";

/// Body of the home screen.
pub const HOME_TEXT: &str = "\
Hello User
Neural Workspace v5.0

Welcome to the high-performance, multi-modal creative engine. Engineered by
Sarvadnya Joshi, this studio provides the world's most direct path from
imagination to digital reality.";

/// Body of the about screen.
pub const ABOUT_TEXT: &str = "\
The Sovereign Architect: Sarvadnya Joshi

The Master of Developers & The King of IT

\"Driven by the vision of global empowerment, Sarvadnya Joshi engineered this
multi-modal intelligence and released it directly into the Public Domain. He
made these AIs for the world to create without limits.\"

ROLE     MASTER OF DEVELOPERS
STATUS   KING OF IT
RELEASE  PUBLIC DOMAIN CORE";

// ── Modes ──

/// A screen of the studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StudioMode {
    /// Landing screen.
    #[default]
    Home,
    /// Normal chat panel.
    NormalChat,
    /// Analytics panel.
    Analyzed,
    /// Image generation panel.
    Creative,
    /// Code generation panel.
    Code,
    /// Vision-to-action panel.
    Vision,
    /// Live voice assistant.
    Live,
    /// Live voice and video session.
    OneToOne,
    /// About the creator.
    About,
}

impl StudioMode {
    /// Modes in sidebar order.
    pub const ALL: [StudioMode; 9] = [
        Self::Home,
        Self::NormalChat,
        Self::Analyzed,
        Self::Creative,
        Self::Code,
        Self::Vision,
        Self::Live,
        Self::OneToOne,
        Self::About,
    ];

    /// Identifier shown in the header badge.
    pub fn id(self) -> &'static str {
        match self {
            Self::Home => "HOME",
            Self::NormalChat => "NORMAL_CHAT",
            Self::Analyzed => "ANALYZED",
            Self::Creative => "CREATIVE",
            Self::Code => "CODE",
            Self::Vision => "VISION",
            Self::Live => "LIVE",
            Self::OneToOne => "ONE_TO_ONE",
            Self::About => "ABOUT",
        }
    }

    /// Sidebar label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Home => "Home",
            Self::NormalChat => "Normal Chat",
            Self::Analyzed => "Analyzed",
            Self::Creative => "Creative",
            Self::Code => "Code",
            Self::Vision => "Vision-to-Action",
            Self::Live => "Live Assistant",
            Self::OneToOne => "Live 1:1",
            Self::About => "About Creator",
        }
    }

    /// Sidebar subtitle.
    pub fn description(self) -> &'static str {
        match self {
            Self::Home => "Neural Core",
            Self::NormalChat => "Conversational AI",
            Self::Analyzed => "Data & Insights",
            Self::Creative => "Visual Generation",
            Self::Code => "Engineering Hub",
            Self::Vision => "Image Analysis",
            Self::Live => "Real-time Voice",
            Self::OneToOne => "Multimodal Vision",
            Self::About => "Master Architect",
        }
    }

    /// The chat panel behind this mode, if any.
    pub fn panel_mode(self) -> Option<PanelMode> {
        match self {
            Self::NormalChat => Some(PanelMode::Chat),
            Self::Analyzed => Some(PanelMode::Analyzed),
            Self::Creative => Some(PanelMode::Creative),
            Self::Code => Some(PanelMode::Code),
            Self::Vision => Some(PanelMode::Vision),
            Self::Home | Self::Live | Self::OneToOne | Self::About => None,
        }
    }

    /// The live session behind this mode, if any.
    pub fn live_variant(self) -> Option<LiveVariant> {
        match self {
            Self::Live => Some(LiveVariant::Assistant),
            Self::OneToOne => Some(LiveVariant::OneToOne),
            _ => None,
        }
    }

    /// Static text of screens without a panel or session.
    pub fn landing_text(self) -> Option<&'static str> {
        match self {
            Self::Home => Some(HOME_TEXT),
            Self::About => Some(ABOUT_TEXT),
            _ => None,
        }
    }

    /// Whether this mode runs a live session.
    pub fn is_live(self) -> bool {
        self.live_variant().is_some()
    }

    /// Parse a mode from its identifier, label or a short alias.
    pub fn parse(name: &str) -> Option<Self> {
        let key = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let mode = match key.as_str() {
            "home" => Self::Home,
            "chat" | "normal" | "normal_chat" => Self::NormalChat,
            "analyzed" | "analytics" => Self::Analyzed,
            "creative" => Self::Creative,
            "code" => Self::Code,
            "vision" | "vision_to_action" => Self::Vision,
            "live" | "assistant" | "live_assistant" => Self::Live,
            "one_to_one" | "1:1" | "live_1:1" => Self::OneToOne,
            "about" | "about_creator" => Self::About,
            _ => return None,
        };
        Some(mode)
    }
}

impl fmt::Display for StudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// ── Commands ──

/// A slash command typed into the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Switch mode.
    Mode(StudioMode),
    /// List modes.
    Modes,
    /// Show the model list, or select one.
    Model(Option<String>),
    /// Toggle the research flag.
    Research,
    /// Attach a file.
    Attach(PathBuf),
    /// Remove an attachment by zero-based index.
    Detach(usize),
    /// Tag the next prompt with an extension.
    Ext(String),
    /// List alarms.
    Alarms,
    /// Jump to the live assistant.
    Voice,
    /// Print the command reference.
    Help,
    /// Leave the studio.
    Quit,
}

/// Why a command line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Not a known command.
    #[error("unknown command '/{0}' (try /help)")]
    Unknown(String),
    /// A required argument is missing.
    #[error("/{command} needs {argument}")]
    MissingArgument {
        /// Command name.
        command: &'static str,
        /// What was expected.
        argument: &'static str,
    },
    /// `/mode` named no known mode.
    #[error("unknown mode '{0}' (try /modes)")]
    UnknownMode(String),
    /// `/model` named no known model.
    #[error("unknown model '{0}' (try /model)")]
    UnknownModel(String),
    /// `/ext` named no known extension.
    #[error("unknown extension '{0}'")]
    UnknownExtension(String),
    /// `/detach` got something other than a 1-based index.
    #[error("'{0}' is not an attachment number")]
    BadIndex(String),
}

impl ShellCommand {
    /// Parse a line. Returns `None` when the line is prompt text rather than a command.
    pub fn parse(line: &str) -> Option<Result<Self, CommandError>> {
        let body = line.trim().strip_prefix('/')?;
        let (name, arg) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        let arg = (!arg.is_empty()).then_some(arg);
        Some(Self::from_parts(name, arg))
    }

    fn from_parts(name: &str, arg: Option<&str>) -> Result<Self, CommandError> {
        let command = match name {
            "mode" => {
                let arg = arg.ok_or(CommandError::MissingArgument {
                    command: "mode",
                    argument: "a mode name",
                })?;
                let mode =
                    StudioMode::parse(arg).ok_or_else(|| CommandError::UnknownMode(arg.to_owned()))?;
                Self::Mode(mode)
            }
            "modes" => Self::Modes,
            "model" => match arg {
                Some(id) if !MODEL_CHOICES.iter().any(|choice| choice.id == id) => {
                    return Err(CommandError::UnknownModel(id.to_owned()));
                }
                other => Self::Model(other.map(str::to_owned)),
            },
            "research" => Self::Research,
            "attach" => Self::Attach(PathBuf::from(arg.ok_or(CommandError::MissingArgument {
                command: "attach",
                argument: "a file path",
            })?)),
            "detach" => {
                let arg = arg.ok_or(CommandError::MissingArgument {
                    command: "detach",
                    argument: "an attachment number",
                })?;
                match arg.parse::<usize>() {
                    Ok(n) if n >= 1 => Self::Detach(n - 1),
                    _ => return Err(CommandError::BadIndex(arg.to_owned())),
                }
            }
            "ext" => {
                let arg = arg.ok_or(CommandError::MissingArgument {
                    command: "ext",
                    argument: "an extension id",
                })?;
                let id = arg.trim_start_matches('@').to_ascii_lowercase();
                if !EXTENSIONS.iter().any(|ext| ext.id == id) {
                    return Err(CommandError::UnknownExtension(arg.to_owned()));
                }
                Self::Ext(id)
            }
            "alarms" => Self::Alarms,
            "voice" => Self::Voice,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_owned())),
        };
        Ok(command)
    }
}

/// What the shell did with a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellReply {
    /// Text to show the user.
    Message(String),
    /// The active mode changed.
    Switched(StudioMode),
    /// The user asked to leave.
    Quit,
}

// ── Shell ──

/// Navigation and composer state of one studio window.
#[derive(Debug, Clone)]
pub struct Shell {
    mode: StudioMode,
    alarms: AlarmRegistry,
    composer: Composer,
}

impl Shell {
    /// A shell on the home screen sharing `alarms` with every panel and session.
    pub fn new(alarms: AlarmRegistry) -> Self {
        Self {
            mode: StudioMode::Home,
            alarms,
            composer: Composer::new(),
        }
    }

    /// Active mode.
    pub fn mode(&self) -> StudioMode {
        self.mode
    }

    /// Shared alarm registry.
    pub fn alarms(&self) -> &AlarmRegistry {
        &self.alarms
    }

    /// Pending composer state.
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Switch to `mode`. Returns `false` if it was already active.
    pub fn switch(&mut self, mode: StudioMode) -> bool {
        if self.mode == mode {
            return false;
        }
        info!(from = %self.mode, to = %mode, "mode switched");
        self.mode = mode;
        true
    }

    /// Package `text` plus pending attachments for the active panel.
    ///
    /// Returns `None` when there is nothing to send or `in_flight` is set.
    pub fn compose(&mut self, text: &str, in_flight: bool) -> Option<ComposedPrompt> {
        self.composer.set_text(text);
        self.composer.submit(in_flight)
    }

    /// Apply a command.
    pub fn execute(&mut self, command: ShellCommand) -> ShellReply {
        debug!(?command, "shell command");
        match command {
            ShellCommand::Mode(mode) => {
                self.switch(mode);
                ShellReply::Switched(mode)
            }
            ShellCommand::Voice => {
                self.switch(StudioMode::Live);
                ShellReply::Switched(StudioMode::Live)
            }
            ShellCommand::Modes => ShellReply::Message(self.sidebar().join("\n")),
            ShellCommand::Model(Some(id)) => {
                self.composer.set_model(&id);
                ShellReply::Message(format!("model: {id}"))
            }
            ShellCommand::Model(None) => ShellReply::Message(self.model_list()),
            ShellCommand::Research => {
                let on = self.composer.toggle_research();
                ShellReply::Message(format!("research {}", if on { "on" } else { "off" }))
            }
            ShellCommand::Attach(path) => match self.composer.attach_path(&path) {
                Ok(0) => ShellReply::Message("attachment limit reached".into()),
                Ok(_) => ShellReply::Message(format!(
                    "attached {} ({} pending)",
                    path.display(),
                    self.composer.attachments().len()
                )),
                Err(e) => ShellReply::Message(format!("cannot attach {}: {e}", path.display())),
            },
            ShellCommand::Detach(index) => match self.composer.detach(index) {
                Some(removed) => ShellReply::Message(format!("removed {}", removed.name)),
                None => ShellReply::Message(format!("no attachment {}", index + 1)),
            },
            ShellCommand::Ext(id) => {
                self.composer.set_text("@");
                self.composer.select_extension(&id);
                ShellReply::Message(format!("next prompt tagged @{id}"))
            }
            ShellCommand::Alarms => ShellReply::Message(self.alarm_list()),
            ShellCommand::Help => ShellReply::Message(HELP_TEXT.to_owned()),
            ShellCommand::Quit => ShellReply::Quit,
        }
    }

    // ── Rendering ──

    /// Header line: title, alarm count, clock and mode badge.
    pub fn header(&self, now: DateTime<Utc>) -> String {
        let mut parts = vec![STUDIO_TITLE.to_owned()];
        let alarms = self.alarms.len();
        if alarms > 0 {
            parts.push(format!("🔔 {alarms} ACTIVE ALARMS"));
        }
        parts.push(format!("{} {}", clock::CLOCK_LABEL, clock::format_ist(now)));
        parts.push(format!("{} MODE", self.mode.id()));
        parts.join(" | ")
    }

    /// Sidebar: modes with the active one marked, alarms, then extensions.
    pub fn sidebar(&self) -> Vec<String> {
        let mut lines: Vec<String> = StudioMode::ALL
            .iter()
            .map(|&mode| {
                let marker = if mode == self.mode { '>' } else { ' ' };
                format!("{marker} {:<18} {}", mode.label(), mode.description())
            })
            .collect();

        let alarms = self.alarms.list();
        if !alarms.is_empty() {
            lines.push(String::new());
            lines.push("Neural Alarms".to_owned());
            lines.extend(alarms.iter().map(|alarm| {
                format!("  {}  {}", alarm.time.to_uppercase(), alarm.label.to_uppercase())
            }));
        }

        lines.push(String::new());
        lines.push("Extensions".to_owned());
        lines.extend(
            EXTENSIONS
                .iter()
                .map(|ext| format!("  {:<12} {EXTENSION_STATUS}", ext.name)),
        );
        lines
    }

    fn model_list(&self) -> String {
        MODEL_CHOICES
            .iter()
            .map(|choice| {
                let marker = if choice.id == self.composer.model() { '*' } else { ' ' };
                format!("{marker} {:<28} {} [{}]", choice.id, choice.name, choice.badge)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn alarm_list(&self) -> String {
        let alarms = self.alarms.list();
        if alarms.is_empty() {
            return "no alarms".to_owned();
        }
        alarms
            .iter()
            .map(|alarm| format!("{}  {}  ({})", alarm.time, alarm.label, alarm.id))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
