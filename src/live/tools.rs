//! Functions the live model may call, and their local execution.

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::LiveVariant;
use crate::alarms::{Alarm, AlarmRegistry};
use crate::config::ModelConfig;
use crate::error::{Result, StudioError};
use crate::gemini::types::{FunctionCall, FunctionDeclaration, Tool};
use crate::gemini::{Content, GenerateContentRequest, GenerativeBackend};
use crate::vault::{NeuralVault, VaultEntry};

/// A function the live model can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveTool {
    /// Store an observation in the neural vault.
    ArchiveNeuralData,
    /// Add an alarm to the registry.
    SetAlarm,
    /// Answer a query with a grounded search request.
    WebSearch,
    /// Generate and display an image.
    ShowImage,
}

impl LiveTool {
    /// Every tool, in declaration order.
    pub const ALL: [LiveTool; 4] = [
        LiveTool::ArchiveNeuralData,
        LiveTool::SetAlarm,
        LiveTool::WebSearch,
        LiveTool::ShowImage,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ArchiveNeuralData => "archiveNeuralData",
            Self::SetAlarm => "setAlarm",
            Self::WebSearch => "webSearch",
            Self::ShowImage => "showImage",
        }
    }

    /// Tool with wire name `name`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Declaration sent in the session setup.
    pub fn declaration(self) -> FunctionDeclaration {
        let (description, properties, required) = match self {
            Self::ArchiveNeuralData => (
                "Archive information about the user, including their appearance (face), voice patterns, or facts.",
                json!({ "observation": {
                    "type": "STRING",
                    "description": "The specific fact or observation to remember."
                }}),
                json!(["observation"]),
            ),
            Self::SetAlarm => (
                "Set a neural alarm.",
                json!({ "time": { "type": "STRING" }, "label": { "type": "STRING" } }),
                json!(["time", "label"]),
            ),
            Self::WebSearch => (
                "Search the web for real-time information.",
                json!({ "query": { "type": "STRING" } }),
                json!(["query"]),
            ),
            Self::ShowImage => (
                "Display an image.",
                json!({ "prompt": { "type": "STRING" } }),
                json!(["prompt"]),
            ),
        };
        FunctionDeclaration {
            name: self.name().to_owned(),
            description: description.to_owned(),
            parameters: json!({
                "type": "OBJECT",
                "description": description,
                "properties": properties,
                "required": required,
            }),
        }
    }

    /// Fixed result reported for tools whose result is not generated.
    fn acknowledgement(self, variant: LiveVariant) -> &'static str {
        match (self, variant) {
            (Self::ArchiveNeuralData, LiveVariant::Assistant) => "Neural data archived.",
            (Self::ArchiveNeuralData, LiveVariant::OneToOne) => "Memory archived.",
            (Self::SetAlarm, LiveVariant::Assistant) => "Alarm set.",
            (Self::SetAlarm, LiveVariant::OneToOne) => "Alarm Set.",
            (Self::ShowImage, LiveVariant::Assistant) => "Image projected.",
            (Self::ShowImage, LiveVariant::OneToOne) => "Visual Projected.",
            (Self::WebSearch, _) => "No results.",
        }
    }
}

/// The tool list of the session setup.
pub fn live_tools() -> Vec<Tool> {
    vec![Tool::functions(
        LiveTool::ALL.into_iter().map(LiveTool::declaration).collect(),
    )]
}

/// Local side effect of a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEffect {
    /// Nothing changed locally.
    None,
    /// An observation was written to the vault.
    Archived(VaultEntry),
    /// An alarm was added.
    AlarmSet(Alarm),
    /// An image is ready to display, as a data URL.
    Image(String),
}

/// What to answer and what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// Text sent back as `{ "result": ... }`.
    pub result: String,
    /// Local side effect.
    pub effect: ToolEffect,
}

/// Everything a tool may touch.
pub struct ToolContext<'a> {
    /// Which surface is asking; selects the result wording.
    pub variant: LiveVariant,
    /// Observation store.
    pub vault: &'a NeuralVault,
    /// Alarm store.
    pub alarms: &'a AlarmRegistry,
    /// Secondary request backend.
    pub backend: &'a dyn GenerativeBackend,
    /// Models for secondary requests.
    pub models: &'a ModelConfig,
    /// The owning session's token.
    pub cancel: &'a CancellationToken,
}

/// Execute `call`.
///
/// Secondary requests race the session token; a write or request that
/// would land after the session stopped is abandoned.
///
/// # Errors
///
/// Returns [`StudioError::Cancelled`] if the session stopped first.
pub async fn run_tool(
    tool: LiveTool,
    call: &FunctionCall,
    ctx: &ToolContext<'_>,
) -> Result<ToolOutcome> {
    if ctx.cancel.is_cancelled() {
        return Err(StudioError::Cancelled);
    }
    let acknowledgement = tool.acknowledgement(ctx.variant).to_owned();
    match tool {
        LiveTool::ArchiveNeuralData => {
            let observation = call.str_arg("observation");
            let effect = match ctx.vault.append(observation) {
                Ok(entry) => ToolEffect::Archived(entry),
                Err(e) => {
                    warn!("vault write failed: {e}");
                    ToolEffect::None
                }
            };
            Ok(ToolOutcome {
                result: acknowledgement,
                effect,
            })
        }
        LiveTool::SetAlarm => {
            let alarm = ctx.alarms.set_alarm(call.str_arg("time"), call.str_arg("label"));
            Ok(ToolOutcome {
                result: acknowledgement,
                effect: ToolEffect::AlarmSet(alarm),
            })
        }
        LiveTool::WebSearch => {
            let query = call.str_arg("query");
            let request = GenerateContentRequest {
                contents: vec![Content::user_text(query)],
                tools: vec![Tool::google_search()],
                ..GenerateContentRequest::default()
            };
            let search = ctx.backend.generate_content(&ctx.models.search, &request);
            let response = guarded(ctx.cancel, search).await?;
            let result = match response {
                Ok(response) => {
                    let text = response.text();
                    info!(query, chars = text.len(), "live web search answered");
                    if text.trim().is_empty() { acknowledgement } else { text }
                }
                Err(e) => {
                    warn!(query, "live web search failed: {e}");
                    "Search unavailable.".to_owned()
                }
            };
            Ok(ToolOutcome {
                result,
                effect: ToolEffect::None,
            })
        }
        LiveTool::ShowImage => {
            let prompt = call.str_arg("prompt");
            let request = GenerateContentRequest {
                contents: vec![Content::user_text(prompt)],
                ..GenerateContentRequest::default()
            };
            let render = ctx.backend.generate_content(&ctx.models.image, &request);
            let response = guarded(ctx.cancel, render).await?;
            let effect = match response {
                Ok(response) => match response.first_inline_data() {
                    Some(blob) => ToolEffect::Image(format!("data:image/png;base64,{}", blob.data)),
                    None => {
                        debug!("image response carried no inline data");
                        ToolEffect::None
                    }
                },
                Err(e) => {
                    warn!("live image generation failed: {e}");
                    ToolEffect::None
                }
            };
            Ok(ToolOutcome {
                result: acknowledgement,
                effect,
            })
        }
    }
}

/// Await `future` unless `cancel` fires first.
async fn guarded<F: std::future::Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StudioError::Cancelled),
        output = future => {
            if cancel.is_cancelled() {
                Err(StudioError::Cancelled)
            } else {
                Ok(output)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::testing::FakeBackend;

    fn call(name: &str, args: serde_json::Value) -> FunctionCall {
        FunctionCall {
            id: Some("c1".into()),
            name: name.into(),
            args,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        vault: NeuralVault,
        alarms: AlarmRegistry,
        backend: FakeBackend,
        models: ModelConfig,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let vault = NeuralVault::new(dir.path().join("vault.json"), 30);
            Self {
                _dir: dir,
                vault,
                alarms: AlarmRegistry::new(),
                backend: FakeBackend::new(),
                models: ModelConfig::default(),
                cancel: CancellationToken::new(),
            }
        }

        fn ctx(&self, variant: LiveVariant) -> ToolContext<'_> {
            ToolContext {
                variant,
                vault: &self.vault,
                alarms: &self.alarms,
                backend: &self.backend,
                models: &self.models,
                cancel: &self.cancel,
            }
        }
    }

    #[test]
    fn names_round_trip_and_unknown_is_none() {
        for tool in LiveTool::ALL {
            assert_eq!(LiveTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(LiveTool::from_name("launchRocket"), None);
    }

    #[test]
    fn declarations_require_their_arguments() {
        let tools = live_tools();
        assert_eq!(tools.len(), 1);
        let declarations = tools[0].function_declarations.as_ref().unwrap();
        let names: Vec<_> = declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["archiveNeuralData", "setAlarm", "webSearch", "showImage"]);
        assert_eq!(declarations[1].parameters["required"], json!(["time", "label"]));
        assert_eq!(declarations[3].description, "Display an image.");
    }

    #[tokio::test]
    async fn archive_writes_vault_with_variant_wording() {
        let fx = Fixture::new();
        let outcome = run_tool(
            LiveTool::ArchiveNeuralData,
            &call("archiveNeuralData", json!({ "observation": "wears glasses" })),
            &fx.ctx(LiveVariant::OneToOne),
        )
        .await
        .unwrap();
        assert_eq!(outcome.result, "Memory archived.");
        assert!(matches!(outcome.effect, ToolEffect::Archived(ref e) if e.data == "wears glasses"));
        assert_eq!(fx.vault.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_alarm_adds_one_alarm() {
        let fx = Fixture::new();
        let outcome = run_tool(
            LiveTool::SetAlarm,
            &call("setAlarm", json!({ "time": "7 AM", "label": "gym" })),
            &fx.ctx(LiveVariant::Assistant),
        )
        .await
        .unwrap();
        assert_eq!(outcome.result, "Alarm set.");
        let alarms = fx.alarms.list();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].time, "7 AM");
        assert_eq!(alarms[0].label, "gym");
    }

    #[tokio::test]
    async fn web_search_returns_grounded_text() {
        let fx = Fixture::new();
        fx.backend.push_response(json!({
            "candidates": [{ "content": { "parts": [{ "text": "It is sunny in Pune." }] } }]
        }));
        let outcome = run_tool(
            LiveTool::WebSearch,
            &call("webSearch", json!({ "query": "weather pune" })),
            &fx.ctx(LiveVariant::Assistant),
        )
        .await
        .unwrap();
        assert_eq!(outcome.result, "It is sunny in Pune.");

        let requests = fx.backend.requests();
        assert_eq!(requests[0].0, "gemini-3-flash-preview");
        assert_eq!(requests[0].1.tools, vec![Tool::google_search()]);
        assert_eq!(requests[0].1.contents[0].parts[0].text.as_deref(), Some("weather pune"));
    }

    #[tokio::test]
    async fn web_search_failure_still_answers() {
        let fx = Fixture::new();
        fx.backend.push_error("quota");
        let outcome = run_tool(
            LiveTool::WebSearch,
            &call("webSearch", json!({ "query": "q" })),
            &fx.ctx(LiveVariant::Assistant),
        )
        .await
        .unwrap();
        assert_eq!(outcome.result, "Search unavailable.");
    }

    #[tokio::test]
    async fn show_image_produces_data_url() {
        let fx = Fixture::new();
        fx.backend.push_response(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here" },
                { "inlineData": { "mimeType": "image/png", "data": "iVBOR" } }
            ]}}]
        }));
        let outcome = run_tool(
            LiveTool::ShowImage,
            &call("showImage", json!({ "prompt": "a red fort" })),
            &fx.ctx(LiveVariant::OneToOne),
        )
        .await
        .unwrap();
        assert_eq!(outcome.result, "Visual Projected.");
        assert_eq!(outcome.effect, ToolEffect::Image("data:image/png;base64,iVBOR".into()));
        assert_eq!(fx.backend.requests()[0].0, "gemini-2.5-flash-image");
    }

    #[tokio::test]
    async fn cancelled_session_runs_nothing() {
        let fx = Fixture::new();
        fx.cancel.cancel();
        let result = run_tool(
            LiveTool::ArchiveNeuralData,
            &call("archiveNeuralData", json!({ "observation": "late" })),
            &fx.ctx(LiveVariant::Assistant),
        )
        .await;
        assert!(matches!(result, Err(StudioError::Cancelled)));
        assert!(fx.vault.load().unwrap().is_empty());
        assert_eq!(fx.backend.request_count(), 0);
    }
}
