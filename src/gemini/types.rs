//! Wire types of the Generative Language REST API.
//!
//! Field names follow the vendor's camelCase JSON. Optional fields are
//! skipped when unset so request bodies stay minimal.

use serde::{Deserialize, Serialize};

// ── Content ───────────────────────────────────────────────────

/// Inline binary payload (base64 encoded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME type, e.g. `image/png` or `audio/pcm;rate=16000`.
    pub mime_type: String,
    /// Standard base64 data.
    pub data: String,
}

/// A function invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Call identifier (live sessions only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Declared function name.
    pub name: String,
    /// Arguments object.
    #[serde(default)]
    pub args: serde_json::Value,
}

impl FunctionCall {
    /// String argument `key`, or empty when missing or not a string.
    pub fn str_arg(&self, key: &str) -> &str {
        self.args.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }
}

/// The result of a function call, sent back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// Identifier of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name.
    pub name: String,
    /// Result object.
    pub response: serde_json::Value,
}

/// One part of a content turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Inline binary data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
    /// Function call from the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// Function result to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    /// Marks internal reasoning text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl Part {
    /// A text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// An inline-data part.
    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            inline_data: Some(Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
            ..Self::default()
        }
    }

    fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

/// A turn of conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// `user` or `model`. Omitted for system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Ordered parts.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn with the given parts.
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_owned()),
            parts,
        }
    }

    /// A user turn with a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::text(text)])
    }

    /// A role-less content block, as used for system instructions.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }
}

// ── Tools ─────────────────────────────────────────────────────

/// Declaration of a callable function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name.
    pub name: String,
    /// What the function does.
    pub description: String,
    /// OpenAPI-style parameter schema.
    pub parameters: serde_json::Value,
}

/// Marker for the vendor's built-in web search grounding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleSearch {}

/// A tool made available to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Function declarations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_declarations: Option<Vec<FunctionDeclaration>>,
    /// Web search grounding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_search: Option<GoogleSearch>,
}

impl Tool {
    /// A tool carrying function declarations.
    pub fn functions(declarations: Vec<FunctionDeclaration>) -> Self {
        Self {
            function_declarations: Some(declarations),
            google_search: None,
        }
    }

    /// The built-in search tool.
    pub fn google_search() -> Self {
        Self {
            function_declarations: None,
            google_search: Some(GoogleSearch {}),
        }
    }

    /// Whether this tool declares any function.
    pub fn has_functions(&self) -> bool {
        self.function_declarations
            .as_ref()
            .is_some_and(|d| !d.is_empty())
    }
}

// ── Generation config ─────────────────────────────────────────

/// Reasoning budget control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Token budget; 0 disables thinking.
    pub thinking_budget: i32,
}

/// Image output shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    /// Aspect ratio such as `1:1`.
    pub aspect_ratio: String,
}

/// Prebuilt voice selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    /// Voice name, e.g. `Kore`.
    pub voice_name: String,
}

/// Voice selection wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    /// Prebuilt voice.
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

/// Speech output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Voice selection.
    pub voice_config: VoiceConfig,
}

impl SpeechConfig {
    /// Speech config for a prebuilt voice.
    pub fn prebuilt(voice_name: impl Into<String>) -> Self {
        Self {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.into(),
                },
            },
        }
    }
}

/// Sampling and output controls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Reasoning budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
    /// Image output shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
    /// Output modalities, e.g. `["AUDIO"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    /// Speech output settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

// ── Requests & responses ──────────────────────────────────────

/// Body of `generateContent` and `streamGenerateContent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation turns.
    pub contents: Vec<Content>,
    /// System instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    /// Generation settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// A web source cited by grounded search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSource {
    /// Source URI.
    #[serde(default)]
    pub uri: Option<String>,
    /// Page title.
    #[serde(default)]
    pub title: Option<String>,
}

/// One grounding chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingChunk {
    /// Web source, when the chunk came from search.
    #[serde(default)]
    pub web: Option<WebSource>,
}

/// Search grounding attached to a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    /// Cited chunks.
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

/// One generated candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content.
    #[serde(default)]
    pub content: Option<Content>,
    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Search grounding.
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

/// Response of `generateContent`, or one chunk of a streamed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidates; the first one is used.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    /// Concatenated non-thought text of the first candidate.
    pub fn text(&self) -> String {
        self.parts()
            .filter(|p| !p.is_thought())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }

    /// Function calls of the first candidate, in order.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts()
            .filter_map(|p| p.function_call.as_ref())
            .collect()
    }

    /// First inline data blob of the first candidate.
    pub fn first_inline_data(&self) -> Option<&Blob> {
        self.parts().find_map(|p| p.inline_data.as_ref())
    }

    /// Grounding source URIs, deduplicated in first-seen order.
    pub fn grounding_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = Vec::new();
        let chunks = self
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|g| g.grounding_chunks.as_slice())
            .unwrap_or_default();
        for uri in chunks
            .iter()
            .filter_map(|c| c.web.as_ref().and_then(|w| w.uri.as_ref()))
        {
            if !uris.contains(uri) {
                uris.push(uri.clone());
            }
        }
        uris
    }
}

// ── Long-running video generation ─────────────────────────────

/// One video prompt instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInstance {
    /// Text prompt.
    pub prompt: String,
}

/// Video generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParameters {
    /// Number of videos.
    pub sample_count: u32,
    /// Resolution such as `1080p`.
    pub resolution: String,
    /// Aspect ratio such as `16:9`.
    pub aspect_ratio: String,
}

/// Body of `predictLongRunning`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRequest {
    /// Prompt instances.
    pub instances: Vec<VideoInstance>,
    /// Generation parameters.
    pub parameters: VideoParameters,
}

/// Reference to a generated file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFile {
    /// Download URI (requires the API key).
    #[serde(default)]
    pub uri: Option<String>,
}

/// One generated video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSample {
    /// The video file.
    #[serde(default)]
    pub video: Option<VideoFile>,
}

/// Result payload of a finished video operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    /// Generated samples.
    #[serde(default)]
    pub generated_samples: Vec<GeneratedSample>,
}

/// Operation response wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    /// Video result.
    #[serde(default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

/// Error reported by a failed operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// Status code.
    #[serde(default)]
    pub code: i32,
    /// Message.
    #[serde(default)]
    pub message: String,
}

/// A long-running operation handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Resource name, polled via `GET {base}/{name}`.
    pub name: String,
    /// Whether the operation has finished.
    #[serde(default)]
    pub done: bool,
    /// Result, when done and successful.
    #[serde(default)]
    pub response: Option<OperationResponse>,
    /// Failure, when done and unsuccessful.
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl Operation {
    /// URI of the first generated video.
    pub fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .iter()
            .find_map(|s| s.video.as_ref()?.uri.as_deref())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_camel_case_and_skips_empty() {
        let request = GenerateContentRequest {
            contents: vec![Content::user_text("hi")],
            system_instruction: Some(Content::system("be brief")),
            tools: Vec::new(),
            generation_config: Some(GenerationConfig {
                temperature: Some(0.0),
                thinking_config: Some(ThinkingConfig { thinking_budget: 0 }),
                ..GenerationConfig::default()
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(value["systemInstruction"].get("role").is_none());
        assert!(value.get("tools").is_none());
        assert_eq!(
            value["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            0
        );
    }

    #[test]
    fn google_search_tool_serializes_as_empty_object() {
        let value = serde_json::to_value(Tool::google_search()).unwrap();
        assert_eq!(value, json!({ "googleSearch": {} }));
        assert!(!Tool::google_search().has_functions());
    }

    #[test]
    fn response_helpers_extract_text_calls_and_sources() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "Hello " },
                    { "text": "world" },
                    { "functionCall": { "name": "setAlarm", "args": { "time": "5 PM", "label": "call mom" } } },
                    { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
                ]},
                "groundingMetadata": { "groundingChunks": [
                    { "web": { "uri": "https://a.example", "title": "A" } },
                    { "web": { "uri": "https://b.example" } },
                    { "web": { "uri": "https://a.example" } },
                    {}
                ]}
            }]
        }))
        .unwrap();

        assert_eq!(response.text(), "Hello world");
        let calls = response.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].str_arg("time"), "5 PM");
        assert_eq!(calls[0].str_arg("missing"), "");
        assert_eq!(response.first_inline_data().unwrap().mime_type, "image/png");
        assert_eq!(
            response.grounding_uris(),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn empty_response_has_no_text() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text(), "");
        assert!(response.function_calls().is_empty());
        assert!(response.grounding_uris().is_empty());
    }

    #[test]
    fn operation_exposes_video_uri() {
        let op: Operation = serde_json::from_value(json!({
            "name": "models/veo/operations/abc",
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "uri": "https://files.example/v.mp4?alt=media" } }
            ]}}
        }))
        .unwrap();
        assert_eq!(op.video_uri(), Some("https://files.example/v.mp4?alt=media"));

        let pending: Operation = serde_json::from_value(json!({ "name": "op" })).unwrap();
        assert!(!pending.done);
        assert_eq!(pending.video_uri(), None);
    }
}
