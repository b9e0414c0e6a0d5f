//! Per-mode configuration of the generic chat panel.
//!
//! A [`ModeProfile`] holds everything that differs between the five chat
//! modes: welcome text, system directive, model and sampling settings,
//! declared tools, request shape, rendering strategy and fallback text.

use serde_json::json;

use crate::composer::ComposedPrompt;
use crate::config::ModelConfig;
use crate::gemini::types::{
    Content, FunctionDeclaration, GenerateContentRequest, GenerationConfig, ImageConfig, Part,
    ThinkingConfig, Tool,
};

/// Name of the alarm function declared to the model.
pub const SET_ALARM_FUNCTION: &str = "setAlarm";

/// Reply used when a one-shot response carries neither text nor a function call.
pub const EMPTY_REPLY: &str = "Task completed.";

/// Fixed reply of the creative mode when asked for motion content.
pub const VIDEO_PENDING_REPLY: &str = "Video generation pending activation.";

/// Text sent to the vision mode when the prompt has only attachments.
pub const DEFAULT_VISION_PROMPT: &str = "Technical analysis of this visual input.";

/// The five chat modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelMode {
    /// Normal chat.
    Chat,
    /// Analytics with date grounding.
    Analyzed,
    /// Image generation.
    Creative,
    /// Code generation.
    Code,
    /// Image analysis.
    Vision,
}

impl PanelMode {
    /// All chat modes in sidebar order.
    pub const ALL: [PanelMode; 5] = [
        PanelMode::Chat,
        PanelMode::Analyzed,
        PanelMode::Creative,
        PanelMode::Code,
        PanelMode::Vision,
    ];

    /// Short label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Chat => "Chat",
            Self::Analyzed => "Analyzed",
            Self::Creative => "Creative",
            Self::Code => "Code",
            Self::Vision => "Vision",
        }
    }
}

/// How the `setAlarm` function is described to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmToolSpec {
    /// Function description.
    pub description: &'static str,
    /// `time` parameter description.
    pub time_description: &'static str,
    /// `label` parameter description.
    pub label_description: &'static str,
    /// Confirmation template with `{time}` and `{label}` placeholders.
    pub confirmation: &'static str,
}

impl AlarmToolSpec {
    /// The function declaration sent to the model.
    pub fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: SET_ALARM_FUNCTION.to_owned(),
            description: self.description.to_owned(),
            parameters: json!({
                "type": "OBJECT",
                "description": self.description,
                "properties": {
                    "time": { "type": "STRING", "description": self.time_description },
                    "label": { "type": "STRING", "description": self.label_description },
                },
                "required": ["time", "label"],
            }),
        }
    }

    /// Confirmation message naming the alarm time and label.
    pub fn confirm(&self, time: &str, label: &str) -> String {
        self.confirmation
            .replace("{time}", time)
            .replace("{label}", label)
    }
}

/// How the user's text becomes the request text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptShape {
    /// Sent as typed.
    Plain,
    /// Wrapped with the date context line.
    DateContext,
    /// Sent as typed, or a default when blank.
    DefaultWhenBlank(&'static str),
}

impl PromptShape {
    /// Apply the shape to `text`.
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Plain => text.to_owned(),
            Self::DateContext => format!("Current Date Context: 2025/2026. Task: {text}"),
            Self::DefaultWhenBlank(default) if text.trim().is_empty() => default.to_owned(),
            Self::DefaultWhenBlank(_) => text.to_owned(),
        }
    }
}

/// How the response reaches the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendering {
    /// One complete response; alarm confirmations, then text.
    OneShot {
        /// Append grounding sources under the text.
        cite_sources: bool,
    },
    /// Text accumulated into one message as chunks arrive.
    Streamed,
    /// Refine the prompt, then render an image into the refinement message.
    RefineThenImage {
        /// Image generation model.
        image_model: String,
    },
}

/// Everything that distinguishes one chat mode from another.
#[derive(Debug, Clone)]
pub struct ModeProfile {
    /// Which mode this is.
    pub mode: PanelMode,
    /// First transcript message.
    pub welcome: &'static str,
    /// Mode directive appended to the identity core. Empty for none.
    pub directive: &'static str,
    /// Default model.
    pub model: String,
    /// Prefer the model picked in the composer.
    pub use_composer_model: bool,
    /// Sampling temperature.
    pub temperature: f32,
    /// Reasoning budget (0 disables thinking).
    pub thinking_budget: Option<i32>,
    /// `setAlarm` declaration, if the mode can set alarms.
    pub alarm_tool: Option<AlarmToolSpec>,
    /// Request text shape.
    pub prompt_shape: PromptShape,
    /// Forward image attachments as inline data.
    pub include_images: bool,
    /// Rendering strategy.
    pub rendering: Rendering,
    /// Message used when the vendor call fails.
    pub fallback: &'static str,
}

impl ModeProfile {
    /// Profile of `mode` with model names from `models`.
    pub fn for_mode(mode: PanelMode, models: &ModelConfig) -> Self {
        match mode {
            PanelMode::Chat => Self {
                mode,
                welcome: "Welcome to Normal Chat. I have full access to your Alarms and Chrome workspace. How can I assist today?",
                directive: "You are a versatile assistant with Alarm and Chrome access. Respond naturally.",
                model: models.chat.clone(),
                use_composer_model: true,
                temperature: 0.7,
                thinking_budget: None,
                alarm_tool: Some(AlarmToolSpec {
                    description: "Set an alarm for the user.",
                    time_description: "Time string.",
                    label_description: "Alarm label.",
                    confirmation: "Understood. Alarm synchronized for {time}: {label}.",
                }),
                prompt_shape: PromptShape::Plain,
                include_images: false,
                rendering: Rendering::OneShot {
                    cite_sources: false,
                },
                fallback: "Connection interrupted. Chrome access temporary offline.",
            },
            PanelMode::Analyzed => Self {
                mode,
                welcome: "Analyzed Mode active. Real-time 2026 Neural Grounding enabled. Deep Research, Alarms, and Chrome Access integrated.",
                directive: "Sarjo AI Studio [Analyzed Mode]. 10X SPEED. You have access to real-time information, Chrome tools, and Alarms. Mention sources for Chrome searches.",
                model: models.analyzed.clone(),
                use_composer_model: false,
                temperature: 0.0,
                thinking_budget: None,
                alarm_tool: Some(AlarmToolSpec {
                    description: "Set a neural alarm or reminder.",
                    time_description: "Time (e.g., 5 PM).",
                    label_description: "Reason.",
                    confirmation: "Alarm Protocol Confirmed: {time} for {label}. Synchronized with Chrome workspace.",
                }),
                prompt_shape: PromptShape::DateContext,
                include_images: true,
                rendering: Rendering::OneShot { cite_sources: true },
                fallback: "Neural link failed. Chrome connection unstable.",
            },
            PanelMode::Creative => Self {
                mode,
                welcome: "Creative Mode active. I can generate high-fidelity images. Video generation under development.",
                directive: "",
                model: models.refiner.clone(),
                use_composer_model: false,
                temperature: 0.0,
                thinking_budget: Some(0),
                alarm_tool: None,
                prompt_shape: PromptShape::Plain,
                include_images: false,
                rendering: Rendering::RefineThenImage {
                    image_model: models.image.clone(),
                },
                fallback: "Creative engine failed.",
            },
            PanelMode::Code => Self {
                mode,
                welcome: "Engineering Hub: 10X Speed Active. Architecture & Debugging initialized.",
                directive: "Sarjo AI [Engineer]. 10X SPEED. Clean code only. No preamble. Wrap in triple backticks.",
                model: models.code.clone(),
                use_composer_model: false,
                temperature: 0.0,
                thinking_budget: Some(0),
                alarm_tool: None,
                prompt_shape: PromptShape::Plain,
                include_images: false,
                rendering: Rendering::Streamed,
                fallback: "Compile error.",
            },
            PanelMode::Vision => Self {
                mode,
                welcome: "Vision-to-Action Mode active. Upload an image for instant technical manual breakdown.",
                directive: "Sarjo AI Vision. 10X SPEED. Identify and explain instantly. Manual-style steps only. No preamble.",
                model: models.vision.clone(),
                use_composer_model: false,
                temperature: 0.1,
                thinking_budget: Some(0),
                alarm_tool: None,
                prompt_shape: PromptShape::DefaultWhenBlank(DEFAULT_VISION_PROMPT),
                include_images: true,
                rendering: Rendering::Streamed,
                fallback: "Visual analysis failed.",
            },
        }
    }

    /// Model for this request.
    pub fn model_for(&self, prompt: &ComposedPrompt) -> String {
        if self.use_composer_model && !prompt.model.trim().is_empty() {
            prompt.model.clone()
        } else {
            self.model.clone()
        }
    }

    /// Identity core plus this mode's directive.
    pub fn system_instruction(&self, identity: &str) -> String {
        if self.directive.is_empty() {
            identity.to_owned()
        } else {
            format!("{identity} {}", self.directive)
        }
    }

    /// Tools for this request.
    ///
    /// The search tool is only added for modes that declare no functions,
    /// since the vendor rejects the combination.
    pub fn tools(&self, research: bool) -> Vec<Tool> {
        match &self.alarm_tool {
            Some(spec) => vec![Tool::functions(vec![spec.declaration()])],
            None if research => vec![Tool::google_search()],
            None => Vec::new(),
        }
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: Some(self.temperature),
            thinking_config: self
                .thinking_budget
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
            ..GenerationConfig::default()
        }
    }

    /// The primary request for `prompt`.
    ///
    /// For the creative mode this is the refinement request, which carries
    /// the identity inline instead of as a system instruction.
    pub fn build_request(&self, identity: &str, prompt: &ComposedPrompt) -> GenerateContentRequest {
        if let Rendering::RefineThenImage { .. } = self.rendering {
            return GenerateContentRequest {
                contents: vec![Content::user_text(refine_prompt(identity, &prompt.text))],
                system_instruction: None,
                tools: self.tools(prompt.research),
                generation_config: Some(self.generation_config()),
            };
        }

        let mut parts = vec![Part::text(self.prompt_shape.apply(&prompt.text))];
        if self.include_images {
            parts.extend(prompt.images().map(|a| Part::inline(&a.mime_type, a.base64())));
        }
        GenerateContentRequest {
            contents: vec![Content::user(parts)],
            system_instruction: Some(Content::system(self.system_instruction(identity))),
            tools: self.tools(prompt.research),
            generation_config: Some(self.generation_config()),
        }
    }
}

/// Refinement prompt of the creative mode.
pub fn refine_prompt(identity: &str, text: &str) -> String {
    format!(
        "{identity} Refine for visual fidelity: \"{text}\". Return description then Prompt: [prompt]."
    )
}

/// Image request for an already refined prompt.
pub fn image_request(image_prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::user_text(image_prompt)],
        system_instruction: None,
        tools: Vec::new(),
        generation_config: Some(GenerationConfig {
            image_config: Some(ImageConfig {
                aspect_ratio: "1:1".to_owned(),
            }),
            ..GenerationConfig::default()
        }),
    }
}

/// Whether a creative prompt asks for motion content.
pub fn wants_video(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("video") || lower.contains("animate")
}

/// Image prompt extracted from the refiner's reply.
///
/// Takes the text after the last case-insensitive `Prompt:` marker (or the
/// whole reply when there is none), trimmed; falls back to `original` when
/// that is empty.
pub fn extract_image_prompt(refined: &str, original: &str) -> String {
    let lower = refined.to_ascii_lowercase();
    let tail = match lower.rfind("prompt:") {
        Some(pos) => &refined[pos + "prompt:".len()..],
        None => refined,
    };
    let tail = tail.trim();
    if tail.is_empty() {
        original.to_owned()
    } else {
        tail.to_owned()
    }
}
