//! Session configuration and tuning constants.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Maximum transport connection attempts before giving up.
pub const MAX_CONNECT_ATTEMPTS: u32 = 3;
/// Backoff added per failed attempt (0, 1.5 s, 3 s between attempts).
pub const RETRY_BACKOFF_STEP: Duration = Duration::from_millis(1500);
/// Size of the wake-up priming signal: 100 ms of 16 kHz PCM16 silence.
pub const WAKE_UP_SILENCE_BYTES: usize = 3200;
/// Delay between the wake-up signal and the start of capture streaming,
/// giving the remote side time to register the priming.
pub const STREAM_START_DELAY: Duration = Duration::from_millis(500);
/// Samples per capture frame window. Large enough to bound per-callback
/// overhead, small enough to keep latency low.
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;
/// Cadence of outbound video stills.
pub const VIDEO_FRAME_INTERVAL: Duration = Duration::from_secs(1);

/// Default remote model id.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Preferred voice for synthesized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoicePreference {
    /// Female voice (default).
    #[default]
    Female,
    /// Male voice.
    Male,
}

impl VoicePreference {
    /// Prebuilt voice name advertised to the remote service.
    pub fn voice_name(&self) -> &'static str {
        match self {
            Self::Female => "Kore",
            Self::Male => "Puck",
        }
    }
}

/// Tool/function declaration advertised to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for the arguments.
    pub parameters: Value,
}

/// Declaration of the `createNote` tool, the one operation the session
/// core understands.
pub fn note_tool() -> ToolDefinition {
    ToolDefinition {
        name: "createNote".to_string(),
        description: "Creates a formatted note in the user's notepad. Use this when the user \
                      asks to save, remember, or write down insights, lists, or important \
                      summaries."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "A short, descriptive title for the note."
                },
                "items": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "A list of key points, steps, or insights to save."
                }
            },
            "required": ["title", "items"]
        }),
    }
}

/// Configuration for one live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Target language/locale tag (BCP-47).
    pub language: String,
    /// Voice preference for synthesized audio.
    pub voice: VoicePreference,
    /// Remote model id.
    pub model: String,
    /// System-instruction override. When absent, a default instruction is
    /// synthesized from the language.
    pub instruction: Option<String>,
    /// Tools advertised to the remote side.
    pub tools: Vec<ToolDefinition>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "pt-BR".to_string(),
            voice: VoicePreference::default(),
            model: DEFAULT_MODEL.to_string(),
            instruction: None,
            tools: vec![note_tool()],
        }
    }
}

impl SessionConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the language tag.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the voice preference.
    pub fn with_voice(mut self, voice: VoicePreference) -> Self {
        self.voice = voice;
        self
    }

    /// Set the remote model id.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the system instruction.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// The system instruction sent during transport setup.
    ///
    /// The default instruction tells the model to treat the wake-up silence
    /// as its cue to greet immediately, with the greeting localized from
    /// the configured language.
    pub fn system_instruction(&self) -> String {
        if let Some(instruction) = &self.instruction {
            return instruction.clone();
        }

        let is_pt = self.language.to_lowercase().starts_with("pt");
        let welcome = if is_pt {
            "Oi! Sobre o que quer conversar hoje?"
        } else {
            "Hi! What would you like to talk about today?"
        };

        format!(
            "You are a calm, empathetic voice companion.\n\
             You will receive a short silent audio signal immediately after \
             connecting; that is your cue to speak the welcome message right \
             away, without analyzing the silence.\n\
             WELCOME MESSAGE: \"{welcome}\"\n\
             Keep responses short, warm and conversational. Respond in {lang}. \
             When the user asks to save, remember or write something down, use \
             the createNote tool.",
            lang = self.language,
        )
    }
}
