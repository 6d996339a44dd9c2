use std::fmt;

use clap::ValueEnum;

/// Model family, decided by the id prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Gemini,
}

/// What a model accepts besides the audio clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub image_input: bool,
    pub reasoning: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn provider(&self) -> Provider {
        if self.0.starts_with("gpt-") {
            Provider::OpenAi
        } else {
            Provider::Gemini
        }
    }

    /// Audio-only models take neither the spectrogram nor a reasoning budget.
    pub fn capabilities(&self) -> Capabilities {
        match self.provider() {
            Provider::OpenAi => Capabilities {
                image_input: false,
                reasoning: false,
            },
            Provider::Gemini => Capabilities {
                image_input: true,
                reasoning: true,
            },
        }
    }

    pub fn label(&self) -> &str {
        MODELS
            .iter()
            .find(|(id, _)| *id == self.0)
            .map(|(_, label)| *label)
            .unwrap_or(self.0.as_str())
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Selectable models as `(id, label)`.
pub const MODELS: &[(&str, &str)] = &[
    ("gpt-audio", "GPT Audio"),
    ("gemini-3-pro-preview", "gemini-3-pro"),
    ("gemini-3-flash-preview", "gemini-3-flash"),
    ("gemini-2.0-flash-thinking-exp", "gemini-2.0-thinking"),
    ("gemini-2.0-flash-exp", "gemini-2.0-flash"),
];

/// Temperature presets as `(label, temperature)`.
pub const STYLES: &[(&str, f32)] = &[
    ("Focused", 0.1),
    ("Balanced", 0.4),
    ("Creative", 0.7),
    ("Unusual", 1.0),
];

pub const DEFAULT_TEMPERATURE: f32 = 0.2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReasoningEffort {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub const ALL: [ReasoningEffort; 4] = [Self::None, Self::Low, Self::Medium, Self::High];

    /// Thinking token budget sent with the request.
    pub fn budget(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Low => 1024,
            Self::Medium => 4096,
            Self::High => 8192,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

pub const SUGGESTIONS: &[&str] = &[
    "Check the overall frequency balance.",
    "Are the vocals sitting correctly in the mix?",
    "Evaluate the stereo width and mono compatibility.",
    "Is the low-end (kick/bass) well-defined?",
    "Suggest mastering moves for a commercial polish.",
];

/// Settings carried into an analysis request.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisSettings {
    pub model: ModelId,
    pub temperature: f32,
    /// As configured; see [`AnalysisSettings::effective_reasoning`].
    pub reasoning: ReasoningEffort,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            model: ModelId::default(),
            temperature: DEFAULT_TEMPERATURE,
            reasoning: ReasoningEffort::None,
        }
    }
}

impl AnalysisSettings {
    /// Reasoning effort actually sent: forced to `None` for models without
    /// reasoning support, whatever was configured before.
    pub fn effective_reasoning(&self) -> ReasoningEffort {
        if self.model.capabilities().reasoning {
            self.reasoning
        } else {
            ReasoningEffort::None
        }
    }

    pub fn include_spectrogram(&self) -> bool {
        self.model.capabilities().image_input
    }
}
