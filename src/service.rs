use std::sync::Arc;

use crate::audio::AudioSource;
use crate::error::MixResult;
use crate::models::ModelId;
use crate::range::TimeRange;
use crate::session::SessionId;

/// Rendered spectrogram of a region, PNG encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spectrogram {
    pub png: Vec<u8>,
}

/// Everything the analysis service needs to start a session.
#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    pub source: Arc<AudioSource>,
    pub range: TimeRange,
    pub prompt: String,
    pub model: ModelId,
    pub temperature: f32,
    /// Thinking budget after capability suppression.
    pub reasoning_budget: u32,
    /// False for models that cannot take the spectrogram image.
    pub include_spectrogram: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisReply {
    pub session_id: SessionId,
    pub advice: String,
    pub spectrogram: Option<Spectrogram>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
}

/// The remote analysis and chat service.
///
/// Calls block; the [`Dispatcher`](crate::worker::Dispatcher) runs them off
/// the UI thread. A rejected session id must come back as
/// [`MixError::RequestFailed`](crate::error::MixError::RequestFailed).
pub trait MixService: Send + Sync {
    /// Preview only; never touches session state.
    fn fetch_spectrogram(&self, source: &AudioSource, range: TimeRange) -> MixResult<Spectrogram>;

    fn analyze_audio(&self, request: &AnalysisRequest) -> MixResult<AnalysisReply>;

    fn send_chat_message(&self, session: &SessionId, text: &str) -> MixResult<ChatReply>;
}
