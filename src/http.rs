use std::time::Duration;

use base64::Engine as _;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::audio::AudioSource;
use crate::error::{MixError, MixResult};
use crate::range::TimeRange;
use crate::service::{AnalysisReply, AnalysisRequest, ChatReply, MixService, Spectrogram};
use crate::session::SessionId;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpectrogramBody {
    spectrogram_png_base64: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody {
    session_id: String,
    advice: String,
    #[serde(default)]
    spectrogram_png_base64: Option<String>,
}

#[derive(Deserialize)]
struct ChatBody {
    reply: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Which kind of endpoint answered; decides how client errors are reported.
#[derive(Clone, Copy)]
enum Endpoint {
    Source,
    Chat,
}

/// [`MixService`] backed by the analysis HTTP API.
pub struct HttpMixService {
    base_url: String,
    client: Client,
}

impl HttpMixService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn source_form(source: &AudioSource, range: TimeRange) -> MixResult<Form> {
        if source.encoded.is_empty() {
            return Err(MixError::source_unavailable("source has no encoded audio to upload"));
        }
        let part = Part::bytes(source.encoded.to_vec()).file_name(source.name.clone());
        Ok(Form::new()
            .part("file", part)
            .text("startSec", range.start().to_string())
            .text("endSec", range.end().to_string()))
    }

    fn post<T: DeserializeOwned>(&self, path: &str, form: Form, endpoint: Endpoint) -> MixResult<T> {
        log::debug!("POST {path}");
        let response = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .map_err(transport_error)?;
        read_body(response, endpoint)
    }
}

impl MixService for HttpMixService {
    fn fetch_spectrogram(&self, source: &AudioSource, range: TimeRange) -> MixResult<Spectrogram> {
        let form = Self::source_form(source, range)?;
        let body: SpectrogramBody = self.post("/api/spectrogram", form, Endpoint::Source)?;
        Ok(Spectrogram {
            png: decode_png(&body.spectrogram_png_base64)?,
        })
    }

    fn analyze_audio(&self, request: &AnalysisRequest) -> MixResult<AnalysisReply> {
        let form = Self::source_form(&request.source, request.range)?
            .text("prompt", request.prompt.clone())
            .text("modelId", request.model.to_string())
            .text("temperature", request.temperature.to_string())
            .text("thinkingBudget", request.reasoning_budget.to_string())
            .text("includeSpectrogram", request.include_spectrogram.to_string());
        let body: AnalyzeBody = self.post("/api/analyze", form, Endpoint::Source)?;

        let spectrogram = match body.spectrogram_png_base64.as_deref() {
            Some(b64) if !b64.is_empty() => Some(Spectrogram {
                png: decode_png(b64)?,
            }),
            _ => None,
        };
        Ok(AnalysisReply {
            session_id: SessionId::new(body.session_id),
            advice: body.advice,
            spectrogram,
        })
    }

    fn send_chat_message(&self, session: &SessionId, text: &str) -> MixResult<ChatReply> {
        let form = Form::new()
            .text("sessionId", session.to_string())
            .text("message", text.to_string());
        let body: ChatBody = self.post("/api/chat", form, Endpoint::Chat)?;
        Ok(ChatReply { reply: body.reply })
    }
}

fn transport_error(e: reqwest::Error) -> MixError {
    if e.is_timeout() {
        MixError::request_failed("timeout")
    } else {
        MixError::request_failed(e.to_string())
    }
}

fn read_body<T: DeserializeOwned>(response: Response, endpoint: Endpoint) -> MixResult<T> {
    let status = response.status();
    let text = response.text().map_err(transport_error)?;
    if status.is_success() {
        return serde_json::from_str(&text)
            .map_err(|e| MixError::request_failed(format!("malformed response: {e}")));
    }
    Err(classify(status, &text, endpoint))
}

fn classify(status: StatusCode, body: &str, endpoint: Endpoint) -> MixError {
    let message = error_message(status, body);
    let rejected_source = matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::PAYLOAD_TOO_LARGE
            | StatusCode::UNSUPPORTED_MEDIA_TYPE
            | StatusCode::UNPROCESSABLE_ENTITY
    );
    match endpoint {
        Endpoint::Source if rejected_source => MixError::SourceUnavailable(message),
        _ => MixError::RequestFailed(message),
    }
}

/// Prefers the `detail` of an error body, falling back to the raw text.
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| match b.detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
    match detail {
        Some(detail) => detail,
        None if body.trim().is_empty() => format!("HTTP {status}"),
        None => format!("HTTP {status}: {}", body.trim()),
    }
}

fn decode_png(b64: &str) -> MixResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| MixError::request_failed(format!("malformed spectrogram payload: {e}")))
}
