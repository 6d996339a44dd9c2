//! Ties selection, session and conversation together.
//!
//! The orchestrator never calls the service itself. Actions that need the
//! service return an [`Outbound`] request; its result comes back as a
//! [`Completion`] through [`Orchestrator::apply`]. Each request carries a
//! [`Ticket`] so results that arrive after a reset are dropped.

use std::sync::Arc;

use crate::audio::AudioSource;
use crate::conversation::{ConversationLog, Role};
use crate::error::MixError;
use crate::models::{AnalysisSettings, ModelId, ReasoningEffort, SUGGESTIONS};
use crate::player::Playback;
use crate::range::TimeRange;
use crate::selection::{RegionEvent, SelectionController};
use crate::service::{AnalysisReply, AnalysisRequest, ChatReply, Spectrogram};
use crate::session::{Session, SessionId, SessionStatus};

/// Identifies the state a request was issued against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    /// Bumped on every source load.
    pub generation: u64,
    /// Bumped on every session reset, source loads included.
    pub epoch: u64,
}

#[derive(Clone, Debug)]
pub enum Request {
    Spectrogram { source: Arc<AudioSource>, range: TimeRange },
    Analyze(AnalysisRequest),
    Chat { session: SessionId, text: String },
}

#[derive(Clone, Debug)]
pub struct Outbound {
    pub ticket: Ticket,
    pub request: Request,
}

#[derive(Clone, Debug)]
pub enum Outcome {
    Spectrogram(Result<Spectrogram, MixError>),
    Analysis(Result<AnalysisReply, MixError>),
    Chat(Result<ChatReply, MixError>),
}

#[derive(Clone, Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub outcome: Outcome,
}

/// One flag per action class; set while its request is outstanding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InFlight {
    pub preview: bool,
    pub analysis: bool,
    pub reply: bool,
}

/// Which controls the presentation layer should enable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Controls {
    pub playback: bool,
    pub preview: bool,
    pub analyze: bool,
    pub new_analysis: bool,
    pub reply: bool,
    pub prompt_editable: bool,
    pub model_editable: bool,
    pub reasoning_editable: bool,
}

pub struct Orchestrator {
    selection: SelectionController,
    session: Session,
    log: ConversationLog,
    settings: AnalysisSettings,
    prompt: String,
    spectrogram: Option<Arc<Spectrogram>>,
    last_error: Option<MixError>,
    in_flight: InFlight,
    generation: u64,
    epoch: u64,
    /// Prompt text of the outstanding analysis, for rollback.
    pending_prompt: Option<String>,
    /// Text of the outstanding reply.
    pending_reply: Option<String>,
}

impl Orchestrator {
    pub fn new(settings: AnalysisSettings, playback: Box<dyn Playback>) -> Self {
        Self {
            selection: SelectionController::new(playback),
            session: Session::default(),
            log: ConversationLog::default(),
            settings,
            prompt: String::new(),
            spectrogram: None,
            last_error: None,
            in_flight: InFlight::default(),
            generation: 0,
            epoch: 0,
            pending_prompt: None,
            pending_reply: None,
        }
    }

    // ------------------------------------------------------------------
    // Source and selection
    // ------------------------------------------------------------------

    /// Replaces the source. Session, conversation, selection, spectrogram,
    /// in-flight flags and the last error are reset together.
    ///
    /// Returns the selection generation for region events on this source.
    pub fn load_source(&mut self, source: Arc<AudioSource>) -> u64 {
        log::info!("loading source {}", source.name);
        self.reset_for_source();
        self.selection.attach(source)
    }

    /// The picked file could not be loaded. Drops whatever was attached.
    pub fn source_failed(&mut self, message: impl Into<String>) {
        self.reset_for_source();
        self.selection.detach();
        let error = MixError::source_unavailable(message);
        log::warn!("source unavailable: {error}");
        self.last_error = Some(error);
    }

    fn reset_for_source(&mut self) {
        self.generation += 1;
        self.reset_session();
        self.spectrogram = None;
        self.last_error = None;
        self.in_flight.preview = false;
    }

    fn reset_session(&mut self) {
        self.epoch += 1;
        self.session.reset();
        self.log.clear();
        self.in_flight.analysis = false;
        self.in_flight.reply = false;
        self.pending_prompt = None;
        self.pending_reply = None;
    }

    pub fn region_changed(&mut self, generation: u64, event: RegionEvent) -> Option<TimeRange> {
        self.selection.on_region_changed(generation, event)
    }

    pub fn select_full(&mut self) -> Option<TimeRange> {
        self.selection.select_full()
    }

    pub fn play_selection(&mut self) {
        self.selection.play_selection();
    }

    pub fn toggle_playback(&mut self) {
        self.selection.toggle_playback();
    }

    pub fn can_act(&self) -> bool {
        self.selection.source().is_some()
            && self.selection.range().is_some_and(|r| r.end() > r.start())
    }

    // ------------------------------------------------------------------
    // Directive and settings
    // ------------------------------------------------------------------

    /// Ignored once an analysis has started.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) -> bool {
        if self.session.directive_frozen() {
            return false;
        }
        self.prompt = prompt.into();
        true
    }

    pub fn apply_suggestion(&mut self, index: usize) -> bool {
        match SUGGESTIONS.get(index) {
            Some(text) => self.set_prompt(*text),
            None => false,
        }
    }

    /// Ignored once an analysis has started.
    pub fn set_model(&mut self, model: ModelId) -> bool {
        if self.session.directive_frozen() {
            return false;
        }
        self.settings.model = model;
        true
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.settings.temperature = temperature;
    }

    pub fn set_reasoning(&mut self, reasoning: ReasoningEffort) {
        self.settings.reasoning = reasoning;
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    pub fn request_preview(&mut self) -> Option<Outbound> {
        if !self.can_act() || self.in_flight.preview {
            return None;
        }
        let source = self.selection.source()?.clone();
        let range = self.selection.range()?;

        self.last_error = None;
        self.in_flight.preview = true;
        log::debug!("requesting spectrogram preview for {range:?}");
        Some(Outbound {
            ticket: self.ticket(),
            request: Request::Spectrogram { source, range },
        })
    }

    /// Starts an analysis of the current selection with the current prompt.
    ///
    /// A no-op unless a source is loaded with a valid selection and the
    /// session is idle.
    pub fn start_analysis(&mut self) -> Option<Outbound> {
        if !self.can_act() || self.in_flight.analysis {
            return None;
        }
        let source = self.selection.source()?.clone();
        let range = self.selection.range()?;
        if !self.session.begin() {
            return None;
        }

        self.last_error = None;
        self.in_flight.analysis = true;
        self.log.push_pending(Role::User, self.prompt.clone());
        self.pending_prompt = Some(self.prompt.clone());

        let request = AnalysisRequest {
            source,
            range,
            prompt: self.prompt.clone(),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            reasoning_budget: self.settings.effective_reasoning().budget(),
            include_spectrogram: self.settings.include_spectrogram(),
        };
        log::info!(
            "starting analysis of {:.2}s..{:.2}s with {}",
            range.start(),
            range.end(),
            request.model
        );
        Some(Outbound {
            ticket: self.ticket(),
            request: Request::Analyze(request),
        })
    }

    /// Sends a follow-up in the active session.
    pub fn send_reply(&mut self, text: impl Into<String>) -> Option<Outbound> {
        let text = text.into();
        if text.trim().is_empty() || self.in_flight.reply || !self.session.accepts_replies() {
            return None;
        }
        let session = self.session.id()?.clone();

        self.last_error = None;
        self.in_flight.reply = true;
        self.log.push_pending(Role::User, text.clone());
        self.pending_reply = Some(text.clone());
        Some(Outbound {
            ticket: self.ticket(),
            request: Request::Chat { session, text },
        })
    }

    /// Leaves the current session so a fresh analysis can be started on the
    /// same source and selection.
    ///
    /// Ignored while an analysis is still running.
    pub fn new_analysis(&mut self) {
        if !self.can_start_over() {
            return;
        }
        log::info!("discarding session {:?}", self.session.id());
        self.reset_session();
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------

    /// Applies a finished request. Returns `false` if it was stale and dropped.
    pub fn apply(&mut self, completion: Completion) -> bool {
        let Completion { ticket, outcome } = completion;
        match outcome {
            Outcome::Spectrogram(result) => {
                if ticket.generation != self.generation {
                    log::debug!("dropping stale spectrogram from generation {}", ticket.generation);
                    return false;
                }
                self.in_flight.preview = false;
                match result {
                    Ok(spectrogram) => self.spectrogram = Some(Arc::new(spectrogram)),
                    Err(e) => self.fail(e),
                }
            }
            Outcome::Analysis(result) => {
                if ticket.epoch != self.epoch || !self.in_flight.analysis {
                    log::debug!("dropping stale analysis result from epoch {}", ticket.epoch);
                    return false;
                }
                self.in_flight.analysis = false;
                let prompt = self.pending_prompt.take().unwrap_or_default();
                match result {
                    Ok(reply) => {
                        log::info!("session {} active", reply.session_id);
                        self.session.activate(reply.session_id);
                        self.log.confirm(Role::User, &prompt);
                        self.log.push_confirmed(Role::Model, reply.advice);
                        if let Some(spectrogram) = reply.spectrogram {
                            self.spectrogram = Some(Arc::new(spectrogram));
                        }
                    }
                    Err(e) => {
                        self.session.fail();
                        self.log.rollback(Role::User, &prompt);
                        self.fail(e);
                    }
                }
            }
            Outcome::Chat(result) => {
                if ticket.epoch != self.epoch || !self.in_flight.reply {
                    log::debug!("dropping stale chat reply from epoch {}", ticket.epoch);
                    return false;
                }
                self.in_flight.reply = false;
                let text = self.pending_reply.take().unwrap_or_default();
                // The user turn stays either way
                self.log.confirm(Role::User, &text);
                match result {
                    Ok(reply) => self.log.push_confirmed(Role::Model, reply.reply),
                    Err(e) => self.fail(e),
                }
            }
        }
        true
    }

    fn fail(&mut self, error: MixError) {
        log::warn!("request failed: {error}");
        self.last_error = Some(error);
    }

    fn can_start_over(&self) -> bool {
        match self.session.status() {
            SessionStatus::Active => true,
            SessionStatus::Idle => !self.log.is_empty(),
            SessionStatus::Analyzing => false,
        }
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            epoch: self.epoch,
        }
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub fn controls(&self) -> Controls {
        let idle = self.session.status() == SessionStatus::Idle;
        Controls {
            playback: self.selection.source().is_some_and(|s| s.duration_secs() > 0.0),
            preview: self.can_act() && !self.in_flight.preview,
            analyze: self.can_act() && idle && !self.in_flight.analysis,
            new_analysis: self.can_start_over(),
            reply: self.session.accepts_replies() && !self.in_flight.reply,
            prompt_editable: !self.session.directive_frozen(),
            model_editable: !self.session.directive_frozen(),
            reasoning_editable: self.settings.model.capabilities().reasoning,
        }
    }

    pub fn range(&self) -> Option<TimeRange> {
        self.selection.range()
    }

    pub fn selection_generation(&self) -> u64 {
        self.selection.generation()
    }

    pub fn source(&self) -> Option<&Arc<AudioSource>> {
        self.selection.source()
    }

    pub fn is_playing(&self) -> bool {
        self.selection.is_playing()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn last_error(&self) -> Option<&MixError> {
        self.last_error.as_ref()
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight
    }

    pub fn spectrogram(&self) -> Option<&Arc<Spectrogram>> {
        self.spectrogram.as_ref()
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;
    use crate::player::SilentPlayback;

    fn source(secs: usize) -> Arc<AudioSource> {
        Arc::new(AudioSource::from_pcm("mix.wav", vec![0.0; secs * 10], 10, 1))
    }

    fn loaded(secs: usize) -> (Orchestrator, u64) {
        let mut orch = Orchestrator::new(AnalysisSettings::default(), Box::new(SilentPlayback::default()));
        let gen = orch.load_source(source(secs));
        (orch, gen)
    }

    fn analysis_ok(ticket: Ticket, id: &str) -> Completion {
        Completion {
            ticket,
            outcome: Outcome::Analysis(Ok(AnalysisReply {
                session_id: SessionId::new(id),
                advice: "cut 300Hz on the guitars".into(),
                spectrogram: Some(Spectrogram { png: vec![1, 2, 3] }),
            })),
        }
    }

    fn user(text: &str) -> Turn {
        Turn {
            role: Role::User,
            text: text.into(),
            confirmed: true,
        }
    }

    fn model(text: &str) -> Turn {
        Turn {
            role: Role::Model,
            text: text.into(),
            confirmed: true,
        }
    }

    fn active() -> Orchestrator {
        let (mut orch, _) = loaded(180);
        let out = orch.start_analysis().unwrap();
        orch.apply(analysis_ok(out.ticket, "s1"));
        orch
    }

    #[test]
    fn nothing_starts_without_a_source() {
        let mut orch = Orchestrator::new(AnalysisSettings::default(), Box::new(SilentPlayback::default()));
        assert!(!orch.can_act());
        assert!(orch.start_analysis().is_none());
        assert!(orch.request_preview().is_none());
        assert_eq!(orch.session().status(), SessionStatus::Idle);
        assert!(orch.log().is_empty());
        assert!(!orch.in_flight().analysis);
    }

    #[test]
    fn start_analysis_appends_prompt_optimistically() {
        let (mut orch, gen) = loaded(180);
        orch.region_changed(gen, RegionEvent::DragEnded { start: 10.0, end: 50.0 });
        orch.set_prompt("is the snare too loud?");

        let out = orch.start_analysis().unwrap();
        let Request::Analyze(request) = &out.request else {
            panic!("expected an analysis request");
        };
        assert_eq!((request.range.start(), request.range.end()), (10.0, 50.0));
        assert_eq!(request.prompt, "is the snare too loud?");
        assert!(request.include_spectrogram);

        assert_eq!(orch.session().status(), SessionStatus::Analyzing);
        assert!(orch.in_flight().analysis);
        assert_eq!(orch.log().len(), 1);
        assert!(!orch.log().turns()[0].confirmed);
        assert!(!orch.controls().analyze);
        assert!(orch.start_analysis().is_none());
    }

    #[test]
    fn successful_analysis_activates_session() {
        let orch = active();
        assert_eq!(orch.session().status(), SessionStatus::Active);
        assert_eq!(orch.session().id().map(SessionId::as_str), Some("s1"));
        assert_eq!(orch.log().turns(), [user(""), model("cut 300Hz on the guitars")]);
        assert_eq!(orch.spectrogram().unwrap().png, vec![1, 2, 3]);
        assert!(!orch.in_flight().analysis);
    }

    #[test]
    fn failed_analysis_rolls_back_prompt() {
        let (mut orch, _) = loaded(180);
        orch.set_prompt("check the lows");
        let before = orch.log().len();
        let out = orch.start_analysis().unwrap();

        orch.apply(Completion {
            ticket: out.ticket,
            outcome: Outcome::Analysis(Err(MixError::request_failed("timeout"))),
        });

        assert_eq!(orch.log().len(), before);
        assert_eq!(orch.session(), &Session::default());
        assert_eq!(orch.last_error().map(|e| e.to_string()).as_deref(), Some("timeout"));
        assert!(orch.controls().analyze);
    }

    #[test]
    fn directive_is_frozen_outside_idle() {
        let (mut orch, _) = loaded(180);
        orch.set_prompt("first");
        orch.start_analysis().unwrap();
        assert!(!orch.set_prompt("second"));
        assert!(!orch.set_model(ModelId::new("gpt-audio")));
        assert!(!orch.apply_suggestion(0));
        assert_eq!(orch.prompt(), "first");
        assert!(!orch.controls().prompt_editable);
    }

    #[test]
    fn reply_round_trip() {
        let mut orch = active();
        let out = orch.send_reply("mix sounds muddy").unwrap();
        assert!(orch.in_flight().reply);
        assert!(orch.send_reply("again").is_none());

        orch.apply(Completion {
            ticket: out.ticket,
            outcome: Outcome::Chat(Ok(ChatReply {
                reply: "try a high-pass at 150Hz".into(),
            })),
        });
        assert_eq!(
            &orch.log().turns()[2..],
            [user("mix sounds muddy"), model("try a high-pass at 150Hz")]
        );
        assert!(!orch.in_flight().reply);
    }

    #[test]
    fn failed_reply_keeps_user_turn() {
        let mut orch = active();
        let out = orch.send_reply("more air?").unwrap();
        orch.apply(Completion {
            ticket: out.ticket,
            outcome: Outcome::Chat(Err(MixError::request_failed("session expired"))),
        });

        assert_eq!(orch.log().len(), 3);
        assert_eq!(orch.log().last(), Some(&user("more air?")));
        assert_eq!(orch.session().status(), SessionStatus::Active);
        assert_eq!(orch.last_error(), Some(&MixError::request_failed("session expired")));
        assert!(orch.controls().reply);
    }

    #[test]
    fn blank_or_premature_replies_are_ignored() {
        let (mut orch, _) = loaded(180);
        assert!(orch.send_reply("hello").is_none());
        let mut orch = active();
        assert!(orch.send_reply("   \n").is_none());
        assert_eq!(orch.log().len(), 2);
    }

    #[test]
    fn replacing_source_discards_in_flight_analysis() {
        let (mut orch, _) = loaded(180);
        let out = orch.start_analysis().unwrap();
        orch.load_source(source(120));

        assert_eq!(orch.session(), &Session::default());
        assert!(orch.log().is_empty());
        assert!(!orch.apply(analysis_ok(out.ticket, "late")));
        assert_eq!(orch.session().id(), None);
        assert!(orch.log().is_empty());
        assert_eq!(orch.range().unwrap().duration(), 120.0);
    }

    #[test]
    fn replacing_source_discards_in_flight_reply() {
        let mut orch = active();
        let out = orch.send_reply("louder?").unwrap();
        orch.load_source(source(60));
        let applied = orch.apply(Completion {
            ticket: out.ticket,
            outcome: Outcome::Chat(Ok(ChatReply { reply: "no".into() })),
        });
        assert!(!applied);
        assert!(orch.log().is_empty());
        assert!(orch.spectrogram().is_none());
        assert!(!orch.in_flight().reply);
    }

    #[test]
    fn stale_preview_is_dropped_but_current_one_lands() {
        let (mut orch, _) = loaded(180);
        let stale = orch.request_preview().unwrap();
        orch.load_source(source(90));
        let current = orch.request_preview().unwrap();

        assert!(!orch.apply(Completion {
            ticket: stale.ticket,
            outcome: Outcome::Spectrogram(Ok(Spectrogram { png: vec![9] })),
        }));
        assert!(orch.spectrogram().is_none());
        assert!(orch.in_flight().preview);

        assert!(orch.apply(Completion {
            ticket: current.ticket,
            outcome: Outcome::Spectrogram(Ok(Spectrogram { png: vec![7] })),
        }));
        assert_eq!(orch.spectrogram().unwrap().png, vec![7]);
        assert!(!orch.in_flight().preview);
    }

    #[test]
    fn preview_does_not_touch_session() {
        let mut orch = active();
        let out = orch.request_preview().unwrap();
        orch.apply(Completion {
            ticket: out.ticket,
            outcome: Outcome::Spectrogram(Err(MixError::source_unavailable("range too short"))),
        });
        assert_eq!(orch.session().status(), SessionStatus::Active);
        assert_eq!(orch.log().len(), 2);
        assert_eq!(orch.last_error(), Some(&MixError::source_unavailable("range too short")));
    }

    #[test]
    fn new_analysis_returns_to_idle_on_same_source() {
        let mut orch = active();
        orch.new_analysis();
        assert_eq!(orch.session(), &Session::default());
        assert!(orch.log().is_empty());
        assert!(orch.spectrogram().is_some());
        assert!(orch.set_prompt("second pass"));
        assert!(orch.start_analysis().is_some());
    }

    #[test]
    fn new_analysis_waits_for_running_analysis() {
        let (mut orch, _) = loaded(180);
        let first = orch.start_analysis().unwrap();
        assert!(!orch.controls().new_analysis);

        orch.new_analysis();
        assert_eq!(orch.session().status(), SessionStatus::Analyzing);
        assert!(orch.in_flight().analysis);
        assert!(orch.start_analysis().is_none());

        assert!(orch.apply(analysis_ok(first.ticket, "s1")));
        assert!(orch.controls().new_analysis);
    }

    #[test]
    fn playback_needs_a_source_with_audio() {
        let mut orch = Orchestrator::new(AnalysisSettings::default(), Box::new(SilentPlayback::default()));
        assert!(!orch.controls().playback);
        orch.load_source(Arc::new(AudioSource::from_pcm("empty.wav", Vec::new(), 44100, 2)));
        assert!(!orch.controls().playback);
        orch.load_source(source(5));
        assert!(orch.controls().playback);
    }

    #[test]
    fn audio_only_model_suppresses_reasoning_and_image() {
        let (mut orch, _) = loaded(180);
        orch.set_reasoning(ReasoningEffort::Medium);
        orch.set_model(ModelId::new("gpt-audio"));
        assert!(!orch.controls().reasoning_editable);

        let out = orch.start_analysis().unwrap();
        let Request::Analyze(request) = out.request else {
            panic!("expected an analysis request");
        };
        assert_eq!(request.reasoning_budget, 0);
        assert!(!request.include_spectrogram);
    }

    #[test]
    fn source_failure_is_surfaced() {
        let mut orch = active();
        orch.source_failed("unsupported format");
        assert!(orch.source().is_none());
        assert!(!orch.can_act());
        assert!(orch.log().is_empty());
        assert_eq!(orch.last_error(), Some(&MixError::source_unavailable("unsupported format")));
    }
}
