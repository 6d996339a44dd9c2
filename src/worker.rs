use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::orchestrator::{Completion, Orchestrator, Outbound, Outcome, Request};
use crate::service::MixService;

/// Runs one request against the service on the calling thread.
pub fn execute(service: &dyn MixService, outbound: Outbound) -> Completion {
    let outcome = match outbound.request {
        Request::Spectrogram { source, range } => {
            Outcome::Spectrogram(service.fetch_spectrogram(&source, range))
        }
        Request::Analyze(request) => Outcome::Analysis(service.analyze_audio(&request)),
        Request::Chat { session, text } => {
            Outcome::Chat(service.send_chat_message(&session, &text))
        }
    };
    Completion {
        ticket: outbound.ticket,
        outcome,
    }
}

/// Runs service calls on background threads and hands the results back to
/// the UI thread over a channel.
pub struct Dispatcher {
    service: Arc<dyn MixService>,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    notify: Arc<dyn Fn() + Send + Sync>,
}

impl Dispatcher {
    /// `notify` is called from the worker thread after each completion is
    /// queued, e.g. to request a repaint.
    pub fn new(service: Arc<dyn MixService>, notify: impl Fn() + Send + Sync + 'static) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            service,
            sender,
            receiver,
            notify: Arc::new(notify),
        }
    }

    pub fn dispatch(&self, outbound: Outbound) {
        let service = self.service.clone();
        let sender = self.sender.clone();
        let notify = self.notify.clone();
        thread::spawn(move || {
            let completion = execute(service.as_ref(), outbound);
            sender.send(completion).ok();
            notify();
        });
    }

    /// Applies every completion that has arrived so far. Returns how many
    /// were applied (stale ones included).
    pub fn drain(&self, orchestrator: &mut Orchestrator) -> usize {
        let mut count = 0;
        while let Ok(completion) = self.receiver.try_recv() {
            orchestrator.apply(completion);
            count += 1;
        }
        count
    }

    /// Blocks for the next completion.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Completion> {
        match self.receiver.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("no completion after {timeout:?}");
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
