use std::fmt;

/// Opaque token issued by a successful analysis. Required for follow-ups.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Idle,
    Analyzing,
    Active,
}

/// Analysis session lifecycle.
///
/// ```text
/// Idle --begin--> Analyzing --activate--> Active
///   ^                 |                     |
///   +------fail-------+                     |
///   +---------------reset-------------------+
/// ```
///
/// Transition methods return `false` and leave the state untouched when the
/// transition is not allowed from the current status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    id: Option<SessionId>,
    status: SessionStatus,
}

impl Session {
    pub fn begin(&mut self) -> bool {
        if self.status != SessionStatus::Idle {
            return false;
        }
        self.status = SessionStatus::Analyzing;
        true
    }

    pub fn activate(&mut self, id: SessionId) -> bool {
        if self.status != SessionStatus::Analyzing {
            return false;
        }
        self.id = Some(id);
        self.status = SessionStatus::Active;
        true
    }

    pub fn fail(&mut self) -> bool {
        if self.status != SessionStatus::Analyzing {
            return false;
        }
        self.id = None;
        self.status = SessionStatus::Idle;
        true
    }

    pub fn reset(&mut self) {
        self.id = None;
        self.status = SessionStatus::Idle;
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    /// Follow-ups need a live session id.
    pub fn accepts_replies(&self) -> bool {
        self.status == SessionStatus::Active && self.id.is_some()
    }

    /// The initiating prompt and model cannot change once an analysis started.
    pub fn directive_frozen(&self) -> bool {
        self.status != SessionStatus::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut session = Session::default();
        assert!(session.begin());
        assert_eq!(session.status(), SessionStatus::Analyzing);
        assert!(!session.accepts_replies());
        assert!(session.activate(SessionId::new("s1")));
        assert_eq!(session.id().map(SessionId::as_str), Some("s1"));
        assert!(session.accepts_replies());
        assert!(session.directive_frozen());
    }

    #[test]
    fn failure_returns_to_idle_without_id() {
        let mut session = Session::default();
        session.begin();
        assert!(session.fail());
        assert_eq!(session, Session::default());
        assert!(!session.directive_frozen());
    }

    #[test]
    fn illegal_transitions_are_refused() {
        let mut session = Session::default();
        assert!(!session.activate(SessionId::new("s1")));
        assert!(!session.fail());

        session.begin();
        assert!(!session.begin());
        session.activate(SessionId::new("s1"));
        assert!(!session.begin());
        assert!(!session.fail());
        assert_eq!(session.status(), SessionStatus::Active);

        session.reset();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.id(), None);
    }
}
