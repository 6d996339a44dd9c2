use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// False while the request that produced this turn is still in flight.
    #[serde(skip)]
    pub confirmed: bool,
}

/// Ordered conversation for the current session.
///
/// Append-only, except that unconfirmed turns can be rolled back by text when
/// their request fails.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn push_pending(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn {
            role,
            text: text.into(),
            confirmed: false,
        });
    }

    pub fn push_confirmed(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn {
            role,
            text: text.into(),
            confirmed: true,
        });
    }

    /// Marks the oldest unconfirmed turn with this role and text as confirmed.
    pub fn confirm(&mut self, role: Role, text: &str) -> bool {
        match self
            .turns
            .iter_mut()
            .find(|t| !t.confirmed && t.role == role && t.text == text)
        {
            Some(turn) => {
                turn.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Removes unconfirmed turns with this role and text. Confirmed turns are
    /// never touched. Returns how many were removed.
    pub fn rollback(&mut self, role: Role, text: &str) -> usize {
        let before = self.turns.len();
        self.turns
            .retain(|t| t.confirmed || t.role != role || t.text != text);
        before - self.turns.len()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_only_removes_matching_unconfirmed() {
        let mut log = ConversationLog::default();
        log.push_confirmed(Role::User, "check the lows");
        log.push_confirmed(Role::Model, "kick is boomy");
        log.push_pending(Role::User, "check the lows");

        assert_eq!(log.rollback(Role::User, "check the lows"), 1);
        assert_eq!(log.len(), 2);
        assert!(log.turns().iter().all(|t| t.confirmed));
    }

    #[test]
    fn confirm_settles_oldest_pending() {
        let mut log = ConversationLog::default();
        log.push_pending(Role::User, "again");
        log.push_pending(Role::User, "again");
        assert!(log.confirm(Role::User, "again"));
        assert!(log.turns()[0].confirmed);
        assert!(!log.turns()[1].confirmed);
        assert!(!log.confirm(Role::Model, "again"));
    }

    #[test]
    fn transcript_serializes_role_and_text() {
        let mut log = ConversationLog::default();
        log.push_confirmed(Role::User, "hi");
        log.push_confirmed(Role::Model, "hello");
        let json = serde_json::to_string(&log).unwrap();
        assert_eq!(
            json,
            r#"[{"role":"user","text":"hi"},{"role":"model","text":"hello"}]"#
        );
    }
}
