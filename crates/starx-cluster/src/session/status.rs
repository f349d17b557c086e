use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session.
///
/// States advance one step at a time, `Start → Handshaking → Working`.
/// `Closed` is terminal and reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Start = 1,
    Handshaking = 2,
    Working = 3,
    Closed = 4,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Start => "start",
            SessionStatus::Handshaking => "handshaking",
            SessionStatus::Working => "working",
            SessionStatus::Closed => "closed",
        }
    }

    /// The state one step forward, if any.
    pub fn next(&self) -> Option<SessionStatus> {
        match self {
            SessionStatus::Start => Some(SessionStatus::Handshaking),
            SessionStatus::Handshaking => Some(SessionStatus::Working),
            SessionStatus::Working => Some(SessionStatus::Closed),
            SessionStatus::Closed => None,
        }
    }

    pub fn can_advance_to(&self, to: SessionStatus) -> bool {
        match (self, to) {
            (SessionStatus::Closed, _) => false,
            (_, SessionStatus::Closed) => true,
            (from, to) => from.next() == Some(to),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self == SessionStatus::Closed
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SessionStatus; 4] = [
        SessionStatus::Start,
        SessionStatus::Handshaking,
        SessionStatus::Working,
        SessionStatus::Closed,
    ];

    #[test]
    fn test_forward_single_steps() {
        assert!(SessionStatus::Start.can_advance_to(SessionStatus::Handshaking));
        assert!(SessionStatus::Handshaking.can_advance_to(SessionStatus::Working));
        assert!(SessionStatus::Working.can_advance_to(SessionStatus::Closed));
    }

    #[test]
    fn test_closed_reachable_from_every_open_state() {
        for from in ALL.into_iter().filter(|s| !s.is_closed()) {
            assert!(from.can_advance_to(SessionStatus::Closed), "from {}", from);
        }
    }

    #[test]
    fn test_backward_skip_and_self_transitions_rejected() {
        for from in ALL {
            for to in ALL {
                let allowed = from.can_advance_to(to);
                let expected = !from.is_closed() && (to.is_closed() || from.next() == Some(to));
                assert_eq!(allowed, expected, "{} -> {}", from, to);
            }
        }
        assert!(!SessionStatus::Start.can_advance_to(SessionStatus::Working));
        assert!(!SessionStatus::Working.can_advance_to(SessionStatus::Start));
    }
}
