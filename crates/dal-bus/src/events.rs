//! # Iteration Events
//!
//! The normalized stream a session re-emits after applying ledger and
//! training-service input.

use dal_types::{ClassifiedError, Round, SessionKey, SessionSnapshot};
use serde::{Deserialize, Serialize};

/// Events emitted by one iteration session.
///
/// Within a session the order is the order in which the ledger (or the
/// training-service poller) produced the input that caused them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum IterationEvent {
    /// The session's canonical state after a transition or progress update.
    StateChanged(SessionSnapshot),

    /// Training finished for `round`.
    #[serde(rename_all = "camelCase")]
    IterationCompleted { round: Round, samples_labeled: usize },

    /// A classified error the role policy chose to surface.
    Error(ClassifiedError),

    /// The ledger reports the project end condition.
    ProjectShouldEnd { reason: String, round: Round },
}

impl IterationEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::StateChanged(_) => EventTopic::StateChanged,
            Self::IterationCompleted { .. } => EventTopic::IterationCompleted,
            Self::Error(_) => EventTopic::Error,
            Self::ProjectShouldEnd { .. } => EventTopic::ProjectShouldEnd,
        }
    }

    /// Wire name used by the event log.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.topic().as_str()
    }
}

/// Envelope carrying the emitting session's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session: SessionKey,
    /// Per-session emission counter, starting at 1.
    pub seq: u64,
    pub event: IterationEvent,
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventTopic {
    StateChanged,
    IterationCompleted,
    Error,
    ProjectShouldEnd,
    /// All events (no filtering).
    All,
}

impl EventTopic {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateChanged => "state-changed",
            Self::IterationCompleted => "iteration-completed",
            Self::Error => "error",
            Self::ProjectShouldEnd => "project-should-end",
            Self::All => "all",
        }
    }
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Sessions to include. Empty means all sessions.
    pub sessions: Vec<SessionKey>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            sessions: Vec::new(),
        }
    }

    /// Create a filter for events of one session.
    #[must_use]
    pub fn for_session(session: SessionKey) -> Self {
        Self {
            topics: Vec::new(),
            sessions: vec![session],
        }
    }

    #[must_use]
    pub fn matches(&self, event: &SessionEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.event.topic());

        let session_match = self.sessions.is_empty() || self.sessions.contains(&event.session);

        topic_match && session_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dal_types::{ErrorClass, Role, Severity};

    fn key(project: &str) -> SessionKey {
        SessionKey::new(project, "0xabc")
    }

    fn envelope(project: &str, event: IterationEvent) -> SessionEvent {
        SessionEvent {
            session: key(project),
            seq: 1,
            event,
        }
    }

    #[test]
    fn test_event_topic_mapping() {
        let event = IterationEvent::IterationCompleted {
            round: 2,
            samples_labeled: 10,
        };
        assert_eq!(event.topic(), EventTopic::IterationCompleted);
        assert_eq!(event.name(), "iteration-completed");
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Error]);

        let error = envelope(
            "p1",
            IterationEvent::Error(ClassifiedError::new(
                ErrorClass::LedgerWriteFailed,
                Severity::Blocking,
                "reverted",
            )),
        );
        assert!(filter.matches(&error));

        let state = envelope(
            "p1",
            IterationEvent::StateChanged(SessionSnapshot::new(key("p1"), Role::Coordinator)),
        );
        assert!(!filter.matches(&state));
    }

    #[test]
    fn test_filter_by_session() {
        let filter = EventFilter::for_session(key("p1"));
        let event = IterationEvent::ProjectShouldEnd {
            reason: "max rounds".into(),
            round: 5,
        };

        assert!(filter.matches(&envelope("p1", event.clone())));
        assert!(!filter.matches(&envelope("p2", event)));
    }

    #[test]
    fn test_wire_format_is_tagged() {
        let event = envelope(
            "p1",
            IterationEvent::IterationCompleted {
                round: 3,
                samples_labeled: 7,
            },
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"]["type"], "iteration-completed");
        assert_eq!(json["event"]["payload"]["round"], 3);
        assert_eq!(json["event"]["payload"]["samplesLabeled"], 7);
        assert_eq!(json["session"]["project"], "p1");
    }
}
