//! # Identifiers
//!
//! Newtypes for the string identifiers that flow between the ledger, the
//! training service and the UI.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A labeling round number as reported by the ledger.
pub type Round = u64;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a labeling project (one voting contract deployment).
    ProjectId
);

string_id!(
    /// Ledger address of a participant.
    ParticipantAddress
);

string_id!(
    /// Identifier of a sample within a batch.
    SampleId
);

/// Key of a session: one per (project, participant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub project: ProjectId,
    pub participant: ParticipantAddress,
}

impl SessionKey {
    pub fn new(project: impl Into<ProjectId>, participant: impl Into<ParticipantAddress>) -> Self {
        Self {
            project: project.into(),
            participant: participant.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = SampleId::new("s1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s1\"");

        let back: SampleId = serde_json::from_str("\"s1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_session_key_display() {
        let key = SessionKey::new("iris", "0xabc");
        assert_eq!(key.to_string(), "iris/0xabc");
    }
}
