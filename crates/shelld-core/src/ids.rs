//! Opaque identifiers for the daemon's owned resources.
//!
//! Each id is a thin newtype over `String` so execution/terminal/subscriber
//! ids can't be mixed up at call sites, while still round-tripping through
//! JSON and the control-channel protocol as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a new id (UUIDv4), the default for caller-omitted ids.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Wrap a caller-supplied id verbatim.
            pub fn from_str_id(id: impl Into<String>) -> Self {
                Self(id.into())
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

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(ExecutionId);
string_id!(TerminalId);
string_id!(SubscriberId);
string_id!(MonitorId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_ids() {
        let a = ExecutionId::generate();
        let b = ExecutionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn from_str_id_preserves_caller_value() {
        let id = ExecutionId::from_str_id("caller-chosen-id");
        assert_eq!(id.as_str(), "caller-chosen-id");
        assert_eq!(id.to_string(), "caller-chosen-id");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TerminalId::from_str_id("t-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"t-1\"");
        let back: TerminalId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
