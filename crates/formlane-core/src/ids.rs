//! Strongly typed identifiers.
//!
//! Newtype wrappers around UUIDs so that user, workspace, invite, and
//! provider-link identifiers cannot be confused at compile time.
//!
//! # Example
//!
//! ```
//! use formlane_core::{UserId, WorkspaceId};
//!
//! let user = UserId::new();
//! let workspace = WorkspaceId::new();
//!
//! fn requires_user(id: UserId) -> String {
//!     id.to_string()
//! }
//!
//! let _ = requires_user(user);
//! // requires_user(workspace); // does not compile
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The underlying UUID parse error message.
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier for a Formlane user account.
    UserId
);

define_id!(
    /// Identifier for a workspace (a team owning forms and members).
    WorkspaceId
);

define_id!(
    /// Identifier for a workspace invitation.
    InviteId
);

define_id!(
    /// Identifier for an external identity-provider link.
    LinkId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_string() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_failure_names_type() {
        let err = "not-a-uuid".parse::<WorkspaceId>().unwrap_err();
        assert_eq!(err.id_type, "WorkspaceId");
    }

    #[test]
    fn test_serde_transparent() {
        let id = InviteId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = LinkId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
    }
}
