//! Newtype identifiers, each wrapping a `uuid::Uuid` the way the rest of
//! the workspace wraps protocol-adjacent IDs (spec.md §3 "id" fields).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(BackendId);
uuid_id!(NamespaceId);
uuid_id!(SessionId);
uuid_id!(OrgId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_json() {
        let id = BackendId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: BackendId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn distinct_ids_are_not_equal() {
        assert_ne!(NamespaceId::new(), NamespaceId::new());
    }
}
