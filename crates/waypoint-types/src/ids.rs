//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Actors and messages carry strongly-typed IDs so an actor id can never be
//! passed where a message id is expected. All IDs use UUID v7 (time-ordered),
//! which keeps `BTreeMap` iteration close to creation order.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an actor (scout, strategist, builder, ...).
    AgentId
}

define_id! {
    /// Unique identifier for a message on the coordination queue.
    MessageId
}

impl AgentId {
    /// Sender id used for messages produced by the coordination layer itself
    /// (allocation replies, conflict follow-ups).
    pub const COORDINATOR: Self = Self(Uuid::nil());

    /// Whether this id is the coordination layer's own sender id.
    pub const fn is_coordinator(self) -> bool {
        self.0.is_nil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = AgentId::new();
        let b = AgentId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn coordinator_id_is_nil() {
        assert!(AgentId::COORDINATOR.is_coordinator());
        assert!(!AgentId::new().is_coordinator());
    }

    #[test]
    fn id_round_trips_through_uuid() {
        let id = MessageId::new();
        let raw: Uuid = id.into();
        assert_eq!(MessageId::from(raw), id);
        assert_eq!(id.to_string(), raw.to_string());
    }
}
