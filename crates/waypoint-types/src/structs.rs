//! Core value types: grid coordinates, structure markers, and messages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Direction, MessageKind, Priority};
use crate::ids::{AgentId, MessageId};

// ---------------------------------------------------------------------------
// Coord
// ---------------------------------------------------------------------------

/// A cell coordinate. `(0, 0)` is the north-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coord {
    /// Column, growing eastwards.
    pub x: u32,
    /// Row, growing southwards.
    pub y: u32,
}

impl Coord {
    /// Create a coordinate.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The neighbouring coordinate in `direction`, or `None` when it would
    /// leave the non-negative quadrant.
    pub const fn step(self, direction: Direction) -> Option<Self> {
        match direction {
            Direction::North => match self.y.checked_sub(1) {
                Some(y) => Some(Self::new(self.x, y)),
                None => None,
            },
            Direction::South => match self.y.checked_add(1) {
                Some(y) => Some(Self::new(self.x, y)),
                None => None,
            },
            Direction::East => match self.x.checked_add(1) {
                Some(x) => Some(Self::new(x, self.y)),
                None => None,
            },
            Direction::West => match self.x.checked_sub(1) {
                Some(x) => Some(Self::new(x, self.y)),
                None => None,
            },
        }
    }

    /// Manhattan distance to `other`.
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).saturating_add(self.y.abs_diff(other.y))
    }

    /// The `"x,y"` key used in serialized grid snapshots.
    pub fn key(self) -> String {
        format!("{},{}", self.x, self.y)
    }

    /// Parse an `"x,y"` or `"(x, y)"` pair.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim().trim_start_matches('(').trim_end_matches(')');
        let (x, y) = trimmed.split_once(',')?;
        Some(Self::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
    }
}

impl core::fmt::Display for Coord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// The structure marker on a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Structure {
    /// Nothing has been built here.
    #[default]
    None,
    /// A building placed by an actor.
    Building {
        /// The actor that placed the building.
        owner: AgentId,
    },
    /// The cell was scanned and marked by a scout. A building may replace
    /// the marker.
    Scanned,
}

impl Structure {
    /// Whether any structure occupies the cell.
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the structure is a building (counts towards the build target).
    pub const fn is_building(self) -> bool {
        matches!(self, Self::Building { .. })
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A message exchanged between actors through the coordination queue.
///
/// A message with no `recipient` is a broadcast and may be dequeued by any
/// actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// The actor that sent the message.
    pub sender: AgentId,
    /// The intended recipient, or `None` for broadcast.
    pub recipient: Option<AgentId>,
    /// Free-text payload.
    pub content: String,
    /// What the message is for.
    pub kind: MessageKind,
    /// Dequeue priority.
    pub priority: Priority,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// Time-to-live in milliseconds. `None` never expires.
    pub ttl_ms: Option<u64>,
    /// Whether the recipient must acknowledge the message.
    pub requires_ack: bool,
    /// Delivery attempts so far.
    pub retry_count: u32,
    /// Maximum delivery attempts.
    pub max_retries: u32,
    /// The message this one replies to.
    pub parent_id: Option<MessageId>,
    /// Free-form key/value metadata (e.g. `resource_type`, `amount`).
    pub metadata: BTreeMap<String, String>,
}

impl Message {
    /// Create a broadcast [`MessageKind::Report`] at normal priority.
    pub fn new(sender: AgentId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            recipient: None,
            content: content.into(),
            kind: MessageKind::Report,
            priority: Priority::Normal,
            created_at: Utc::now(),
            ttl_ms: None,
            requires_ack: false,
            retry_count: 0,
            max_retries: 3,
            parent_id: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Address the message to a single recipient.
    #[must_use]
    pub const fn to(mut self, recipient: AgentId) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Set the message kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Expire the message `ttl_ms` milliseconds after creation.
    #[must_use]
    pub const fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    /// Require an acknowledgment from the recipient.
    #[must_use]
    pub const fn requiring_ack(mut self) -> Self {
        self.requires_ack = true;
        self
    }

    /// Link this message to the one it answers.
    #[must_use]
    pub const fn in_reply_to(mut self, parent: MessageId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build the acknowledgment `acker` sends back for this message.
    pub fn ack_for(&self, acker: AgentId) -> Self {
        Self::new(acker, format!("ACK {}", self.id))
            .to(self.sender)
            .with_kind(MessageKind::Ack)
            .in_reply_to(self.id)
    }

    /// Whether the message is a broadcast.
    pub const fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }

    /// Whether `agent` may receive this message.
    pub fn is_for(&self, agent: AgentId) -> bool {
        self.recipient.is_none_or(|recipient| recipient == agent)
    }

    /// Whether the time-to-live has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl_ms) = self.ttl_ms else {
            return false;
        };
        let age_ms = now.signed_duration_since(self.created_at).num_milliseconds();
        i64::try_from(ttl_ms).is_ok_and(|ttl| age_ms > ttl)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn coord_step_clamps_at_origin() {
        let origin = Coord::new(0, 0);
        assert_eq!(origin.step(Direction::North), None);
        assert_eq!(origin.step(Direction::West), None);
        assert_eq!(origin.step(Direction::East), Some(Coord::new(1, 0)));
        assert_eq!(origin.step(Direction::South), Some(Coord::new(0, 1)));
    }

    #[test]
    fn coord_parse_and_display() {
        assert_eq!(Coord::parse("(3, 2)"), Some(Coord::new(3, 2)));
        assert_eq!(Coord::parse("4,1"), Some(Coord::new(4, 1)));
        assert_eq!(Coord::parse("four,1"), None);
        assert_eq!(Coord::new(3, 2).to_string(), "(3, 2)");
        assert_eq!(Coord::new(3, 2).key(), "3,2");
        assert_eq!(Coord::new(0, 0).manhattan(Coord::new(3, 4)), 7);
    }

    #[test]
    fn structure_predicates() {
        assert!(!Structure::None.is_present());
        assert!(Structure::Scanned.is_present());
        assert!(!Structure::Scanned.is_building());
        assert!(Structure::Building { owner: AgentId::new() }.is_building());
        assert_eq!(Structure::default(), Structure::None);
    }

    #[test]
    fn broadcast_reaches_everyone() {
        let sender = AgentId::new();
        let other = AgentId::new();
        let msg = Message::new(sender, "hello");
        assert!(msg.is_broadcast());
        assert!(msg.is_for(other));

        let direct = Message::new(sender, "hi").to(sender);
        assert!(!direct.is_for(other));
        assert!(direct.is_for(sender));
    }

    #[test]
    fn ttl_expiry() {
        let msg = Message::new(AgentId::new(), "short-lived").with_ttl(1_000);
        assert!(!msg.is_expired(msg.created_at));
        assert!(msg.is_expired(msg.created_at + Duration::seconds(2)));

        let forever = Message::new(AgentId::new(), "forever");
        assert!(!forever.is_expired(forever.created_at + Duration::days(365)));
    }

    #[test]
    fn ack_links_parent() {
        let sender = AgentId::new();
        let acker = AgentId::new();
        let original = Message::new(sender, "do it").to(acker).requiring_ack();
        let ack = original.ack_for(acker);
        assert_eq!(ack.kind, MessageKind::Ack);
        assert_eq!(ack.parent_id, Some(original.id));
        assert_eq!(ack.recipient, Some(sender));
    }
}
