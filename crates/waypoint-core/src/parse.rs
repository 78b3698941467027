//! Oracle reply parsing into typed actions.
//!
//! The oracle is asked for a single action line but may wrap it in a
//! markdown code fence, prefix it with `Action:`, or answer with a JSON
//! object carrying an `action` field. Anything that still does not parse
//! becomes [`Action::Unknown`]; actors treat that like a wait and fall back
//! on their built-in behaviour.

use serde::{Deserialize, Serialize};
use tracing::warn;
use waypoint_types::{Coord, Direction, ResourceKind};

/// A parsed actor action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Action {
    /// Step one cell.
    Move(Direction),
    /// Look at the neighbouring cells and report.
    Observe,
    /// Broadcast free-form findings.
    Report(String),
    /// Build at a coordinate.
    Build(Coord),
    /// Re-scan the grid for build sites.
    Analyze,
    /// Propose a specific build site.
    SuggestBuild(Coord),
    /// Ask the coordinator for resources from the shared pool.
    RequestResource {
        /// The resource wanted.
        kind: ResourceKind,
        /// Units wanted.
        amount: u32,
    },
    /// Do nothing this turn.
    Wait,
    /// The reply could not be understood.
    Unknown(String),
}

/// Intermediate shape for JSON replies.
#[derive(Debug, Deserialize)]
struct JsonReply {
    action: String,
}

/// Parse an oracle reply into an [`Action`].
///
/// Unparsable replies yield [`Action::Unknown`] with a warning log.
pub fn parse_action(raw: &str) -> Action {
    let line = extract_line(raw);
    match parse_line(&line) {
        Some(action) => action,
        None => {
            warn!(raw_response = raw, "failed to parse oracle reply, treating as unknown");
            Action::Unknown(line)
        }
    }
}

/// Pull the action line out of whatever the oracle sent.
fn extract_line(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(reply) = serde_json::from_str::<JsonReply>(trimmed) {
        return reply.action.trim().to_owned();
    }
    trimmed
        .lines()
        .map(|line| line.trim().trim_matches('`').trim())
        .find(|line| !line.is_empty())
        .map(|line| {
            let lowered = line.to_ascii_lowercase();
            if lowered.starts_with("action:") {
                line.get("action:".len()..).unwrap_or_default().trim()
            } else {
                line
            }
        })
        .unwrap_or_default()
        .to_owned()
}

/// Parse one clean action line. `None` if the verb or argument is invalid.
fn parse_line(line: &str) -> Option<Action> {
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));
    match verb.to_ascii_uppercase().as_str() {
        "MOVE" => Direction::parse(rest).map(Action::Move),
        "OBSERVE" => Some(Action::Observe),
        "REPORT" => Some(Action::Report(rest.to_owned())),
        "BUILD" => Coord::parse(rest).map(Action::Build),
        "ANALYZE" | "ANALYSE" => Some(Action::Analyze),
        "SUGGEST_BUILD" => Coord::parse(rest).map(Action::SuggestBuild),
        "REQUEST_RESOURCE" => {
            let (kind, amount) = rest.split_once(char::is_whitespace)?;
            Some(Action::RequestResource {
                kind: ResourceKind::parse(kind)?,
                amount: amount.trim().parse().ok()?,
            })
        }
        "WAIT" => Some(Action::Wait),
        _ => None,
    }
}
