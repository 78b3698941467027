//! Error types for the `waypoint-world` crate.
//!
//! Expected outcomes such as an occupied cell or an empty deposit are not
//! errors; those operations return `bool` or `0`. [`WorldError`] covers
//! invalid construction and arithmetic that should never fail.

use waypoint_types::Coord;

/// Errors that can occur while building or updating the grid.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The grid must have at least one row and one column.
    #[error("invalid grid dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A coordinate lies outside the grid.
    #[error("coordinate {0} is out of bounds")]
    OutOfBounds(Coord),

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow in world calculation")]
    ArithmeticOverflow,
}
