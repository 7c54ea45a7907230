//! Operation status machine and direction.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an operation in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► InProgress ──► Closed
///    │            │
///    └────────────┴──► Voided
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Opened, no lines yet.
    #[default]
    Pending,

    /// At least one line added; damages may be registered.
    InProgress,

    /// Movements committed (terminal state).
    Closed,

    /// Abandoned, reservations released (terminal state).
    Voided,
}

impl OperationStatus {
    /// Returns true if lines can be added in this status.
    pub fn can_add_line(&self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::InProgress)
    }

    /// Returns true if damages can be registered in this status.
    pub fn can_register_damage(&self) -> bool {
        matches!(self, OperationStatus::InProgress)
    }

    /// Returns true if the operation can be closed in this status.
    pub fn can_close(&self) -> bool {
        matches!(self, OperationStatus::InProgress)
    }

    /// Returns true if the operation can be voided in this status.
    pub fn can_void(&self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::InProgress)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Closed | OperationStatus::Voided)
    }

    /// Returns the storage name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Closed => "closed",
            OperationStatus::Voided => "voided",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "in_progress" => Ok(OperationStatus::InProgress),
            "closed" => Ok(OperationStatus::Closed),
            "voided" => Ok(OperationStatus::Voided),
            other => Err(DomainError::InvalidInput(format!(
                "unknown operation status: {other}"
            ))),
        }
    }
}

/// Whether an operation brings stock in or sends it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Inbound,
    Outbound,
}

impl Direction {
    /// Returns the storage name of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            other => Err(DomainError::InvalidInput(format!(
                "unknown direction: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_pending() {
        assert_eq!(OperationStatus::default(), OperationStatus::Pending);
    }

    #[test]
    fn lines_only_while_open() {
        assert!(OperationStatus::Pending.can_add_line());
        assert!(OperationStatus::InProgress.can_add_line());
        assert!(!OperationStatus::Closed.can_add_line());
        assert!(!OperationStatus::Voided.can_add_line());
    }

    #[test]
    fn damage_and_close_require_in_progress() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::Closed,
            OperationStatus::Voided,
        ] {
            assert!(!status.can_register_damage());
            assert!(!status.can_close());
        }
        assert!(OperationStatus::InProgress.can_register_damage());
        assert!(OperationStatus::InProgress.can_close());
    }

    #[test]
    fn void_from_non_terminal_states() {
        assert!(OperationStatus::Pending.can_void());
        assert!(OperationStatus::InProgress.can_void());
        assert!(!OperationStatus::Closed.can_void());
        assert!(!OperationStatus::Voided.can_void());
    }

    #[test]
    fn storage_names_parse_back() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::InProgress,
            OperationStatus::Closed,
            OperationStatus::Voided,
        ] {
            assert_eq!(status.as_str().parse::<OperationStatus>().unwrap(), status);
        }
        assert_eq!("outbound".parse::<Direction>().unwrap(), Direction::Outbound);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
