use thiserror::Error;

/// Errors raised by the reconciliation and badge rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Neither email nor name matching was enabled.
    #[error("invalid match criteria: at least one of byEmail or byName must be enabled")]
    InvalidCriteria,

    /// A requested team was not present in the fetched collection.
    #[error("team not found: {name}")]
    TeamNotFound { name: String },

    /// A roster document could not be turned into a usable roster.
    #[error("malformed roster `{team}`: {reason}")]
    MalformedRoster { team: String, reason: String },

    /// A performance snapshot carried an out-of-range field.
    #[error("invalid snapshot for gameweek {gameweek}: {reason}")]
    InvalidSnapshot { gameweek: u32, reason: String },

    /// A badge definition whose rule can never be evaluated sensibly.
    #[error("invalid rule for badge `{badge}`: {reason}")]
    InvalidBadgeRule { badge: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
