use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One gameweek's recorded outcome for a fantasy team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub team_id: String,
    /// 1-based gameweek number.
    pub gameweek: u32,
    pub points: i64,
    /// 1-based league rank after this gameweek.
    pub rank: u32,
    /// When the gameweek result was recorded. Badges triggered by this
    /// snapshot take it as their award time.
    pub recorded_at: DateTime<Utc>,
}

impl PerformanceSnapshot {
    pub fn validate(&self) -> Result<()> {
        if self.gameweek == 0 {
            return Err(CoreError::InvalidSnapshot {
                gameweek: self.gameweek,
                reason: "gameweek must be at least 1".into(),
            });
        }
        if self.rank == 0 {
            return Err(CoreError::InvalidSnapshot {
                gameweek: self.gameweek,
                reason: "rank must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Validate every snapshot and return them ordered by gameweek.
///
/// Two snapshots for the same gameweek are rejected: the history would not
/// say which one counts.
pub fn ordered_history(history: &[PerformanceSnapshot]) -> Result<Vec<&PerformanceSnapshot>> {
    for snapshot in history {
        snapshot.validate()?;
    }

    let mut ordered: Vec<&PerformanceSnapshot> = history.iter().collect();
    ordered.sort_by_key(|s| s.gameweek);

    if let Some(pair) = ordered.windows(2).find(|w| w[0].gameweek == w[1].gameweek) {
        return Err(CoreError::InvalidSnapshot {
            gameweek: pair[0].gameweek,
            reason: "gameweek recorded more than once".into(),
        });
    }

    Ok(ordered)
}
