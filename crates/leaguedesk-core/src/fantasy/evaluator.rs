// Badge evaluation over a team's performance history.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fantasy::badge::{BadgeDefinition, BadgeType};
use crate::fantasy::snapshot::{ordered_history, PerformanceSnapshot};

/// A badge awarded to a user, stamped with the snapshot that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnedBadge {
    pub user_id: String,
    pub badge_type: BadgeType,
    pub earned_at: DateTime<Utc>,
    pub gameweek: u32,
    pub metadata: serde_json::Value,
}

/// Earned badges plus progress toward the ones still out of reach.
///
/// `progress` has no entry for an earned badge. A `None` entry means the
/// rule has no meaningful percentage (rank or streak rules).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeEvaluation {
    pub earned: Vec<EarnedBadge>,
    pub progress: BTreeMap<BadgeType, Option<u8>>,
}

impl BadgeEvaluation {
    pub fn is_earned(&self, badge_type: BadgeType) -> bool {
        self.earned.iter().any(|b| b.badge_type == badge_type)
    }

    /// Earned badges whose type is not in `already`.
    pub fn newly_earned<'a>(&'a self, already: &HashSet<BadgeType>) -> Vec<&'a EarnedBadge> {
        self.earned
            .iter()
            .filter(|b| !already.contains(&b.badge_type))
            .collect()
    }
}

/// Evaluate every definition against `history` for `user_id`.
///
/// The history is validated and ordered by gameweek first, so the input
/// order does not matter. The earliest qualifying snapshot fixes each
/// badge's gameweek and award time, which makes repeated evaluation of the
/// same history return identical badges. When two definitions share a
/// badge type only the first is used.
pub fn evaluate_badges(
    user_id: &str,
    history: &[PerformanceSnapshot],
    definitions: &[BadgeDefinition],
) -> Result<BadgeEvaluation> {
    let ordered = ordered_history(history)?;
    let mut seen = HashSet::new();
    let mut evaluation = BadgeEvaluation::default();

    for definition in definitions {
        if !seen.insert(definition.badge_type) {
            continue;
        }

        match definition.rule.first_trigger(&ordered) {
            Some(trigger) => {
                let snapshot = ordered[trigger.index];
                evaluation.earned.push(EarnedBadge {
                    user_id: user_id.to_string(),
                    badge_type: definition.badge_type,
                    earned_at: snapshot.recorded_at,
                    gameweek: snapshot.gameweek,
                    metadata: trigger.metadata,
                });
            }
            None => {
                evaluation
                    .progress
                    .insert(definition.badge_type, definition.rule.progress(&ordered));
            }
        }
    }

    Ok(evaluation)
}
