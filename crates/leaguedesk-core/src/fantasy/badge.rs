// Badge definitions and their threshold rules.
//
// Each rule kind knows how to find the snapshot that first satisfies it and,
// where the rule is a linear threshold, how close an unearned badge is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CoreError, Result};
use crate::fantasy::snapshot::PerformanceSnapshot;

// ---------------------------------------------------------------------------
// BadgeType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeType {
    Century,
    DoubleCentury,
    TopTen,
    Podium,
    LeagueLeader,
    HotStreak,
    Consistent,
    #[serde(rename = "season_1000")]
    Season1000,
}

impl BadgeType {
    pub const ALL: [BadgeType; 8] = [
        BadgeType::Century,
        BadgeType::DoubleCentury,
        BadgeType::TopTen,
        BadgeType::Podium,
        BadgeType::LeagueLeader,
        BadgeType::HotStreak,
        BadgeType::Consistent,
        BadgeType::Season1000,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeType::Century => "century",
            BadgeType::DoubleCentury => "double_century",
            BadgeType::TopTen => "top_ten",
            BadgeType::Podium => "podium",
            BadgeType::LeagueLeader => "league_leader",
            BadgeType::HotStreak => "hot_streak",
            BadgeType::Consistent => "consistent",
            BadgeType::Season1000 => "season_1000",
        }
    }
}

impl fmt::Display for BadgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BadgeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BadgeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unknown badge type `{s}`"))
    }
}

// ---------------------------------------------------------------------------
// BadgeRule
// ---------------------------------------------------------------------------

/// The condition a team's history must meet to earn a badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BadgeRule {
    /// At least `min_points` in a single gameweek.
    SingleGameweekPoints { min_points: i64 },
    /// Running season total reaches `min_total`.
    SeasonPoints { min_total: i64 },
    /// League rank at or above `max_rank` after any gameweek.
    RankAtMost { max_rank: u32 },
    /// `weeks` consecutive gameweeks ranked at or above `max_rank`.
    RankStreak { max_rank: u32, weeks: u32 },
    /// `weeks` consecutive gameweeks scoring at least `min_points`.
    PointsStreak { min_points: i64, weeks: u32 },
}

/// The snapshot that satisfied a rule and what it achieved.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// Index into the gameweek-ordered history.
    pub index: usize,
    pub metadata: serde_json::Value,
}

impl BadgeRule {
    /// Reject thresholds that are trivially met or can never be met.
    pub fn validate(&self, badge: BadgeType) -> Result<()> {
        let invalid = |reason: &str| {
            Err(CoreError::InvalidBadgeRule {
                badge: badge.to_string(),
                reason: reason.to_string(),
            })
        };
        match *self {
            BadgeRule::SingleGameweekPoints { min_points } if min_points <= 0 => {
                invalid("min_points must be > 0")
            }
            BadgeRule::SeasonPoints { min_total } if min_total <= 0 => {
                invalid("min_total must be > 0")
            }
            BadgeRule::RankAtMost { max_rank } if max_rank == 0 => invalid("max_rank must be >= 1"),
            BadgeRule::RankStreak { max_rank, .. } if max_rank == 0 => {
                invalid("max_rank must be >= 1")
            }
            BadgeRule::PointsStreak { min_points, .. } if min_points <= 0 => {
                invalid("min_points must be > 0")
            }
            BadgeRule::RankStreak { weeks, .. } | BadgeRule::PointsStreak { weeks, .. }
                if weeks < 2 =>
            {
                invalid("weeks must be >= 2")
            }
            _ => Ok(()),
        }
    }

    /// First snapshot, in gameweek order, at which the rule holds.
    pub fn first_trigger(&self, history: &[&PerformanceSnapshot]) -> Option<Trigger> {
        match *self {
            BadgeRule::SingleGameweekPoints { min_points } => history
                .iter()
                .position(|s| s.points >= min_points)
                .map(|index| Trigger {
                    index,
                    metadata: json!({ "points": history[index].points }),
                }),
            BadgeRule::SeasonPoints { min_total } => {
                let mut total = 0i64;
                history.iter().enumerate().find_map(|(index, s)| {
                    total = total.saturating_add(s.points);
                    (total >= min_total).then(|| Trigger {
                        index,
                        metadata: json!({ "totalPoints": total }),
                    })
                })
            }
            BadgeRule::RankAtMost { max_rank } => history
                .iter()
                .position(|s| s.rank <= max_rank)
                .map(|index| Trigger {
                    index,
                    metadata: json!({ "rank": history[index].rank }),
                }),
            BadgeRule::RankStreak { max_rank, weeks } => {
                streak_end(history, weeks, |s| s.rank <= max_rank).map(|index| Trigger {
                    index,
                    metadata: json!({ "streak": weeks, "rank": history[index].rank }),
                })
            }
            BadgeRule::PointsStreak { min_points, weeks } => {
                streak_end(history, weeks, |s| s.points >= min_points).map(|index| Trigger {
                    index,
                    metadata: json!({ "streak": weeks, "points": history[index].points }),
                })
            }
        }
    }

    /// Percent progress toward an unearned badge, or `None` when the rule is
    /// not a linear threshold (rank and streak rules).
    pub fn progress(&self, history: &[&PerformanceSnapshot]) -> Option<u8> {
        match *self {
            BadgeRule::SingleGameweekPoints { min_points } => {
                let best = history.iter().map(|s| s.points).max().unwrap_or(0);
                Some(percent_of(best, min_points))
            }
            BadgeRule::SeasonPoints { min_total } => {
                let total = history
                    .iter()
                    .fold(0i64, |acc, s| acc.saturating_add(s.points));
                Some(percent_of(total, min_total))
            }
            BadgeRule::RankAtMost { .. }
            | BadgeRule::RankStreak { .. }
            | BadgeRule::PointsStreak { .. } => None,
        }
    }
}

/// Index of the snapshot completing the first run of `weeks` consecutive
/// gameweeks that all satisfy `holds`. A missing gameweek breaks the run.
fn streak_end<F>(history: &[&PerformanceSnapshot], weeks: u32, holds: F) -> Option<usize>
where
    F: Fn(&PerformanceSnapshot) -> bool,
{
    let mut run = 0u32;
    let mut prev_week: Option<u32> = None;

    for (index, &s) in history.iter().enumerate() {
        let contiguous = prev_week.is_some_and(|w| w + 1 == s.gameweek);
        run = match (holds(s), contiguous) {
            (false, _) => 0,
            (true, true) => run + 1,
            (true, false) => 1,
        };
        prev_week = Some(s.gameweek);

        if run >= weeks {
            return Some(index);
        }
    }
    None
}

/// Floor of `current / threshold` as a percentage, capped at 99 because a
/// value at the threshold is an earned badge, not progress.
fn percent_of(current: i64, threshold: i64) -> u8 {
    if current <= 0 || threshold <= 0 {
        return 0;
    }
    let pct = (i128::from(current) * 100) / i128::from(threshold);
    pct.min(99) as u8
}

// ---------------------------------------------------------------------------
// BadgeDefinition
// ---------------------------------------------------------------------------

/// A named achievement and the rule that awards it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    pub badge_type: BadgeType,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub rule: BadgeRule,
}

impl BadgeDefinition {
    pub fn validate(&self) -> Result<()> {
        self.rule.validate(self.badge_type)
    }
}

fn def(
    badge_type: BadgeType,
    name: &str,
    description: &str,
    icon: &str,
    color: &str,
    rule: BadgeRule,
) -> BadgeDefinition {
    BadgeDefinition {
        badge_type,
        name: name.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        color: color.to_string(),
        rule,
    }
}

/// The built-in badge table.
pub fn default_definitions() -> Vec<BadgeDefinition> {
    vec![
        def(
            BadgeType::Century,
            "Century",
            "Score 100 points or more in a single gameweek",
            "💯",
            "#f59e0b",
            BadgeRule::SingleGameweekPoints { min_points: 100 },
        ),
        def(
            BadgeType::DoubleCentury,
            "Double Century",
            "Score 200 points or more in a single gameweek",
            "🔥",
            "#ef4444",
            BadgeRule::SingleGameweekPoints { min_points: 200 },
        ),
        def(
            BadgeType::TopTen,
            "Top Ten",
            "Finish a gameweek ranked in the top 10",
            "🏅",
            "#3b82f6",
            BadgeRule::RankAtMost { max_rank: 10 },
        ),
        def(
            BadgeType::Podium,
            "Podium",
            "Finish a gameweek ranked in the top 3",
            "🥉",
            "#a855f7",
            BadgeRule::RankAtMost { max_rank: 3 },
        ),
        def(
            BadgeType::LeagueLeader,
            "League Leader",
            "Top the league standings after a gameweek",
            "👑",
            "#eab308",
            BadgeRule::RankAtMost { max_rank: 1 },
        ),
        def(
            BadgeType::HotStreak,
            "Hot Streak",
            "Stay in the top 10 for three consecutive gameweeks",
            "⚡",
            "#f97316",
            BadgeRule::RankStreak {
                max_rank: 10,
                weeks: 3,
            },
        ),
        def(
            BadgeType::Consistent,
            "Mr. Consistent",
            "Score at least 50 points in five consecutive gameweeks",
            "📈",
            "#10b981",
            BadgeRule::PointsStreak {
                min_points: 50,
                weeks: 5,
            },
        ),
        def(
            BadgeType::Season1000,
            "Thousand Club",
            "Reach 1000 points over the season",
            "🏆",
            "#6366f1",
            BadgeRule::SeasonPoints { min_total: 1000 },
        ),
    ]
}
