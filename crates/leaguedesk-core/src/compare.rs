// Roster comparison: per-pair differencing and the whole-league pair scan.
//
// Rosters are small (about ten players), so both operations are plain nested
// scans rather than hash indexes over multi-criteria keys.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::matching::{matches_unchecked, MatchCriteria};
use crate::player::{PlayerRecord, Roster};

// ---------------------------------------------------------------------------
// ComparisonResult
// ---------------------------------------------------------------------------

/// Output of comparing two rosters.
///
/// Every player of `team1` lands in exactly one of `common_players` and
/// `team1_only`; every player of `team2` is either matched by a common
/// player or listed in `team2_only`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub team1: Roster,
    pub team2: Roster,
    /// The team1-side copy of each matched player.
    pub common_players: Vec<PlayerRecord>,
    pub team1_only: Vec<PlayerRecord>,
    pub team2_only: Vec<PlayerRecord>,
}

impl ComparisonResult {
    pub fn has_common_players(&self) -> bool {
        !self.common_players.is_empty()
    }

    pub fn common_count(&self) -> usize {
        self.common_players.len()
    }
}

/// Compare two rosters under `criteria`.
///
/// Each team1 player is tested against team2 in order and paired with the
/// first team2 player it matches that has not already been paired. Pairing
/// is one-to-one, so swapping the arguments yields the same number of
/// common players.
///
/// Comparing a roster with itself is not guarded: every player matches its
/// own copy and comes back as common.
pub fn diff_rosters(
    roster_a: &Roster,
    roster_b: &Roster,
    criteria: &MatchCriteria,
) -> Result<ComparisonResult> {
    criteria.validate()?;
    roster_a.validate()?;
    roster_b.validate()?;

    let mut consumed = vec![false; roster_b.players.len()];
    let mut common_players = Vec::new();
    let mut team1_only = Vec::new();

    for player in &roster_a.players {
        let hit = roster_b
            .players
            .iter()
            .enumerate()
            .find(|(idx, other)| !consumed[*idx] && matches_unchecked(player, other, criteria))
            .map(|(idx, _)| idx);

        match hit {
            Some(idx) => {
                consumed[idx] = true;
                common_players.push(player.clone());
            }
            None => team1_only.push(player.clone()),
        }
    }

    let team2_only = roster_b
        .players
        .iter()
        .zip(&consumed)
        .filter(|(_, used)| !**used)
        .map(|(p, _)| p.clone())
        .collect();

    Ok(ComparisonResult {
        team1: roster_a.clone(),
        team2: roster_b.clone(),
        common_players,
        team1_only,
        team2_only,
    })
}

// ---------------------------------------------------------------------------
// Pairwise scan
// ---------------------------------------------------------------------------

/// A pair of rosters the scan could not compare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairFailure {
    pub team1_index: usize,
    pub team2_index: usize,
    pub team1_name: String,
    pub team2_name: String,
    pub reason: String,
}

/// Everything a league scan produced. `results` plus `failures` always
/// covers every unordered pair exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub results: Vec<ComparisonResult>,
    pub failures: Vec<PairFailure>,
}

impl ScanReport {
    /// True when at least one pair could not be diffed.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Only the pairs that share at least one player.
    pub fn interesting(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.results.iter().filter(|r| r.has_common_players())
    }

    pub fn pair_count(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

/// Number of unordered pairs over `n` rosters.
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Diff every unordered pair `{i, j}` with `i < j`, in index order.
///
/// Invalid criteria fail the whole scan, since no pair could succeed. A pair
/// that fails for roster reasons is recorded in `failures` and the scan
/// carries on; results with no common players are kept.
pub fn scan_all_pairs(rosters: &[Roster], criteria: &MatchCriteria) -> Result<ScanReport> {
    criteria.validate()?;

    let mut report = ScanReport {
        results: Vec::with_capacity(pair_count(rosters.len())),
        failures: Vec::new(),
    };

    for (i, a) in rosters.iter().enumerate() {
        for (j, b) in rosters.iter().enumerate().skip(i + 1) {
            match diff_rosters(a, b, criteria) {
                Ok(result) => report.results.push(result),
                Err(e) => report.failures.push(PairFailure {
                    team1_index: i,
                    team2_index: j,
                    team1_name: a.team_name.clone(),
                    team2_name: b.team_name.clone(),
                    reason: e.to_string(),
                }),
            }
        }
    }

    Ok(report)
}
