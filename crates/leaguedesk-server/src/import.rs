// CSV import of team rosters and fantasy performance history.
//
// Roster rows carry one player each and are grouped by team id. History rows
// carry one gameweek each and also link the user to their fantasy team.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use leaguedesk_core::fantasy::PerformanceSnapshot;
use leaguedesk_core::player::{PlayerDocument, RosterDocument};
use leaguedesk_core::Roster;
use serde::Deserialize;
use tracing::{info, warn};

use crate::db::{Database, FantasyTeam};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawRosterRow {
    team_id: String,
    team_name: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    jersey_number: Option<String>,
    #[serde(default)]
    position: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawHistoryRow {
    user_id: String,
    team_id: String,
    team_name: String,
    gameweek: u32,
    points: i64,
    rank: u32,
    recorded_at: String,
}

/// One imported gameweek plus the user/team link it came with.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub team: FantasyTeam,
    pub snapshot: PerformanceSnapshot,
}

// ---------------------------------------------------------------------------
// Reader-based loaders (private, enable testing without temp files)
// ---------------------------------------------------------------------------

fn load_rosters_from_reader<R: Read>(rdr: R) -> Result<Vec<Roster>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut docs: Vec<RosterDocument> = Vec::new();

    for result in reader.deserialize::<RawRosterRow>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed roster row: {}", e);
                continue;
            }
        };

        let team_id = raw.team_id.trim();
        if team_id.is_empty() || raw.team_name.trim().is_empty() {
            warn!("skipping roster row without team id or name");
            continue;
        }
        if raw.first_name.trim().is_empty()
            && raw.last_name.trim().is_empty()
            && raw.email.trim().is_empty()
        {
            warn!("skipping roster row for team '{}': no name or email", team_id);
            continue;
        }

        let player = PlayerDocument {
            first_name: Some(raw.first_name),
            last_name: Some(raw.last_name),
            email: Some(raw.email),
            nickname: raw.nickname,
            jersey_number: raw.jersey_number.as_deref().and_then(jersey_value),
            position: raw.position,
        };

        match docs
            .iter_mut()
            .find(|d| d.team_id.as_deref() == Some(team_id))
        {
            Some(doc) => doc.players.push(player),
            None => docs.push(RosterDocument {
                team_id: Some(team_id.to_string()),
                team_name: Some(raw.team_name),
                players: vec![player],
            }),
        }
    }

    let mut rosters = Vec::with_capacity(docs.len());
    for doc in docs {
        match Roster::from_document(doc) {
            Ok(roster) => {
                for violation in roster.invariant_violations() {
                    warn!("roster '{}': {}", roster.team_name, violation);
                }
                rosters.push(roster);
            }
            Err(e) => warn!("skipping roster: {}", e),
        }
    }
    Ok(rosters)
}

/// Jersey cells are free text; plain integers become numbers.
fn jersey_value(cell: &str) -> Option<serde_json::Value> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    match cell.parse::<u32>() {
        Ok(n) => Some(serde_json::Value::from(n)),
        Err(_) => Some(serde_json::Value::from(cell)),
    }
}

fn load_history_from_reader<R: Read>(rdr: R) -> Result<Vec<HistoryRecord>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut records = Vec::new();

    for result in reader.deserialize::<RawHistoryRow>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed history row: {}", e);
                continue;
            }
        };

        let user_id = raw.user_id.trim();
        let team_id = raw.team_id.trim();
        if user_id.is_empty() || team_id.is_empty() {
            warn!("skipping history row without user or team id");
            continue;
        }

        let recorded_at = match DateTime::parse_from_rfc3339(raw.recorded_at.trim()) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                warn!(
                    "skipping history row for team '{}' gameweek {}: bad recorded_at: {}",
                    team_id, raw.gameweek, e
                );
                continue;
            }
        };

        let snapshot = PerformanceSnapshot {
            team_id: team_id.to_string(),
            gameweek: raw.gameweek,
            points: raw.points,
            rank: raw.rank,
            recorded_at,
        };
        if let Err(e) = snapshot.validate() {
            warn!("skipping history row for team '{}': {}", team_id, e);
            continue;
        }

        records.push(HistoryRecord {
            team: FantasyTeam {
                user_id: user_id.to_string(),
                team_id: team_id.to_string(),
                team_name: raw.team_name.trim().to_string(),
            },
            snapshot,
        });
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, ImportError> {
    std::fs::File::open(path).map_err(|e| ImportError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load rosters from a CSV file, one player per row.
pub fn load_rosters(path: &Path) -> Result<Vec<Roster>, ImportError> {
    let rosters = load_rosters_from_reader(open(path)?).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    if rosters.is_empty() {
        return Err(ImportError::Validation(format!(
            "{} produced zero valid rosters",
            path.display()
        )));
    }
    Ok(rosters)
}

/// Load performance history from a CSV file, one gameweek per row.
pub fn load_history(path: &Path) -> Result<Vec<HistoryRecord>, ImportError> {
    let records = load_history_from_reader(open(path)?).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    if records.is_empty() {
        return Err(ImportError::Validation(format!(
            "{} produced zero valid history rows",
            path.display()
        )));
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Storing
// ---------------------------------------------------------------------------

/// Replace the stored roster of every imported team. Returns the number of
/// rosters written.
pub fn store_rosters(db: &Database, rosters: &[Roster]) -> anyhow::Result<usize> {
    for roster in rosters {
        db.save_roster(roster)
            .with_context(|| format!("failed to import roster {}", roster.team_name))?;
    }
    info!("Imported {} rosters", rosters.len());
    Ok(rosters.len())
}

/// Link users to their fantasy teams and record every gameweek. Returns the
/// number of snapshots written.
pub fn store_history(db: &Database, records: &[HistoryRecord]) -> anyhow::Result<usize> {
    for record in records {
        db.register_fantasy_team(&record.team)?;
        db.record_snapshot(&record.snapshot).with_context(|| {
            format!(
                "failed to import gameweek {} for {}",
                record.snapshot.gameweek, record.team.team_id
            )
        })?;
    }
    info!("Imported {} performance snapshots", records.len());
    Ok(records.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
