// SQLite persistence for team registrations, fantasy history and badges.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use leaguedesk_core::fantasy::{BadgeType, EarnedBadge, PerformanceSnapshot};
use leaguedesk_core::player::{PlayerDocument, RosterDocument};
use leaguedesk_core::Roster;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

/// A user's fantasy team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FantasyTeam {
    pub user_id: String,
    pub team_id: String,
    pub team_name: String,
}

/// A stored roster document that failed validation on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRoster {
    pub team_id: String,
    pub team_name: String,
    pub reason: String,
}

/// Every stored roster, split into the ones that parsed and the ones that
/// did not.
#[derive(Debug, Clone, Default)]
pub struct LoadedRosters {
    pub rosters: Vec<Roster>,
    pub rejected: Vec<RejectedRoster>,
}

/// SQLite-backed store standing in for the league's document collections.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS team_registrations (
                team_id    TEXT PRIMARY KEY,
                team_name  TEXT NOT NULL UNIQUE COLLATE NOCASE,
                players    TEXT NOT NULL DEFAULT '[]',
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS fantasy_teams (
                user_id   TEXT PRIMARY KEY,
                team_id   TEXT NOT NULL UNIQUE,
                team_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS performance_history (
                team_id     TEXT NOT NULL,
                gameweek    INTEGER NOT NULL,
                points      INTEGER NOT NULL,
                rank        INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (team_id, gameweek)
            );

            CREATE TABLE IF NOT EXISTS earned_badges (
                user_id    TEXT NOT NULL,
                badge_type TEXT NOT NULL,
                gameweek   INTEGER NOT NULL,
                earned_at  TEXT NOT NULL,
                metadata   TEXT NOT NULL,
                PRIMARY KEY (user_id, badge_type)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Team registrations
    // ------------------------------------------------------------------

    /// Insert a roster or replace the stored one with the same team id.
    pub fn save_roster(&self, roster: &Roster) -> Result<()> {
        write_roster(&self.conn(), roster)
    }

    /// Load a roster by team name (case-insensitive).
    pub fn load_roster_by_name(&self, team_name: &str) -> Result<Option<Roster>> {
        query_roster(&self.conn(), "team_name = ?1", team_name.trim())
    }

    pub fn load_roster_by_id(&self, team_id: &str) -> Result<Option<Roster>> {
        query_roster(&self.conn(), "team_id = ?1", team_id.trim())
    }

    /// Read-modify-write a roster in one immediate transaction.
    ///
    /// `key` is tried as a team name, then as a team id. `edit` runs with the
    /// connection held, so no other change to the roster can land between the
    /// read and the write. When `edit` fails nothing is saved. Returns `None`
    /// if no roster matches `key`.
    pub fn modify_roster<T, E>(
        &self,
        key: &str,
        edit: impl FnOnce(&mut Roster) -> std::result::Result<T, E>,
    ) -> std::result::Result<Option<(Roster, T)>, E>
    where
        E: From<anyhow::Error>,
    {
        let key = key.trim();
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin roster transaction")?;

        let found = match query_roster(&tx, "team_name = ?1", key)? {
            Some(roster) => Some(roster),
            None => query_roster(&tx, "team_id = ?1", key)?,
        };
        let Some(mut roster) = found else {
            return Ok(None);
        };

        let outcome = edit(&mut roster)?;
        write_roster(&tx, &roster)?;
        tx.commit().context("failed to commit roster change")?;
        Ok(Some((roster, outcome)))
    }

    /// Load every stored roster ordered by team name. Documents that fail
    /// validation are reported in `rejected` instead of aborting the load.
    pub fn load_all_rosters(&self) -> Result<LoadedRosters> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT team_id, team_name, players FROM team_registrations
                 ORDER BY team_name COLLATE NOCASE",
            )
            .context("failed to prepare load_all_rosters query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("failed to query team registrations")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map team registration rows")?;

        let mut loaded = LoadedRosters::default();
        for (team_id, team_name, players) in rows {
            match parse_roster(team_id.clone(), team_name.clone(), &players) {
                Ok(roster) => loaded.rosters.push(roster),
                Err(e) => loaded.rejected.push(RejectedRoster {
                    team_id,
                    team_name,
                    reason: format!("{e:#}"),
                }),
            }
        }
        Ok(loaded)
    }

    /// Store a players document verbatim, without validation. A document
    /// that does not parse shows up in `rejected` when rosters are loaded.
    /// Fails if another team already holds `team_name`.
    pub fn save_raw_roster(&self, team_id: &str, team_name: &str, players_json: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO team_registrations (team_id, team_name, players)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(team_id) DO UPDATE SET
                team_name  = excluded.team_name,
                players    = excluded.players,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![team_id, team_name, players_json],
        )
        .with_context(|| format!("failed to save raw roster {team_name}"))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fantasy teams and history
    // ------------------------------------------------------------------

    /// Link a user to their fantasy team, replacing any previous link.
    pub fn register_fantasy_team(&self, team: &FantasyTeam) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO fantasy_teams (user_id, team_id, team_name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                team_id   = excluded.team_id,
                team_name = excluded.team_name",
            params![team.user_id, team.team_id, team.team_name],
        )
        .context("failed to register fantasy team")?;
        Ok(())
    }

    pub fn fantasy_team_for_user(&self, user_id: &str) -> Result<Option<FantasyTeam>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, team_id, team_name FROM fantasy_teams WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(FantasyTeam {
                    user_id: row.get(0)?,
                    team_id: row.get(1)?,
                    team_name: row.get(2)?,
                })
            },
        )
        .optional()
        .context("failed to query fantasy team")
    }

    /// Record one gameweek for a team. Re-recording a gameweek replaces it.
    pub fn record_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO performance_history
                (team_id, gameweek, points, rank, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.team_id,
                snapshot.gameweek,
                snapshot.points,
                snapshot.rank,
                snapshot.recorded_at.to_rfc3339(),
            ],
        )
        .context("failed to record performance snapshot")?;
        Ok(())
    }

    /// A team's history ordered by gameweek.
    pub fn load_history(&self, team_id: &str) -> Result<Vec<PerformanceSnapshot>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT gameweek, points, rank, recorded_at FROM performance_history
                 WHERE team_id = ?1 ORDER BY gameweek",
            )
            .context("failed to prepare load_history query")?;

        let rows = stmt
            .query_map(params![team_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("failed to query performance history")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map performance history rows")?;

        rows.into_iter()
            .map(|(gameweek, points, rank, recorded_at)| {
                Ok(PerformanceSnapshot {
                    team_id: team_id.to_string(),
                    gameweek,
                    points,
                    rank,
                    recorded_at: parse_timestamp(&recorded_at)?,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Earned badges
    // ------------------------------------------------------------------

    /// Store an award. Returns `false` if the user already holds this badge
    /// type, in which case the stored award is left untouched.
    pub fn award_badge(&self, badge: &EarnedBadge) -> Result<bool> {
        let conn = self.conn();
        let metadata =
            serde_json::to_string(&badge.metadata).context("failed to serialize metadata")?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO earned_badges
                    (user_id, badge_type, gameweek, earned_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    badge.user_id,
                    badge.badge_type.as_str(),
                    badge.gameweek,
                    badge.earned_at.to_rfc3339(),
                    metadata,
                ],
            )
            .context("failed to award badge")?;
        Ok(inserted > 0)
    }

    /// A user's awards ordered by gameweek, then badge type.
    pub fn load_earned_badges(&self, user_id: &str) -> Result<Vec<EarnedBadge>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT badge_type, gameweek, earned_at, metadata FROM earned_badges
                 WHERE user_id = ?1 ORDER BY gameweek, badge_type",
            )
            .context("failed to prepare load_earned_badges query")?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("failed to query earned badges")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map earned badge rows")?;

        rows.into_iter()
            .map(|(badge_type, gameweek, earned_at, metadata)| {
                Ok(EarnedBadge {
                    user_id: user_id.to_string(),
                    badge_type: badge_type
                        .parse::<BadgeType>()
                        .map_err(anyhow::Error::msg)?,
                    earned_at: parse_timestamp(&earned_at)?,
                    gameweek,
                    metadata: serde_json::from_str(&metadata)
                        .context("failed to deserialize badge metadata")?,
                })
            })
            .collect()
    }

    pub fn earned_badge_types(&self, user_id: &str) -> Result<HashSet<BadgeType>> {
        Ok(self
            .load_earned_badges(user_id)?
            .into_iter()
            .map(|b| b.badge_type)
            .collect())
    }
}

fn write_roster(conn: &Connection, roster: &Roster) -> Result<()> {
    let players_json =
        serde_json::to_string(&roster.players).context("failed to serialize players")?;
    conn.execute(
        "INSERT INTO team_registrations (team_id, team_name, players)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(team_id) DO UPDATE SET
            team_name  = excluded.team_name,
            players    = excluded.players,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![roster.team_id, roster.team_name, players_json],
    )
    .with_context(|| format!("failed to save roster {}", roster.team_name))?;
    Ok(())
}

fn query_roster(conn: &Connection, clause: &str, key: &str) -> Result<Option<Roster>> {
    let row = conn
        .query_row(
            &format!("SELECT team_id, team_name, players FROM team_registrations WHERE {clause}"),
            params![key],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
        )
        .optional()
        .context("failed to query team registration")?;

    match row {
        Some((team_id, team_name, players)) => Ok(Some(parse_roster(team_id, team_name, &players)?)),
        None => Ok(None),
    }
}

/// Turn a stored players array into a validated roster.
fn parse_roster(team_id: String, team_name: String, players_json: &str) -> Result<Roster> {
    let players: Vec<PlayerDocument> = serde_json::from_str(players_json)
        .with_context(|| format!("players document for {team_name} is not a player array"))?;
    let doc = RosterDocument {
        team_id: Some(team_id),
        team_name: Some(team_name),
        players,
    };
    Ok(Roster::from_document(doc)?)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("invalid stored timestamp `{text}`"))?
        .with_timezone(&Utc))
}
