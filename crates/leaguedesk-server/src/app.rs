// Request handling: turns protocol requests into core calls and database
// reads/writes, and every failure into a structured error response.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use leaguedesk_core::compare::pair_count;
use leaguedesk_core::fantasy::evaluate_badges;
use leaguedesk_core::{diff_rosters, scan_all_pairs, CoreError, MatchCriteria, PlayerRecord, Roster};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::RequestContext;
use crate::db::Database;
use crate::protocol::{
    BadgeSummary, BadgesQuery, CompareQuery, ErrorBody, RegisterPlayer, RemovePlayer, Request,
    RequestEnvelope, RequestId, Response, ResponseEnvelope, ScanSummary, UpdatePlayer,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced to clients. Each maps to an HTTP-style status and a
/// stable code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("select at least one search criterion")]
    InvalidCriteria,

    #[error("teams not found")]
    TeamNotFound { name: String },

    #[error("fantasy team not found")]
    UserNotFound { user_id: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    /// Stored data that cannot be used as-is.
    #[error("{0}")]
    Unprocessable(String),

    /// Detail is logged, never sent.
    #[error("internal error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::InvalidCriteria | ApiError::BadRequest(_) => 400,
            ApiError::TeamNotFound { .. } | ApiError::UserNotFound { .. } => 404,
            ApiError::Conflict(_) => 409,
            ApiError::Unprocessable(_) => 422,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidCriteria => "INVALID_CRITERIA",
            ApiError::TeamNotFound { .. } => "TEAM_NOT_FOUND",
            ApiError::UserNotFound { .. } => "USER_NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unprocessable(_) => "MALFORMED_DATA",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn to_response(&self) -> Response {
        Response::Error(ErrorBody {
            status: self.status(),
            code: self.code().to_string(),
            message: self.to_string(),
        })
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidCriteria => ApiError::InvalidCriteria,
            CoreError::TeamNotFound { name } => ApiError::TeamNotFound { name },
            CoreError::MalformedRoster { .. } | CoreError::InvalidSnapshot { .. } => {
                ApiError::Unprocessable(e.to_string())
            }
            CoreError::InvalidBadgeRule { .. } => ApiError::Internal(e.into()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    /// Core failures wrapped by the persistence layer keep their own mapping.
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<CoreError>() {
            Ok(core) => core.into(),
            Err(other) => ApiError::Internal(other),
        }
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Shared handler state. Holds no per-request data; everything a handler
/// needs about the caller arrives in its [`RequestContext`].
pub struct App {
    config: Config,
    db: Database,
    next_request: AtomicU64,
}

impl App {
    pub fn new(config: Config, db: Database) -> Self {
        App {
            config,
            db,
            next_request: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Handle one raw JSON message and produce the JSON reply.
    ///
    /// Never fails: unparseable input becomes a 400 error response.
    pub fn handle_text(&self, text: &str) -> String {
        let envelope: RequestEnvelope = match serde_json::from_str(text) {
            Ok(env) => env,
            Err(e) => {
                warn!("Failed to parse request: {e}");
                let reply = ResponseEnvelope {
                    id: request_id_of(text),
                    response: ApiError::BadRequest(format!("malformed request: {e}"))
                        .to_response(),
                };
                return encode(&reply);
            }
        };

        let request_id = match &envelope.id {
            Some(id) => id.to_string(),
            None => format!("req-{}", self.next_request.fetch_add(1, Ordering::Relaxed)),
        };
        let ctx = RequestContext::new(request_id)
            .with_acting_user(envelope.acting_user)
            .with_impersonation(envelope.impersonate);

        let response = self.dispatch(&ctx, envelope.request);
        encode(&ResponseEnvelope {
            id: envelope.id,
            response,
        })
    }

    /// Run one request, converting any error into an error response.
    pub fn dispatch(&self, ctx: &RequestContext, request: Request) -> Response {
        match self.handle(ctx, request) {
            Ok(response) => response,
            Err(ApiError::Internal(e)) => {
                error!("[{}] Internal error: {e:#}", ctx.request_id);
                ApiError::Internal(e).to_response()
            }
            Err(e) => {
                info!("[{}] Request rejected ({}): {e}", ctx.request_id, e.code());
                e.to_response()
            }
        }
    }

    pub fn handle(&self, ctx: &RequestContext, request: Request) -> Result<Response, ApiError> {
        match request {
            Request::Compare(query) => self.compare(ctx, query),
            Request::Badges(query) => self.badges(ctx, query),
            Request::RegisterPlayer(req) => self.register_player(ctx, req),
            Request::RemovePlayer(req) => self.remove_player(ctx, req),
            Request::UpdatePlayer(req) => self.update_player(ctx, req),
            Request::Ping => Ok(Response::Pong),
        }
    }

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------

    /// Either search flag given means the caller chose; absent flags count as
    /// disabled. Neither given falls back to the configured criteria.
    fn resolve_criteria(&self, query: &CompareQuery) -> Result<MatchCriteria, ApiError> {
        let criteria = match (query.search_by_email, query.search_by_name) {
            (None, None) => self.config.default_criteria,
            (by_email, by_name) => MatchCriteria {
                by_email: by_email.unwrap_or(false),
                by_name: by_name.unwrap_or(false),
            },
        };
        criteria.validate()?;
        Ok(criteria)
    }

    fn compare(&self, ctx: &RequestContext, query: CompareQuery) -> Result<Response, ApiError> {
        let criteria = self.resolve_criteria(&query)?;
        if query.compare_all {
            return self.scan(ctx, &criteria);
        }

        let team1 = required(query.team1.as_deref(), "team1")?;
        let team2 = required(query.team2.as_deref(), "team2")?;
        let roster1 = self.fetch_roster(team1)?;
        let roster2 = self.fetch_roster(team2)?;
        // Names and ids both resolve, so compare what they resolved to.
        if roster1.team_id == roster2.team_id {
            return Err(ApiError::BadRequest(
                "cannot compare a team with itself".into(),
            ));
        }
        let result = diff_rosters(&roster1, &roster2, &criteria)?;
        debug!(
            "[{}] Compared {} and {}: {} common",
            ctx.request_id,
            roster1.team_name,
            roster2.team_name,
            result.common_count()
        );
        Ok(Response::Comparison(result))
    }

    fn scan(&self, ctx: &RequestContext, criteria: &MatchCriteria) -> Result<Response, ApiError> {
        let loaded = self.db.load_all_rosters()?;
        for rejected in &loaded.rejected {
            warn!(
                "[{}] Skipping stored roster {} ({}): {}",
                ctx.request_id, rejected.team_name, rejected.team_id, rejected.reason
            );
        }

        let report = scan_all_pairs(&loaded.rosters, criteria)?;
        for failure in &report.failures {
            warn!(
                "[{}] Could not compare {} and {}: {}",
                ctx.request_id, failure.team1_name, failure.team2_name, failure.reason
            );
        }

        let total_pairs = pair_count(loaded.rosters.len());
        let results: Vec<_> = report.interesting().cloned().collect();
        info!(
            "[{}] Scanned {} rosters: {} pairs, {} sharing players, {} failed",
            ctx.request_id,
            loaded.rosters.len(),
            total_pairs,
            results.len(),
            report.failures.len()
        );

        Ok(Response::Scan(ScanSummary {
            total_pairs,
            interesting_pairs: results.len(),
            results,
            partial_failure: report.is_partial() || !loaded.rejected.is_empty(),
            failed_pairs: report.failures,
            rejected_rosters: loaded.rejected,
        }))
    }

    /// Look a roster up by name, then by id.
    fn fetch_roster(&self, key: &str) -> Result<Roster, ApiError> {
        if let Some(roster) = self.db.load_roster_by_name(key)? {
            return Ok(roster);
        }
        self.db
            .load_roster_by_id(key)?
            .ok_or_else(|| ApiError::TeamNotFound {
                name: key.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Badges
    // ------------------------------------------------------------------

    fn badges(&self, ctx: &RequestContext, query: BadgesQuery) -> Result<Response, ApiError> {
        let user_id = query
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .or_else(|| ctx.effective_user())
            .ok_or_else(|| ApiError::BadRequest("userId is required".into()))?
            .to_string();

        let team = self
            .db
            .fantasy_team_for_user(&user_id)?
            .ok_or_else(|| ApiError::UserNotFound {
                user_id: user_id.clone(),
            })?;
        let history = self.db.load_history(&team.team_id)?;
        let already = self.db.earned_badge_types(&user_id)?;

        let evaluation = evaluate_badges(&user_id, &history, &self.config.badges)?;

        let mut newly_earned = Vec::new();
        for badge in evaluation.newly_earned(&already) {
            if self.db.award_badge(badge)? {
                info!(
                    "[{}] Awarded {} to {} (gameweek {})",
                    ctx.request_id, badge.badge_type, user_id, badge.gameweek
                );
                newly_earned.push(badge.badge_type);
            }
        }

        let earned = self.db.load_earned_badges(&user_id)?;
        let held: HashSet<_> = earned.iter().map(|b| b.badge_type).collect();
        let progress = evaluation
            .progress
            .into_iter()
            .filter(|(badge_type, _)| !held.contains(badge_type))
            .collect();

        Ok(Response::Badges(BadgeSummary {
            user_id,
            team_id: team.team_id,
            earned,
            newly_earned,
            progress,
        }))
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    fn register_player(
        &self,
        ctx: &RequestContext,
        req: RegisterPlayer,
    ) -> Result<Response, ApiError> {
        let player = clean_player(req.player)?;
        let max = self.config.league.max_roster_size;

        let (roster, ()) = self.edit_roster(&req.team_name, |roster| {
            if roster.players.len() >= max {
                return Err(ApiError::Conflict(format!(
                    "{} already has the maximum of {max} players",
                    roster.team_name
                )));
            }
            roster.players.push(player);
            check_registration(ctx, roster)
        })?;
        info!(
            "[{}] Registered player on {} ({} players)",
            ctx.request_id,
            roster.team_name,
            roster.players.len()
        );
        Ok(Response::Roster(roster))
    }

    fn remove_player(&self, ctx: &RequestContext, req: RemovePlayer) -> Result<Response, ApiError> {
        let (roster, removed) = self.edit_roster(&req.team_name, |roster| {
            let index = player_index(roster, &req.email)?;
            Ok(roster.players.remove(index))
        })?;
        info!(
            "[{}] Removed {} from {}",
            ctx.request_id,
            removed.display_name(),
            roster.team_name
        );
        Ok(Response::Roster(roster))
    }

    fn update_player(&self, ctx: &RequestContext, req: UpdatePlayer) -> Result<Response, ApiError> {
        let player = clean_player(req.player)?;
        let (roster, ()) = self.edit_roster(&req.team_name, |roster| {
            let index = player_index(roster, &req.email)?;
            roster.players[index] = player;
            check_registration(ctx, roster)
        })?;
        info!("[{}] Updated player on {}", ctx.request_id, roster.team_name);
        Ok(Response::Roster(roster))
    }

    /// Apply `edit` to the named roster atomically; unknown teams are 404.
    fn edit_roster<T>(
        &self,
        team_name: &str,
        edit: impl FnOnce(&mut Roster) -> Result<T, ApiError>,
    ) -> Result<(Roster, T), ApiError> {
        let team = required(Some(team_name), "teamName")?;
        self.db
            .modify_roster(team, edit)?
            .ok_or_else(|| ApiError::TeamNotFound {
                name: team.to_string(),
            })
    }
}

/// Reject a modified roster that now breaks a registration rule.
fn check_registration(ctx: &RequestContext, roster: &Roster) -> Result<(), ApiError> {
    roster.validate().map_err(|e| {
        debug!("[{}] Rejected roster change: {e}", ctx.request_id);
        match e {
            CoreError::MalformedRoster { reason, .. } => ApiError::Conflict(reason),
            other => other.into(),
        }
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ApiError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("{field} is required"))),
    }
}

fn player_index(roster: &Roster, email: &str) -> Result<usize, ApiError> {
    roster.position_of_email(email).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "no player registered with email {} on {}",
            email.trim(),
            roster.team_name
        ))
    })
}

/// Trim a submitted player and reject one with no identity at all.
fn clean_player(player: PlayerRecord) -> Result<PlayerRecord, ApiError> {
    let trim_opt = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let cleaned = PlayerRecord {
        first_name: player.first_name.trim().to_string(),
        last_name: player.last_name.trim().to_string(),
        email: player.email.trim().to_string(),
        nickname: trim_opt(player.nickname),
        jersey_number: player.jersey_number,
        position: trim_opt(player.position),
    };
    if cleaned.first_name.is_empty() && cleaned.last_name.is_empty() && !cleaned.has_email() {
        return Err(ApiError::BadRequest(
            "a player needs a name or an email".into(),
        ));
    }
    Ok(cleaned)
}

/// Best-effort `id` extraction from a message that failed to parse as a
/// request.
fn request_id_of(text: &str) -> Option<RequestId> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

fn encode(envelope: &ResponseEnvelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|e| {
        error!("Failed to serialize response: {e}");
        r#"{"type":"error","status":500,"code":"INTERNAL","message":"internal error"}"#.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeagueConfig;
    use crate::db::FantasyTeam;
    use chrono::{TimeZone, Utc};
    use leaguedesk_core::fantasy::{default_definitions, BadgeType, PerformanceSnapshot};
    use leaguedesk_core::JerseyNumber;
    use serde_json::{json, Value};

    fn test_config() -> Config {
        Config {
            league: LeagueConfig {
                name: "Test League".into(),
                season: "2026-27".into(),
                max_roster_size: 3,
            },
            port: 9100,
            db_path: ":memory:".into(),
            default_criteria: MatchCriteria::email_only(),
            badges: default_definitions(),
        }
    }

    fn test_app() -> App {
        let db = Database::open(":memory:").unwrap();
        db.save_roster(&Roster::new(
            "t1",
            "Lions",
            vec![
                PlayerRecord::new("Sam", "Lee", "sam@x.com").with_jersey(JerseyNumber::Number(7)),
                PlayerRecord::new("Ana", "Diaz", "ana@x.com"),
            ],
        ))
        .unwrap();
        db.save_roster(&Roster::new(
            "t2",
            "Tigers",
            vec![
                PlayerRecord::new("Samuel", "Lee", "SAM@x.com"),
                PlayerRecord::new("Ana", "Diaz", "ana.diaz@y.org"),
            ],
        ))
        .unwrap();
        App::new(test_config(), db)
    }

    fn ctx() -> RequestContext {
        RequestContext::new("test")
    }

    fn call(app: &App, request: Value) -> Value {
        serde_json::from_str(&app.handle_text(&request.to_string())).unwrap()
    }

    // ------------------------------------------------------------------
    // Error mapping
    // ------------------------------------------------------------------

    #[test]
    fn api_errors_have_documented_statuses() {
        assert_eq!(ApiError::InvalidCriteria.status(), 400);
        assert_eq!(
            ApiError::InvalidCriteria.to_string(),
            "select at least one search criterion"
        );
        let missing = ApiError::TeamNotFound { name: "x".into() };
        assert_eq!((missing.status(), missing.to_string().as_str()), (404, "teams not found"));
        assert_eq!(ApiError::Conflict("dup".into()).status(), 409);
        assert_eq!(ApiError::Internal(anyhow::anyhow!("disk on fire")).status(), 500);
    }

    #[test]
    fn internal_detail_is_not_sent() {
        let response = ApiError::Internal(anyhow::anyhow!("disk on fire")).to_response();
        match response {
            Response::Error(body) => {
                assert_eq!(body.message, "internal error");
                assert_eq!(body.code, "INTERNAL");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn core_errors_survive_anyhow_wrapping() {
        let wrapped: anyhow::Error = CoreError::InvalidCriteria.into();
        assert!(matches!(ApiError::from(wrapped), ApiError::InvalidCriteria));
    }

    // ------------------------------------------------------------------
    // Criteria resolution
    // ------------------------------------------------------------------

    #[test]
    fn absent_flags_use_configured_defaults() {
        let app = test_app();
        let criteria = app.resolve_criteria(&CompareQuery::default()).unwrap();
        assert_eq!(criteria, MatchCriteria::email_only());
    }

    #[test]
    fn explicit_false_flags_are_invalid() {
        let app = test_app();
        let query = CompareQuery {
            search_by_email: Some(false),
            search_by_name: Some(false),
            ..CompareQuery::default()
        };
        assert!(matches!(
            app.resolve_criteria(&query),
            Err(ApiError::InvalidCriteria)
        ));
    }

    #[test]
    fn single_flag_disables_the_other() {
        let app = test_app();
        let query = CompareQuery {
            search_by_name: Some(true),
            ..CompareQuery::default()
        };
        assert_eq!(app.resolve_criteria(&query).unwrap(), MatchCriteria::name_only());
    }

    // ------------------------------------------------------------------
    // Compare
    // ------------------------------------------------------------------

    #[test]
    fn compare_two_teams_by_email() {
        let app = test_app();
        let v = call(&app, json!({"type": "compare", "id": "c1", "team1": "Lions", "team2": "tigers"}));
        assert_eq!(v["type"], "comparison");
        assert_eq!(v["id"], "c1");
        assert_eq!(v["commonPlayers"].as_array().unwrap().len(), 1);
        assert_eq!(v["commonPlayers"][0]["email"], "sam@x.com");
        assert_eq!(v["team1Only"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn compare_by_name_finds_both() {
        let app = test_app();
        let v = call(
            &app,
            json!({"type": "compare", "team1": "Lions", "team2": "Tigers", "searchByName": true}),
        );
        // Only names: "Sam Lee" vs "Samuel Lee" differ, "Ana Diaz" matches.
        assert_eq!(v["commonPlayers"].as_array().unwrap().len(), 1);
        assert_eq!(v["commonPlayers"][0]["firstName"], "Ana");
    }

    #[test]
    fn compare_requires_both_teams_and_rejects_self_comparison() {
        let app = test_app();
        let missing = call(&app, json!({"type": "compare", "team1": "Lions"}));
        assert_eq!(missing["status"], 400);

        let same = call(&app, json!({"type": "compare", "team1": "Lions", "team2": "LIONS"}));
        assert_eq!(same["status"], 400);
        assert_eq!(same["code"], "BAD_REQUEST");

        // A name and an id for the same team.
        let same = call(&app, json!({"type": "compare", "team1": "Lions", "team2": "t1"}));
        assert_eq!(same["status"], 400);
        assert_eq!(same["message"], "cannot compare a team with itself");
    }

    #[test]
    fn compare_unknown_team_is_404() {
        let app = test_app();
        let v = call(&app, json!({"type": "compare", "team1": "Lions", "team2": "Bears"}));
        assert_eq!(v["type"], "error");
        assert_eq!(v["status"], 404);
        assert_eq!(v["message"], "teams not found");
    }

    #[test]
    fn compare_with_no_criteria_is_400() {
        let app = test_app();
        let v = call(
            &app,
            json!({"type": "compare", "team1": "Lions", "team2": "Tigers",
                   "searchByEmail": false, "searchByName": false}),
        );
        assert_eq!(v["status"], 400);
        assert_eq!(v["code"], "INVALID_CRITERIA");
        assert_eq!(v["message"], "select at least one search criterion");
    }

    #[test]
    fn compare_all_lists_interesting_pairs() {
        let app = test_app();
        app.db()
            .save_roster(&Roster::new("t3", "Bears", vec![PlayerRecord::new("Lea", "Roux", "lea@x.com")]))
            .unwrap();

        let v = call(&app, json!({"type": "compareAll", "compareAll": true}));
        // Unknown type, not a scan.
        assert_eq!(v["status"], 400);

        let v = call(&app, json!({"type": "compare", "compareAll": true}));
        assert_eq!(v["type"], "scan");
        assert_eq!(v["totalPairs"], 3);
        assert_eq!(v["interestingPairs"], 1);
        assert_eq!(v["partialFailure"], false);
    }

    #[test]
    fn compare_all_reports_rejected_rosters() {
        let app = test_app();
        app.db().save_raw_roster("t9", "Ghosts", "[{}]").unwrap();

        let v = call(&app, json!({"type": "compare", "compareAll": true}));
        assert_eq!(v["totalPairs"], 1);
        assert_eq!(v["partialFailure"], true);
        assert_eq!(v["rejectedRosters"][0]["teamName"], "Ghosts");
    }

    #[test]
    fn compare_against_malformed_stored_roster_is_422() {
        let app = test_app();
        app.db().save_raw_roster("t9", "Ghosts", "[{}]").unwrap();
        let v = call(&app, json!({"type": "compare", "team1": "Lions", "team2": "Ghosts"}));
        assert_eq!(v["status"], 422);
    }

    // ------------------------------------------------------------------
    // Badges
    // ------------------------------------------------------------------

    fn seed_history(app: &App) {
        app.db()
            .register_fantasy_team(&FantasyTeam {
                user_id: "u1".into(),
                team_id: "ft-1".into(),
                team_name: "Galacticos".into(),
            })
            .unwrap();
        for (gw, points, rank) in [(1, 60, 40), (2, 105, 30)] {
            app.db()
                .record_snapshot(&PerformanceSnapshot {
                    team_id: "ft-1".into(),
                    gameweek: gw,
                    points,
                    rank,
                    recorded_at: Utc.with_ymd_and_hms(2026, 8, gw, 21, 0, 0).unwrap(),
                })
                .unwrap();
        }
    }

    #[test]
    fn badges_award_once_and_report_progress() {
        let app = test_app();
        seed_history(&app);

        let first = call(&app, json!({"type": "badges", "userId": "u1"}));
        assert_eq!(first["type"], "badges");
        assert_eq!(first["newlyEarned"], json!(["century"]));
        assert_eq!(first["earned"][0]["badgeType"], "century");
        assert_eq!(first["earned"][0]["gameweek"], 2);
        assert_eq!(first["progress"]["double_century"], 52);
        assert!(first["progress"].get("century").is_none());

        let second = call(&app, json!({"type": "badges", "userId": "u1"}));
        assert_eq!(second["newlyEarned"], json!([]));
        assert_eq!(second["earned"], first["earned"]);
    }

    #[test]
    fn badges_default_to_the_effective_user() {
        let app = test_app();
        seed_history(&app);

        let v = call(&app, json!({"type": "badges", "actingUser": "admin", "impersonate": "u1"}));
        assert_eq!(v["userId"], "u1");

        let v = call(&app, json!({"type": "badges"}));
        assert_eq!(v["status"], 400);
    }

    #[test]
    fn badges_for_unknown_user_is_404() {
        let app = test_app();
        let v = call(&app, json!({"type": "badges", "userId": "nobody"}));
        assert_eq!(v["status"], 404);
        assert_eq!(v["message"], "fantasy team not found");
    }

    #[test]
    fn previously_held_badges_drop_out_of_progress() {
        let app = test_app();
        seed_history(&app);
        app.db()
            .award_badge(&leaguedesk_core::fantasy::EarnedBadge {
                user_id: "u1".into(),
                badge_type: BadgeType::Podium,
                earned_at: Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap(),
                gameweek: 14,
                metadata: json!({"rank": 2}),
            })
            .unwrap();

        let v = call(&app, json!({"type": "badges", "userId": "u1"}));
        assert!(v["progress"].get("podium").is_none());
        assert_eq!(v["earned"].as_array().unwrap().len(), 2);
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    fn register(app: &App, first: &str, email: &str, jersey: u32) -> Result<Response, ApiError> {
        app.handle(
            &ctx(),
            Request::RegisterPlayer(RegisterPlayer {
                team_name: "Lions".into(),
                player: PlayerRecord::new(first, "New", email).with_jersey(JerseyNumber::Number(jersey)),
            }),
        )
    }

    #[test]
    fn register_player_appends_and_persists() {
        let app = test_app();
        let response = register(&app, " Kim ", "kim@x.com", 11).unwrap();
        match response {
            Response::Roster(roster) => {
                assert_eq!(roster.players.len(), 3);
                assert_eq!(roster.players[2].first_name, "Kim");
            }
            other => panic!("expected roster, got {other:?}"),
        }
        let stored = app.db().load_roster_by_name("Lions").unwrap().unwrap();
        assert_eq!(stored.players.len(), 3);
    }

    #[test]
    fn register_player_rejects_duplicates_and_full_rosters() {
        let app = test_app();
        let dup_email = register(&app, "Other", "SAM@x.com", 12).unwrap_err();
        assert!(matches!(dup_email, ApiError::Conflict(_)));
        let dup_jersey = register(&app, "Other", "o@x.com", 7).unwrap_err();
        assert!(matches!(dup_jersey, ApiError::Conflict(ref m) if m.contains("jersey number 7")));

        register(&app, "Kim", "kim@x.com", 11).unwrap();
        let full = register(&app, "Lou", "lou@x.com", 12).unwrap_err();
        assert_eq!(full.status(), 409);

        let stored = app.db().load_roster_by_name("Lions").unwrap().unwrap();
        assert_eq!(stored.players.len(), 3);
    }

    #[test]
    fn register_player_needs_an_identity() {
        let app = test_app();
        // Last name "New" is still an identity.
        assert!(register(&app, " ", "", 30).is_ok());

        let v = call(
            &app,
            json!({"type": "registerPlayer", "teamName": "Tigers", "player": {"firstName": "", "lastName": " "}}),
        );
        assert_eq!(v["status"], 400);
    }

    fn register_concurrently(app: &App, threads: usize, per_thread: usize) -> usize {
        let acked = AtomicU64::new(0);
        std::thread::scope(|s| {
            for t in 0..threads {
                let acked = &acked;
                s.spawn(move || {
                    for i in 0..per_thread {
                        let v = call(
                            app,
                            json!({"type": "registerPlayer", "teamName": "Bears",
                                   "player": {"firstName": "P", "lastName": format!("{t}-{i}"),
                                              "email": format!("p{t}-{i}@x.com")}}),
                        );
                        if v["type"] == "roster" {
                            acked.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });
        acked.load(Ordering::Relaxed) as usize
    }

    #[test]
    fn concurrent_registrations_are_all_stored() {
        let mut config = test_config();
        config.league.max_roster_size = 1_000;
        let app = App::new(config, Database::open(":memory:").unwrap());
        app.db().save_roster(&Roster::new("t3", "Bears", vec![])).unwrap();

        let acked = register_concurrently(&app, 8, 25);

        let stored = app.db().load_roster_by_name("Bears").unwrap().unwrap();
        assert_eq!(acked, 200);
        assert_eq!(stored.players.len(), acked);
    }

    #[test]
    fn concurrent_registrations_respect_the_roster_limit() {
        let mut config = test_config();
        config.league.max_roster_size = 10;
        let app = App::new(config, Database::open(":memory:").unwrap());
        app.db().save_roster(&Roster::new("t3", "Bears", vec![])).unwrap();

        let acked = register_concurrently(&app, 4, 10);

        let stored = app.db().load_roster_by_name("Bears").unwrap().unwrap();
        assert_eq!(acked, 10);
        assert_eq!(stored.players.len(), 10);
    }

    #[test]
    fn remove_and_update_player_by_email() {
        let app = test_app();
        let v = call(
            &app,
            json!({"type": "updatePlayer", "teamName": "Lions", "email": "ANA@x.com",
                   "player": {"firstName": "Ana", "lastName": "Diaz", "email": "ana@x.com", "position": "GK"}}),
        );
        assert_eq!(v["type"], "roster");
        assert_eq!(v["players"][1]["position"], "GK");

        let v = call(&app, json!({"type": "removePlayer", "teamName": "Lions", "email": "sam@x.com"}));
        assert_eq!(v["players"].as_array().unwrap().len(), 1);

        let v = call(&app, json!({"type": "removePlayer", "teamName": "Lions", "email": "sam@x.com"}));
        assert_eq!(v["status"], 400);
    }

    #[test]
    fn update_player_cannot_steal_an_email() {
        let app = test_app();
        let v = call(
            &app,
            json!({"type": "updatePlayer", "teamName": "Lions", "email": "ana@x.com",
                   "player": {"firstName": "Ana", "lastName": "Diaz", "email": "sam@x.com"}}),
        );
        assert_eq!(v["status"], 409);
    }

    // ------------------------------------------------------------------
    // Envelope handling
    // ------------------------------------------------------------------

    #[test]
    fn malformed_json_is_a_400_response() {
        let app = test_app();
        let v: Value = serde_json::from_str(&app.handle_text("{not json")).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["status"], 400);
    }

    #[test]
    fn unknown_type_echoes_id() {
        let app = test_app();
        let v = call(&app, json!({"type": "teleport", "id": "x9"}));
        assert_eq!(v["status"], 400);
        assert_eq!(v["id"], "x9");
    }

    #[test]
    fn numeric_id_is_echoed_as_a_number() {
        let app = test_app();
        assert_eq!(call(&app, json!({"type": "ping", "id": 7})), json!({"id": 7, "type": "pong"}));

        let v = call(&app, json!({"type": "teleport", "id": 8}));
        assert_eq!(v["status"], 400);
        assert_eq!(v["id"], 8);
    }

    #[test]
    fn ping_pongs() {
        let app = test_app();
        assert_eq!(call(&app, json!({"type": "ping", "id": "p"})), json!({"id": "p", "type": "pong"}));
    }
}
