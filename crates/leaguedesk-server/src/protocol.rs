// Wire types for the WebSocket JSON protocol.
//
// Every client message is a JSON object tagged by "type", optionally wrapped
// with an `id` that is echoed back on the reply, plus the caller identity.

use std::collections::BTreeMap;
use std::fmt;

use leaguedesk_core::fantasy::{BadgeType, EarnedBadge};
use leaguedesk_core::{ComparisonResult, PairFailure, PlayerRecord, Roster};
use serde::{Deserialize, Serialize};

use crate::db::RejectedRoster;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Client-chosen correlation id, echoed verbatim on the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Text(String),
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Text(s) => f.write_str(s),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::Text(s.to_string())
    }
}

/// A request plus its envelope fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub acting_user: Option<String>,
    #[serde(default)]
    pub impersonate: Option<String>,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Compare(CompareQuery),
    Badges(BadgesQuery),
    RegisterPlayer(RegisterPlayer),
    RemovePlayer(RemovePlayer),
    UpdatePlayer(UpdatePlayer),
    Ping,
}

/// Comparison parameters. Omitting both search flags selects the configured
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareQuery {
    #[serde(default)]
    pub team1: Option<String>,
    #[serde(default)]
    pub team2: Option<String>,
    #[serde(default)]
    pub compare_all: bool,
    #[serde(default)]
    pub search_by_email: Option<bool>,
    #[serde(default)]
    pub search_by_name: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgesQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPlayer {
    pub team_name: String,
    pub player: PlayerRecord,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovePlayer {
    pub team_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayer {
    pub team_name: String,
    /// Email of the registration being replaced.
    pub email: String,
    pub player: PlayerRecord,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub response: Response,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    Comparison(ComparisonResult),
    Scan(ScanSummary),
    Badges(BadgeSummary),
    Roster(Roster),
    Pong,
    Error(ErrorBody),
}

/// Result of a whole-league scan. Only pairs sharing a player are listed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub total_pairs: usize,
    pub interesting_pairs: usize,
    pub results: Vec<ComparisonResult>,
    /// True when a pair could not be diffed or a stored roster was unusable.
    pub partial_failure: bool,
    pub failed_pairs: Vec<PairFailure>,
    pub rejected_rosters: Vec<RejectedRoster>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeSummary {
    pub user_id: String,
    pub team_id: String,
    /// Every badge the user holds, including ones from earlier evaluations.
    pub earned: Vec<EarnedBadge>,
    /// Badge types awarded by this evaluation.
    pub newly_earned: Vec<BadgeType>,
    pub progress: BTreeMap<BadgeType, Option<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub code: String,
    pub message: String,
}
