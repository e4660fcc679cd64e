// Player and roster record shapes, plus boundary parsing of stored documents.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// Jersey numbers
// ---------------------------------------------------------------------------

/// A jersey number as entered at registration. Some leagues use plain
/// integers, others allow strings like "00" or "7A".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JerseyNumber {
    Number(u32),
    Text(String),
}

impl JerseyNumber {
    /// Canonical text used for uniqueness checks: `7` and `"7"` collide.
    pub fn normalized(&self) -> String {
        match self {
            JerseyNumber::Number(n) => n.to_string(),
            JerseyNumber::Text(s) => s.trim().to_string(),
        }
    }
}

impl fmt::Display for JerseyNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}

// ---------------------------------------------------------------------------
// PlayerRecord
// ---------------------------------------------------------------------------

/// A person's registration entry within one team roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub first_name: String,
    pub last_name: String,
    /// Case-insensitive identity key. Empty when the player registered
    /// without one.
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<JerseyNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

impl PlayerRecord {
    pub fn new(first_name: &str, last_name: &str, email: &str) -> Self {
        PlayerRecord {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            nickname: None,
            jersey_number: None,
            position: None,
        }
    }

    pub fn with_jersey(mut self, jersey: JerseyNumber) -> Self {
        self.jersey_number = Some(jersey);
        self
    }

    pub fn with_position(mut self, position: &str) -> Self {
        self.position = Some(position.to_string());
        self
    }

    /// Trimmed, lowercased email. Empty if the player has none.
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }

    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }

    /// "First Last", falling back to the email when both names are blank.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.email.trim().to_string()
        } else {
            full.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// A rule broken inside a single roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    DuplicateEmail(String),
    DuplicateJersey(String),
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::DuplicateEmail(email) => {
                write!(f, "email {email} is registered more than once")
            }
            InvariantViolation::DuplicateJersey(number) => {
                write!(f, "jersey number {number} is worn by more than one player")
            }
        }
    }
}

/// The ordered list of players registered to one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub team_id: String,
    pub team_name: String,
    pub players: Vec<PlayerRecord>,
}

impl Roster {
    pub fn new(team_id: &str, team_name: &str, players: Vec<PlayerRecord>) -> Self {
        Roster {
            team_id: team_id.to_string(),
            team_name: team_name.to_string(),
            players,
        }
    }

    /// Every duplicate email and jersey number in the roster, in roster order.
    /// Players without an email or jersey number never collide.
    pub fn invariant_violations(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        let mut emails = HashSet::new();
        let mut jerseys = HashSet::new();

        for player in &self.players {
            if player.has_email() {
                let email = player.normalized_email();
                if !emails.insert(email.clone()) {
                    violations.push(InvariantViolation::DuplicateEmail(email));
                }
            }
            if let Some(jersey) = &player.jersey_number {
                let number = jersey.normalized();
                if !number.is_empty() && !jerseys.insert(number.clone()) {
                    violations.push(InvariantViolation::DuplicateJersey(number));
                }
            }
        }

        violations
    }

    /// Fail with `MalformedRoster` if the roster breaks a registration rule.
    pub fn validate(&self) -> Result<()> {
        let violations = self.invariant_violations();
        if violations.is_empty() {
            return Ok(());
        }
        let reason = violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(CoreError::MalformedRoster {
            team: self.team_name.clone(),
            reason,
        })
    }

    /// Index of the player registered with `email` (case-insensitive).
    pub fn position_of_email(&self, email: &str) -> Option<usize> {
        let needle = email.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.players
            .iter()
            .position(|p| p.normalized_email() == needle)
    }

    /// Parse a loosely-shaped stored document into a roster.
    ///
    /// Names and emails are trimmed, missing strings become empty. A document
    /// without a team id or name, a player with no identity at all, or a
    /// jersey number that is neither a non-negative integer nor a string is
    /// rejected.
    pub fn from_document(doc: RosterDocument) -> Result<Self> {
        let team_name = doc.team_name.unwrap_or_default().trim().to_string();
        let team_id = doc.team_id.unwrap_or_default().trim().to_string();

        let label = if team_name.is_empty() {
            team_id.clone()
        } else {
            team_name.clone()
        };
        let malformed = |reason: String| CoreError::MalformedRoster {
            team: label.clone(),
            reason,
        };

        if team_id.is_empty() {
            return Err(malformed("missing team id".into()));
        }
        if team_name.is_empty() {
            return Err(malformed("missing team name".into()));
        }

        let mut players = Vec::with_capacity(doc.players.len());
        for (idx, raw) in doc.players.into_iter().enumerate() {
            let first_name = raw.first_name.unwrap_or_default().trim().to_string();
            let last_name = raw.last_name.unwrap_or_default().trim().to_string();
            let email = raw.email.unwrap_or_default().trim().to_string();

            if first_name.is_empty() && last_name.is_empty() && email.is_empty() {
                return Err(malformed(format!("player #{} has no name or email", idx + 1)));
            }

            let jersey_number = match raw.jersey_number {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::Number(n)) => match n.as_u64() {
                    Some(v) if v <= u64::from(u32::MAX) => Some(JerseyNumber::Number(v as u32)),
                    _ => {
                        return Err(malformed(format!(
                            "player #{} has invalid jersey number {n}",
                            idx + 1
                        )))
                    }
                },
                Some(serde_json::Value::String(s)) => {
                    let s = s.trim();
                    if s.is_empty() {
                        None
                    } else {
                        Some(JerseyNumber::Text(s.to_string()))
                    }
                }
                Some(other) => {
                    return Err(malformed(format!(
                        "player #{} has invalid jersey number {other}",
                        idx + 1
                    )))
                }
            };

            players.push(PlayerRecord {
                first_name,
                last_name,
                email,
                nickname: non_blank(raw.nickname),
                jersey_number,
                position: non_blank(raw.position),
            });
        }

        Ok(Roster {
            team_id,
            team_name,
            players,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Raw documents
// ---------------------------------------------------------------------------

/// A roster as it sits in the document store: every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterDocument {
    #[serde(default, alias = "_id")]
    pub team_id: Option<String>,
    #[serde(default, alias = "name")]
    pub team_name: Option<String>,
    #[serde(default)]
    pub players: Vec<PlayerDocument>,
}

/// A player entry inside a [`RosterDocument`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDocument {
    #[serde(default, alias = "prenom")]
    pub first_name: Option<String>,
    #[serde(default, alias = "nom")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub jersey_number: Option<serde_json::Value>,
    #[serde(default)]
    pub position: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sam() -> PlayerRecord {
        PlayerRecord::new("Sam", "Lee", "a@x.com")
    }

    #[test]
    fn jersey_numbers_collide_across_representations() {
        assert_eq!(
            JerseyNumber::Number(7).normalized(),
            JerseyNumber::Text(" 7 ".into()).normalized()
        );
    }

    #[test]
    fn jersey_number_deserializes_untagged() {
        let n: JerseyNumber = serde_json::from_value(json!(12)).unwrap();
        let s: JerseyNumber = serde_json::from_value(json!("00")).unwrap();
        assert_eq!(n, JerseyNumber::Number(12));
        assert_eq!(s, JerseyNumber::Text("00".into()));
    }

    #[test]
    fn player_record_uses_camel_case_on_the_wire() {
        let p = sam().with_jersey(JerseyNumber::Number(9));
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["firstName"], "Sam");
        assert_eq!(v["lastName"], "Lee");
        assert_eq!(v["jerseyNumber"], 9);
        assert!(v.get("nickname").is_none());
    }

    #[test]
    fn display_name_falls_back_to_email() {
        assert_eq!(sam().display_name(), "Sam Lee");
        assert_eq!(PlayerRecord::new(" ", "", "x@y.z").display_name(), "x@y.z");
    }

    #[test]
    fn clean_roster_has_no_violations() {
        let roster = Roster::new(
            "t1",
            "Lions",
            vec![
                sam().with_jersey(JerseyNumber::Number(1)),
                PlayerRecord::new("Kim", "Park", "k@x.com").with_jersey(JerseyNumber::Number(2)),
                PlayerRecord::new("No", "Email", ""),
                PlayerRecord::new("Also", "None", ""),
            ],
        );
        assert!(roster.invariant_violations().is_empty());
        assert!(roster.validate().is_ok());
    }

    #[test]
    fn duplicate_email_and_jersey_are_reported() {
        let roster = Roster::new(
            "t1",
            "Lions",
            vec![
                sam().with_jersey(JerseyNumber::Number(4)),
                PlayerRecord::new("Sammy", "Lee", " A@X.com ")
                    .with_jersey(JerseyNumber::Text("4".into())),
            ],
        );
        let violations = roster.invariant_violations();
        assert_eq!(
            violations,
            vec![
                InvariantViolation::DuplicateEmail("a@x.com".into()),
                InvariantViolation::DuplicateJersey("4".into()),
            ]
        );
        match roster.validate().unwrap_err() {
            CoreError::MalformedRoster { team, reason } => {
                assert_eq!(team, "Lions");
                assert!(reason.contains("a@x.com"));
                assert!(reason.contains("jersey number 4"));
            }
            other => panic!("expected MalformedRoster, got: {other}"),
        }
    }

    #[test]
    fn position_of_email_ignores_case() {
        let roster = Roster::new("t1", "Lions", vec![sam()]);
        assert_eq!(roster.position_of_email("A@X.COM"), Some(0));
        assert_eq!(roster.position_of_email(""), None);
        assert_eq!(roster.position_of_email("b@x.com"), None);
    }

    #[test]
    fn from_document_trims_and_defaults() {
        let doc: RosterDocument = serde_json::from_value(json!({
            "_id": "t9",
            "teamName": "  Hawks ",
            "players": [
                {"firstName": " Ana ", "lastName": "Diaz", "email": " ana@x.com ", "jerseyNumber": 10},
                {"prenom": "Luc", "nom": "Martin", "jerseyNumber": " 7A ", "nickname": "  "}
            ]
        }))
        .unwrap();

        let roster = Roster::from_document(doc).unwrap();
        assert_eq!(roster.team_id, "t9");
        assert_eq!(roster.team_name, "Hawks");
        assert_eq!(roster.players.len(), 2);
        assert_eq!(roster.players[0].first_name, "Ana");
        assert_eq!(roster.players[0].email, "ana@x.com");
        assert_eq!(roster.players[0].jersey_number, Some(JerseyNumber::Number(10)));
        assert_eq!(roster.players[1].first_name, "Luc");
        assert_eq!(roster.players[1].email, "");
        assert_eq!(
            roster.players[1].jersey_number,
            Some(JerseyNumber::Text("7A".into()))
        );
        assert_eq!(roster.players[1].nickname, None);
    }

    #[test]
    fn from_document_rejects_missing_team_id() {
        let doc: RosterDocument =
            serde_json::from_value(json!({"teamName": "Hawks", "players": []})).unwrap();
        let err = Roster::from_document(doc).unwrap_err();
        assert!(matches!(err, CoreError::MalformedRoster { ref reason, .. } if reason.contains("team id")));
    }

    #[test]
    fn from_document_rejects_anonymous_player() {
        let doc: RosterDocument = serde_json::from_value(json!({
            "teamId": "t1", "teamName": "Hawks", "players": [{"position": "GK"}]
        }))
        .unwrap();
        let err = Roster::from_document(doc).unwrap_err();
        assert!(matches!(err, CoreError::MalformedRoster { ref reason, .. } if reason.contains("#1")));
    }

    #[test]
    fn from_document_rejects_negative_jersey() {
        let doc: RosterDocument = serde_json::from_value(json!({
            "teamId": "t1", "teamName": "Hawks",
            "players": [{"firstName": "A", "lastName": "B", "jerseyNumber": -3}]
        }))
        .unwrap();
        assert!(Roster::from_document(doc).is_err());
    }
}
