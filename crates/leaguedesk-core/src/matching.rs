// Identity matching: decides whether two player records are the same person.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::player::PlayerRecord;

/// Which identity signals count as a match. Enabled signals are OR-ed: a
/// match on email or on first+last name is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCriteria {
    #[serde(default)]
    pub by_email: bool,
    #[serde(default)]
    pub by_name: bool,
}

impl MatchCriteria {
    /// Build criteria, rejecting the all-disabled combination.
    pub fn new(by_email: bool, by_name: bool) -> Result<Self> {
        let criteria = MatchCriteria { by_email, by_name };
        criteria.validate()?;
        Ok(criteria)
    }

    pub fn email_only() -> Self {
        MatchCriteria {
            by_email: true,
            by_name: false,
        }
    }

    pub fn name_only() -> Self {
        MatchCriteria {
            by_email: false,
            by_name: true,
        }
    }

    pub fn email_or_name() -> Self {
        MatchCriteria {
            by_email: true,
            by_name: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.by_email && !self.by_name {
            return Err(CoreError::InvalidCriteria);
        }
        Ok(())
    }
}

/// Whether `a` and `b` represent the same person under `criteria`.
///
/// Emails are compared trimmed and case-insensitively, and only when both
/// sides have one. Names require both first and last name to match, trimmed
/// and case-insensitively; two records with blank names never match by name.
pub fn matches(a: &PlayerRecord, b: &PlayerRecord, criteria: &MatchCriteria) -> Result<bool> {
    criteria.validate()?;
    Ok(matches_unchecked(a, b, criteria))
}

/// Matching without re-validating criteria, for loops that validated once.
pub(crate) fn matches_unchecked(a: &PlayerRecord, b: &PlayerRecord, criteria: &MatchCriteria) -> bool {
    if criteria.by_email && a.has_email() && b.has_email() && a.normalized_email() == b.normalized_email() {
        return true;
    }

    criteria.by_name && same_name(a, b)
}

fn same_name(a: &PlayerRecord, b: &PlayerRecord) -> bool {
    let (a_first, a_last) = normalized_name(a);
    let (b_first, b_last) = normalized_name(b);

    if a_first.is_empty() && a_last.is_empty() {
        return false;
    }

    a_first == b_first && a_last == b_last
}

fn normalized_name(p: &PlayerRecord) -> (String, String) {
    (
        p.first_name.trim().to_lowercase(),
        p.last_name.trim().to_lowercase(),
    )
}
