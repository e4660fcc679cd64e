// Library root: roster reconciliation and fantasy badge rules.
//
// Everything in this crate is pure and synchronous. Callers fetch records,
// hand them in, and decide what to do with the results.

pub mod compare;
pub mod error;
pub mod fantasy;
pub mod matching;
pub mod player;

pub use compare::{diff_rosters, scan_all_pairs, ComparisonResult, PairFailure, ScanReport};
pub use error::{CoreError, Result};
pub use matching::{matches, MatchCriteria};
pub use player::{JerseyNumber, PlayerRecord, Roster};
