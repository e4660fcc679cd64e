// Fantasy performance history and achievement badges.

pub mod badge;
pub mod evaluator;
pub mod snapshot;

pub use badge::{default_definitions, BadgeDefinition, BadgeRule, BadgeType};
pub use evaluator::{evaluate_badges, BadgeEvaluation, EarnedBadge};
pub use snapshot::PerformanceSnapshot;
