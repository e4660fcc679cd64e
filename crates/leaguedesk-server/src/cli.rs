// Command-line interface for the league desk.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sports league roster reconciliation and fantasy badges
#[derive(Parser, Debug)]
#[command(name = "leaguedesk")]
#[command(about = "Sports league roster reconciliation and fantasy badges")]
#[command(version)]
pub struct Args {
    /// Override the WebSocket port from config (serve only)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the WebSocket server (default)
    Serve,

    /// Import team rosters from a CSV file, one player per row
    ImportRosters {
        #[arg(value_name = "CSV")]
        path: PathBuf,
    },

    /// Import fantasy performance history from a CSV file
    ImportHistory {
        #[arg(value_name = "CSV")]
        path: PathBuf,
    },

    /// Compare two teams' rosters
    Compare {
        team1: String,
        team2: String,
        /// Match players by email
        #[arg(long)]
        by_email: bool,
        /// Match players by first and last name
        #[arg(long)]
        by_name: bool,
    },

    /// Compare every pair of stored rosters
    Scan {
        #[arg(long)]
        by_email: bool,
        #[arg(long)]
        by_name: bool,
    },

    /// Evaluate and award badges for a user
    Badges { user: String },
}

impl Args {
    /// The subcommand to run, defaulting to `serve`.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

/// Flags left off on the command line mean "use the configured defaults",
/// the same as a request that omits both.
pub fn flag_pair(by_email: bool, by_name: bool) -> (Option<bool>, Option<bool>) {
    if by_email || by_name {
        (Some(by_email), Some(by_name))
    } else {
        (None, None)
    }
}
