use std::time::Duration;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use runboard_engine::{MachineSettings, TransportSettings};

use crate::logging::LogDestination;

/// Command-line client for the experiment backend.
#[derive(Debug, Parser)]
#[command(name = "runboard", version, about)]
pub struct Cli {
    /// Root of the backend API.
    #[arg(long, env = "RUNBOARD_API_URL", default_value = "http://localhost:8000/api")]
    pub api_url: String,

    /// Delay between job status polls, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Consecutive failed polls tolerated before giving up.
    #[arg(long, default_value_t = 5)]
    pub max_retries: u32,

    /// Where log output goes.
    #[arg(long, value_enum, default_value_t = LogDestination::Terminal)]
    pub log: LogDestination,

    /// Log debug detail (every transition and request).
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List projects known to the backend.
    Projects,
    /// Show a project's recent runs.
    Runs {
        project: String,
        #[arg(long, default_value_t = 5)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show every task of one run.
    Details { run: String },
    /// Start a job for a project and follow it until it finishes. Ctrl-C cancels.
    Start { project: String },
    /// Open a shareable link and show what it selects.
    Open {
        /// Page address, e.g. http://localhost:5173/#proj-42/r:run-7
        link: String,
        /// Navigate to this project before showing.
        #[arg(long)]
        project: Option<String>,
        /// Navigate to this run (of the selected project) before showing.
        #[arg(long)]
        run: Option<String>,
    },
}

impl Cli {
    pub fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        }
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings::with_base_url(self.api_url.clone())
    }

    pub fn machine_settings(&self) -> MachineSettings {
        MachineSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_retries: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_overrides() {
        let cli = Cli::try_parse_from([
            "runboard",
            "--api-url",
            "http://backend:9000/api",
            "--poll-interval-ms",
            "250",
            "start",
            "proj-1",
        ])
        .unwrap();

        assert_eq!(cli.transport_settings().base_url, "http://backend:9000/api");
        assert_eq!(cli.machine_settings().poll_interval, Duration::from_millis(250));
        assert_eq!(cli.machine_settings().max_retries, 5);
        assert!(matches!(cli.command, Command::Start { ref project } if project == "proj-1"));
    }

    #[test]
    fn open_accepts_navigation_flags() {
        let cli = Cli::try_parse_from([
            "runboard",
            "open",
            "http://localhost/#a",
            "--project",
            "b",
            "--run",
            "r1",
        ])
        .unwrap();

        match cli.command {
            Command::Open { link, project, run } => {
                assert_eq!(link, "http://localhost/#a");
                assert_eq!(project.as_deref(), Some("b"));
                assert_eq!(run.as_deref(), Some("r1"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
