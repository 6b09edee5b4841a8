//! Updates editor info and Bundle eligibility for stale editor records.
//!
//! Usage:
//!   editorsync [--datetime <ISO 8601>] [--global-userinfo <JSON>]
//!              [--timedelta-days <N>] [--wp-username <NAME>]
//!
//! `--datetime` backdates the run: the value is used both to decide
//! staleness-window expiry and as the new update stamp. `--global-userinfo`
//! replaces the live fetch with a fixed payload. Both exist for deterministic
//! test runs; malformed values fail fast before any record is touched.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};

use editorsync_lib::db::EditorDb;
use editorsync_lib::error::UpdateError;
use editorsync_lib::snapshot::{FixedSnapshotProvider, LiveSnapshotProvider, SnapshotProvider};
use editorsync_lib::types::{load_config, Config};
use editorsync_lib::updater::{run_update, UpdateOptions};

const USAGE: &str = "Usage: editorsync [--datetime <ISO 8601>] [--global-userinfo <JSON>] \
                     [--timedelta-days <N>] [--wp-username <NAME>]";

/// Parsed command-line options.
#[derive(Debug, Default)]
struct CliOptions {
    datetime: Option<DateTime<Utc>>,
    global_userinfo: Option<String>,
    timedelta_days: Option<i64>,
    wp_username: Option<String>,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<CliOptions, UpdateError> {
    let mut opts = CliOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        // Accept both `--flag value` and `--flag=value`.
        let (flag, mut value) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (arg.as_str(), None),
        };

        if matches!(flag, "-h" | "--help") {
            opts.help = true;
            continue;
        }

        if value.is_none() {
            value = iter.next().cloned();
        }
        let value = value.ok_or_else(|| UpdateError::MissingValue(flag.to_string()))?;

        match flag {
            "--datetime" => {
                let parsed = DateTime::parse_from_rfc3339(&value).map_err(|source| {
                    UpdateError::InvalidTimestamp {
                        value: value.clone(),
                        source,
                    }
                })?;
                opts.datetime = Some(parsed.with_timezone(&Utc));
            }
            "--global-userinfo" => opts.global_userinfo = Some(value),
            "--timedelta-days" => {
                let days: i64 = value
                    .parse()
                    .map_err(|_| UpdateError::InvalidDays(value.clone()))?;
                if days < 0 {
                    return Err(UpdateError::InvalidDays(value));
                }
                opts.timedelta_days = Some(days);
            }
            "--wp-username" => opts.wp_username = Some(value),
            other => return Err(UpdateError::UnknownArgument(other.to_string())),
        }
    }

    Ok(opts)
}

fn run(cli: CliOptions) -> Result<(), UpdateError> {
    let config: Config = load_config().map_err(UpdateError::Configuration)?;

    // The fixed-snapshot override is validated up front, before any record
    // is touched.
    let provider: Box<dyn SnapshotProvider> = match &cli.global_userinfo {
        Some(raw) => Box::new(FixedSnapshotProvider::from_json(raw)?),
        None => Box::new(LiveSnapshotProvider::new(&config.api_url)?),
    };

    let db = match &config.db_path {
        Some(path) => EditorDb::open_at(PathBuf::from(path))?,
        None => EditorDb::open()?,
    };

    let reference_time = cli.datetime.unwrap_or_else(Utc::now);
    let opts = UpdateOptions {
        reference_time,
        staleness_days: cli.timedelta_days.unwrap_or(config.staleness_days),
        wp_username: cli.wp_username,
    };

    log::info!(
        "Starting eligibility pass: reference {}, staleness {}d{}",
        reference_time.to_rfc3339(),
        opts.staleness_days,
        opts.wp_username
            .as_deref()
            .map(|u| format!(", editor '{}'", u))
            .unwrap_or_default()
    );

    let report = run_update(&db, provider.as_ref(), &opts)?;

    log::info!(
        "Updated {} of {} stale editors ({} skipped)",
        report.updated,
        report.selected,
        report.skipped
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    if cli.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            if e.is_invalid_input() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
