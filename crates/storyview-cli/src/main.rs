//! 🚀 storyview-cli -- the front door. Loads config, lights the log, runs the report.
//!
//! 🎬 *[narrator voice]* "It was the first of the month. The cron job stirred."
//! 📦 Everything interesting happens in the `storyview` library. This binary
//! decides where the config comes from, where the logs go, and what the exit
//! code says about the night it had. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use storyview::common::ReportMonth;
use tracing::{error, info};

/// 🗺️ Count last month's story map views and mail the report.
#[derive(Debug, Parser)]
#[command(name = "storyview", version, about)]
struct Cli {
    /// 🔧 TOML config. Used only if it exists; otherwise STORYVIEW_* env vars carry it all.
    #[arg(default_value = "storyview.toml")]
    config: PathBuf,

    /// 🗓️ Report on this month (YYYY-MM) instead of the one before today.
    #[arg(long, value_parser = parse_month)]
    month: Option<ReportMonth>,
}

fn parse_month(raw: &str) -> Result<ReportMonth> {
    ReportMonth::parse(raw)
}

/// 🚀 main() -- where it all begins. The "cron pressed F5 and held its breath" moment.
///
/// 🔧 Steps:
/// 1. Parse args (config path, maybe a month)
/// 2. Load config (the moment of truth)
/// 3. Open the log (so we can see what goes wrong, and when)
/// 4. Run the report (send it and pray 🙏)
/// 5. Close the log on every way out, then pick an exit code
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 🔒 Check the config file exists before we get too emotionally attached
    let config_file = match cli.config.try_exists().with_context(|| {
        format!(
            "💀 Couldn't tell whether the config file exists. Permissions, maybe. Was checking here: '{}'",
            cli.config.display()
        )
    })? {
        true => Some(cli.config.as_path()), // ✅ Found it
        false => None,                      // 💤 Not there. Env vars it is.
    };

    let app_config = storyview::app_config::load_config(config_file)
        .context("💀 In storyview-cli, main, we couldn't load the configuration. Check the file and the STORYVIEW_* variables.")?;

    let log_guard = storyview::logging::init(&app_config.logging)
        .context("💀 Logging wouldn't start. Without a log, a monthly job is a rumor.")?;

    info!("🚀 storyview started at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    match config_file {
        Some(path) => info!("🔧 Config: {} (plus STORYVIEW_* env vars)", path.display()),
        None => info!("🔧 Config: STORYVIEW_* env vars only ('{}' not found)", cli.config.display()),
    }

    match storyview::run(app_config, cli.month).await {
        Ok(summary) => {
            info!(
                "✅ {} report sent to {} {} recipient(s) ({} rows, {} too young). Completed at {}",
                summary.month,
                summary.recipients,
                summary.audience,
                summary.rows,
                summary.too_young,
                summary.finished_at.format("%Y-%m-%d %H:%M:%S")
            );
            log_guard.close();
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                    || cause_str.contains("operation timed out")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }

            // -- 📡 if it smells like a connection problem, it's probably a connection problem
            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like the portal or the mail relay isn't reachable. \
                    Check the [portal] url and [notifier] url, and whether this machine \
                    can reach them at all (proxy, VPN, firewall). Even portals need a nudge sometimes. ☕"
                );
            }

            error!("🗑️ storyview gave up at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
            // -- 🗑️ process::exit skips destructors, so the guard closes by hand
            log_guard.close();
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_defaults_need_no_arguments() {
        let cli = Cli::try_parse_from(["storyview"]).expect("💀 bare invocation should parse");
        assert_eq!(cli.config, PathBuf::from("storyview.toml"));
    }

    #[test]
    fn the_one_where_the_month_can_be_overridden() {
        let cli = Cli::try_parse_from(["storyview", "prod.toml", "--month", "2025-12"])
            .expect("💀 explicit month should parse");
        assert_eq!(cli.config, PathBuf::from("prod.toml"));
        assert_eq!(cli.month, Some(ReportMonth::new(2025, 12).expect("💀 december")));
    }

    #[test]
    fn the_one_where_month_thirteen_is_turned_away() {
        assert!(Cli::try_parse_from(["storyview", "--month", "2026-13"]).is_err());
    }
}
