//! Logging Infrastructure
//!
//! Structured logging setup for development and production:
//! - console layer, JSON in production
//! - optional daily rotating application logs (deleted after 14 days)

use std::fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Clean up application log files older than 14 days.
///
/// Call periodically (e.g. daily) to bound log size.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<()> {
    use chrono::{Local, TimeZone};

    let cutoff = Local::now() - chrono::Duration::days(14);

    let app_log_dir = log_dir.join("app");
    if app_log_dir.exists() {
        for entry in fs::read_dir(app_log_dir)? {
            let entry = entry?;
            let path = entry.path();

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Match app-YYYY-MM-DD.log pattern
            if let Some(date_part) = name
                .strip_prefix("app-")
                .and_then(|d| d.strip_suffix(".log"))
                && let Ok(naive_date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                && let Some(local_datetime) = Local
                    .from_local_datetime(&naive_date.and_hms_opt(0, 0, 0).unwrap())
                    .single()
                && local_datetime < cutoff
            {
                fs::remove_file(&path)?;
                tracing::info!(file = %name, "Deleted old log file");
            }
        }
    }

    Ok(())
}

/// Initialize the logging system.
///
/// # Arguments
/// * `level` - default log level when `RUST_LOG` is unset
/// * `json_format` - JSON output (production) vs pretty output (development)
/// * `log_dir` - optional directory for daily rotating file logs
pub fn init_logger(level: &str, json_format: bool, log_dir: Option<&str>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match log_dir {
        Some(dir) => {
            let app_log_dir = Path::new(dir).join("app");
            fs::create_dir_all(&app_log_dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, app_log_dir, "app");
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(appender)
                    .boxed(),
            )
        }
        None => None,
    };

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
