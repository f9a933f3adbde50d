//! Stderr logging for the CLI.
//!
//! Events come from two targets:
//! - `netmsg_message::factory`: `debug` on every create and destroy, `warn`
//!   on allocation failure and rejected acquire/release, `error` per leaked
//!   message at teardown
//! - `netmsg`: command summaries at `info`
//!
//! `--log-level` sets the level for every target. `NETMSG_LOG` adds
//! `EnvFilter` directives on top, e.g. `NETMSG_LOG=netmsg_message=debug`
//! to follow message lifecycles while the rest stays at `info`.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Extra filter directives, applied after `--log-level`.
pub const LOG_DIRECTIVES_ENV: &str = "NETMSG_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Filter directives for `level` plus any from `extra`.
///
/// Unparseable extra directives are skipped rather than failing startup.
pub fn filter_directives(level: LogLevel, extra: Option<&str>) -> String {
    let mut directives = level.as_filter().to_string().to_lowercase();
    for directive in extra
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
    {
        if directive.parse::<tracing_subscriber::filter::Directive>().is_ok() {
            directives.push(',');
            directives.push_str(directive);
        }
    }
    directives
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let extra = std::env::var(LOG_DIRECTIVES_ENV).ok();
    let filter = EnvFilter::try_new(filter_directives(level, extra.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_alone_is_the_base_directive() {
        assert_eq!(filter_directives(LogLevel::Warn, None), "warn");
        assert_eq!(filter_directives(LogLevel::Trace, Some("")), "trace");
    }

    #[test]
    fn extra_directives_follow_the_level() {
        assert_eq!(
            filter_directives(LogLevel::Info, Some("netmsg_message=debug")),
            "info,netmsg_message=debug"
        );
        assert_eq!(
            filter_directives(
                LogLevel::Error,
                Some(" netmsg_message::factory=debug , netmsg=info ")
            ),
            "error,netmsg_message::factory=debug,netmsg=info"
        );
    }

    #[test]
    fn malformed_directives_are_skipped() {
        assert_eq!(
            filter_directives(LogLevel::Info, Some("netmsg_message=loud,netmsg=warn")),
            "info,netmsg=warn"
        );
        assert!(EnvFilter::try_new(filter_directives(LogLevel::Debug, Some("netmsg=loud"))).is_ok());
    }
}
