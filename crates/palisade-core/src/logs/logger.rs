//! Logging setup shared by every Palisade binary.
//!
//! Leans on `env_logger`'s own `Builder::from_env` rather than a hand-rolled
//! filter, so a host can scope verbosity per module — e.g.
//! `RUST_LOG=palisade_core::resilience=debug,warn` to watch circuit-breaker
//! transitions without the rest of the gateway's chatter. `NO_COLOR` disables
//! ANSI coloring.

use chrono::Local;
use env_logger::{Builder, Env};
use std::io::Write;

const DEFAULT_FILTER: &str = "info";

fn level_color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[34m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// Initializes the global logger. Call once at process startup. Honors
/// `RUST_LOG` (falling back to [`DEFAULT_FILTER`]) for level filtering per
/// module/target, and `NO_COLOR` to disable ANSI coloring.
pub fn configure_logger() {
    let no_color = std::env::var("NO_COLOR").is_ok();

    Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER))
        .format(move |buf, record| {
            let timestamp = Local::now().format("%b %d %y %I:%M:%S%.3f %p");
            let level = record.level();
            let target = record.target();
            if no_color {
                writeln!(buf, "{timestamp} [{level:<5}] {target}: {}", record.args())
            } else {
                writeln!(
                    buf,
                    "{timestamp} {}[{level:<5}]\x1b[0m {target}: {}",
                    level_color(level),
                    record.args()
                )
            }
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_color_is_distinct_per_level() {
        let colors: Vec<&str> = [
            log::Level::Error,
            log::Level::Warn,
            log::Level::Info,
            log::Level::Debug,
            log::Level::Trace,
        ]
        .into_iter()
        .map(level_color)
        .collect();
        let mut unique = colors.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), colors.len());
    }
}
