use std::{env, sync::Once};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

static LOG_INIT: Once = Once::new();

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// `RUST_LOG_FORMAT=json` selects JSON, anything else plain text.
    pub fn from_env_value(v: Option<&str>) -> Self {
        match v {
            Some(s) if s.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Install the global subscriber. Later calls are no-ops.
///
/// Filtering follows `RUST_LOG` and falls back to `info`.
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();
        let format = LogFormat::from_env_value(env::var("RUST_LOG_FORMAT").ok().as_deref());
        match format {
            LogFormat::Json => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(use_color(env::var("NO_COLOR").ok().as_deref()))
                .init(),
        }
    });
}

fn use_color(no_color: Option<&str>) -> bool {
    no_color.is_none_or(str::is_empty)
}
