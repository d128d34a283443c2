use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

/// Events concerning the mail provider side of the pipeline
#[macro_export]
macro_rules! outbound {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "outbound", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::outbound!(level = TRACE, $($msg)*)
    };
}

/// Events concerning the bus side of the pipeline
#[macro_export]
macro_rules! inbound {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "inbound", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::inbound!(level = TRACE, $($msg)*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

/// Output format of the log subscriber, selected with `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Compact,
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown log format {other}")),
        }
    }
}

fn level_from_env() -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn format_from_env() -> Format {
    std::env::var("LOG_FORMAT").map_or_else(
        |_| Format::default(),
        |format| {
            format.parse().unwrap_or_else(|err| {
                eprintln!("{err}, defaulting to compact output");
                Format::default()
            })
        },
    )
}

fn herald_only() -> FilterFn {
    FilterFn::new(|metadata| metadata.target().starts_with("herald"))
}

/// Install the global subscriber.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init() {
    let level = level_from_env();
    let timer = tracing_subscriber::fmt::time::ChronoUtc::rfc_3339();

    let layer = match format_from_env() {
        Format::Compact => tracing_subscriber::fmt::layer()
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_ansi(true)
            .with_timer(timer)
            .with_filter(level)
            .with_filter(herald_only())
            .boxed(),
        Format::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_timer(timer)
            .with_filter(level)
            .with_filter(herald_only())
            .boxed(),
    };

    let _ = tracing_subscriber::Registry::default().with(layer).try_init();
}
