use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($arg:tt)+) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($arg)+)
    }};
}

/// Events raised while capturing relay ids at send time.
#[macro_export]
macro_rules! outbound {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "outbound", $($arg)+)
    };

    ($($arg:tt)+) => {
        $crate::outbound!(level = DEBUG, $($arg)+)
    };
}

/// Events raised while correlating replies and opens.
#[macro_export]
macro_rules! inbound {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "inbound", $($arg)+)
    };

    ($($arg:tt)+) => {
        $crate::inbound!(level = DEBUG, $($arg)+)
    };
}

/// Events raised while classifying and correlating bounce reports.
#[macro_export]
macro_rules! bounce {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "bounce", $($arg)+)
    };

    ($($arg:tt)+) => {
        $crate::bounce!(level = DEBUG, $($arg)+)
    };
}

/// Level used when `LOG_LEVEL` is unset or unparseable.
const DEFAULT_LEVEL: LevelFilter = if cfg!(debug_assertions) {
    LevelFilter::TRACE
} else {
    LevelFilter::INFO
};

/// Maximum level for a `LOG_LEVEL` value.
fn max_level(value: Option<&str>) -> LevelFilter {
    value.map_or(DEFAULT_LEVEL, |level| {
        LevelFilter::from_str(level.trim()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {DEFAULT_LEVEL}");
            DEFAULT_LEVEL
        })
    })
}

/// Installs a compact fmt subscriber for this crate's events.
///
/// The level comes from `LOG_LEVEL`, defaulting to `TRACE` in debug builds
/// and `INFO` otherwise. Only events under the `relay_tracking` target are
/// printed. Hosts that already install their own subscriber should not call
/// this.
///
/// # Panics
/// If a global subscriber has already been set.
pub fn init() {
    let level = max_level(std::env::var("LOG_LEVEL").ok().as_deref());

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with(env!("CARGO_CRATE_NAME"))
                })),
        )
        .init();
}
