//! Observability for zonecert
//!
//! Logging initialisation plus the fire-and-forget event counters and error
//! reports emitted by the issuance pipeline. Nothing in here may fail an
//! issuance: metric registration problems degrade to log-only reporting.

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable selecting the log format (`json` or `pretty`)
pub const LOG_FORMAT_ENV: &str = "ZONECERT_LOG_FORMAT";

/// Initialize the tracing/logging subsystem
pub fn init_tracing() -> Result<()> {
    let format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "json".to_string());

    // JSON for production log shipping
    let json_layer = if format == "json" {
        Some(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
    } else {
        None
    };

    // Pretty format for development
    let pretty_layer = if format == "pretty" {
        Some(fmt::layer().pretty().with_target(true))
    } else {
        None
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()?;

    info!(format = %format, "Tracing initialized");
    Ok(())
}

/// Named event counter backed by a single Prometheus counter vector.
///
/// Every distinct event name becomes one `event` label value of
/// `zonecert_events_total`.
pub struct EventCounter {
    events: Option<IntCounterVec>,
}

static EVENTS: Lazy<EventCounter> = Lazy::new(EventCounter::register);

impl EventCounter {
    fn register() -> Self {
        let events = match register_int_counter_vec!(
            "zonecert_events_total",
            "Issuance pipeline events by name",
            &["event"]
        ) {
            Ok(counter) => Some(counter),
            Err(e) => {
                warn!(error = %e, "Failed to register event counter, metrics disabled");
                None
            }
        };
        Self { events }
    }

    /// Process-wide counter instance
    pub fn global() -> &'static EventCounter {
        &EVENTS
    }

    /// Increment the counter for `event`
    pub fn incr(&self, event: &str) {
        if let Some(ref events) = self.events {
            events.with_label_values(&[event]).inc();
        }
    }

    /// Current value for `event` (zero when metrics are disabled)
    pub fn get(&self, event: &str) -> u64 {
        self.events
            .as_ref()
            .map(|events| events.with_label_values(&[event]).get())
            .unwrap_or(0)
    }
}

/// Increment the process-wide counter for `event`
pub fn count_event(event: &str) {
    EventCounter::global().incr(event);
}

/// Report an error: bump the named counter and emit an `error` event.
///
/// `context` carries diagnostic locators (domain, change id, order url).
/// It must never contain key material.
pub fn report_error(event: &str, error: &dyn std::error::Error, context: &[(&str, &str)]) {
    count_event(event);
    error!(
        event,
        error = %error,
        context = ?context,
        "Issuance error reported"
    );
}
