//! Zonecert Common Library
//!
//! Shared building blocks for the zonecert crates:
//!
//! - [`ids`] - Type-safe identifiers (issuance, provider, authority)
//! - [`retry`] - Bounded fixed-delay retry policy
//! - [`observability`] - Tracing setup, event counters and error reports

pub mod ids;
pub mod observability;
pub mod retry;

pub use ids::{AuthorityId, IssuanceId, ProviderId};
pub use observability::{count_event, init_tracing, report_error, EventCounter};
pub use retry::RetryPolicy;
