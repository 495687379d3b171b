//! Observability for shard recovery and resync
//!
//! - Typed lifecycle events (`Event`), each with a fixed level
//! - Emission through `tracing` (`log_event`)
//! - Begin/complete scopes (`ObservationScope`)
//! - Subscriber initialisation for the binary (`init_logging`)
//!
//! Observability is read-only: nothing here influences control flow.
//! Libraries and tests never install a subscriber themselves.

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{init_logging, log_event, render_fields, LoggingOptions, LOG_FILTER_ENV};
pub use scope::ObservationScope;
