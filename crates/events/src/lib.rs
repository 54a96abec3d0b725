//! CareLink event bus and alert fan-out.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`HealthEvent`]: a record mutation published by the operation that
//!   made it.
//! - [`AlertRouter`]: subscribes to the bus and turns events into notices.
//! - [`AlertFanOut`]: role-aware delivery to every peer clinician.
//! - [`ports`]: collaborator traits (directory, store, cache), with
//!   in-memory implementations in [`memory`].
//! - [`delivery`]: the SMS channel.

pub mod bus;
pub mod config;
pub mod delivery;
pub mod fanout;
pub mod memory;
pub mod ports;
pub mod router;

pub use bus::{EventBus, HealthEvent};
pub use config::ConfigError;
pub use delivery::sms::{HttpSmsGateway, SmsConfig, SmsGateway, SmsNotificationStore};
pub use fanout::{AlertFanOut, FailurePolicy, FanOutConfig, FanOutError, FanOutReport};
pub use memory::{InMemoryCache, InMemoryDirectory, InMemoryNotificationStore};
pub use router::AlertRouter;
