//! # Event Bus
//!
//! In-process publish/subscribe used by the PLM slices. Lifecycle operations publish
//! domain events; observers such as the audit trail subscribe without the publisher
//! knowing about them.
//!
//! Channels are Tokio broadcast channels stored in a `TypeId`-keyed registry
//! (`FxHashMap` under a `parking_lot::RwLock`).
//!
//! ```rust
//! use plm_event_bus::{EventBus, EventReceiverExt};
//!
//! #[derive(Debug, PartialEq)]
//! struct Released { key: String }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), plm_event_bus::EventBusError> {
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe::<Released>()?;
//!
//! bus.publish(Released { key: "BRK-7-B".into() })?;
//! assert_eq!(rx.next_event().await.unwrap().key, "BRK-7-B");
//! # Ok(())
//! # }
//! ```

mod bus;
mod error;
mod receiver;

pub use bus::{DEFAULT_CAPACITY, Event, EventBus};
pub use error::{EventBusError, EventBusErrorExt};
pub use receiver::EventReceiverExt;
