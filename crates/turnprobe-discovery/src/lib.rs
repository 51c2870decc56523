//! # turnprobe Discovery
//!
//! Relay session and peer address rendezvous for turnprobe.
//!
//! This crate provides:
//! - The relay session state machine: secure link, relay client start,
//!   relay endpoint allocation, binding requests, ordered teardown
//! - A TURN backend for the relay client seam (webrtc-rs `turn`)
//! - Out-of-band relay address exchange through a shared key-value slot,
//!   polled for changes
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use turnprobe_discovery::relay::{RelayCredentials, RelaySession, TurnConnector};
//! use turnprobe_discovery::rendezvous::{Coordinator, FileSlot, SlotRole};
//! use turnprobe_transport::DtlsDialer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = RelayCredentials::parse("user=pass", "pion.ly")?;
//! let mut session = RelaySession::new("203.0.113.5:3478".parse()?, credentials);
//!
//! let dialer = DtlsDialer::new(std::time::Duration::from_secs(30))?;
//! let relay_addr = session.establish(&dialer, &TurnConnector::default()).await?;
//!
//! let coordinator = Coordinator::new(Arc::new(FileSlot::new(".")), SlotRole::Responder);
//! coordinator.publish(relay_addr).await?;
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod relay;
pub mod rendezvous;

pub use relay::{
    RelayClient, RelayConnector, RelayCredentials, RelayError, RelaySession, SessionState,
    TurnConnector,
};
pub use rendezvous::{
    AddressSlot, Coordinator, CoordinatorError, FileSlot, MemorySlot, PeerAddressRecord,
    PeerObserver, SlotRole,
};
