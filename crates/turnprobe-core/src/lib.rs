//! # turnprobe Core
//!
//! Round-trip diagnostics through a relay allocated over a secured link.
//!
//! This crate provides:
//! - The probe payload codec (RFC 3339 timestamps)
//! - The echo responder and the ping originator
//! - [`ProbeClient`], which runs one relay session, the address coordinator
//!   and one diagnostic loop, and always tears the session down
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ProbeClient                               │
//! │   (session lifetime, shutdown, outcome)                          │
//! ├──────────────────────────────┬──────────────────────────────────┤
//! │   EchoResponder / Pinger     │   Coordinator                    │
//! │   (diagnostic loop)          │   (publish own, follow peer)     │
//! ├──────────────────────────────┴──────────────────────────────────┤
//! │                        RelaySession                              │
//! │   (secured socket, relay client, relay endpoint)                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod echo;
pub mod error;
pub mod ping;
pub mod probe;

pub use client::{DEFAULT_PEER_TIMEOUT, ProbeClient, ProbeConfig, ProbeMode, ProbeOutcome};
pub use echo::{EchoResponder, EchoStats};
pub use error::{Error, Result};
pub use ping::{PingConfig, PingReply, PingSummary, Pinger};
pub use probe::ProbeMessage;
