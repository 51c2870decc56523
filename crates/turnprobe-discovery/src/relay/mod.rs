//! # Relay Sessions
//!
//! Owns the lifecycle of the link to the relay server and of the relay
//! endpoint allocated on it.
//!
//! ## State machine
//!
//! ```text
//!  Disconnected ──connect──▶ SecureHandshakeInFlight ──▶ SecureEstablished
//!                                     │                        │
//!                                     │ failure          start_client
//!                                     ▼                        ▼
//!                                  Closed ◀──close── RelayListening
//!                                     ▲                        │
//!                                     │                    allocate
//!                                     │                        ▼
//!                                     └──────close────── RelayAllocated ⟲ binding / prime
//! ```
//!
//! Teardown always walks the same order: release the allocation, stop the
//! relay client, close the secured socket. Each step runs even if an earlier
//! one failed.

pub mod client;
pub mod error;
pub mod session;
pub mod turn_client;

pub use client::{RelayClient, RelayConnector, RelayCredentials};
pub use error::RelayError;
pub use session::{RelayPrimer, RelaySession, SessionState, prime_peer};
pub use turn_client::{ConnBridge, RelayedTransport, TurnConnector, TurnRelayClient};

/// Default TURN server port
pub const DEFAULT_RELAY_PORT: u16 = 3478;

/// Default long-term credential realm
pub const DEFAULT_REALM: &str = "pion.ly";

/// Payload of the priming packet that opens a relay permission
pub const HELLO_PAYLOAD: &[u8] = b"Hello world";
