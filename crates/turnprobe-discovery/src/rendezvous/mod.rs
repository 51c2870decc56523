//! # Rendezvous
//!
//! Out-of-band exchange of relay addresses between the two probe processes.
//!
//! Each process writes its own relayed address to a well-known key of a shared
//! slot and polls the counterpart's key, remembering the last value it saw.
//! A changed value means the peer (re)allocated: the relay is primed for the
//! new address and the address is handed to the diagnostic loop.
//!
//! ```text
//!   Responder                      slot                      Initiator
//!   ─────────                ────────────────                ─────────
//!   write relay.port ──────▶ relay.port  = R1 ──────▶ poll relay.port
//!   poll relayc.port ◀────── relayc.port = R2 ◀────── write relayc.port
//! ```

pub mod coordinator;
pub mod error;
pub mod record;
pub mod slot;

pub use coordinator::{
    Coordinator, DEFAULT_POLL_INTERVAL, INITIATOR_KEY, PeerObserver, RESPONDER_KEY, SlotRole,
};
pub use error::CoordinatorError;
pub use record::PeerAddressRecord;
pub use slot::{AddressSlot, FileSlot, MemorySlot};
