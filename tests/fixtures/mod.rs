//! Loopback stand-ins for the relay server and relay client, and an
//! in-process TURN server for the real relay client.

mod loopback_relay;
mod turn_server;

pub use loopback_relay::{LoopbackRelay, LoopbackRelayClient, RelayServerStub};
pub use turn_server::{FIXTURE_REALM, TurnServerFixture};
