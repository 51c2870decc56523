//! In-process TURN server
//!
//! Runs `turn::server::Server` on a loopback UDP port with static long-term
//! credentials. Relayed addresses are allocated on 127.0.0.1 and every
//! released allocation can be awaited with
//! [`TurnServerFixture::closed_allocation`].

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use turn::allocation::AllocationInfo;
use turn::auth::{AuthHandler, generate_auth_key};
use turn::relay::relay_static::RelayAddressGeneratorStatic;
use turn::server::Server;
use turn::server::config::{ConnConfig, ServerConfig};
use webrtc_util::vnet::net::Net;

/// Realm the fixture authenticates against
pub const FIXTURE_REALM: &str = "pion.ly";

struct StaticAuth {
    keys: HashMap<String, Vec<u8>>,
}

impl AuthHandler for StaticAuth {
    fn auth_handle(
        &self,
        username: &str,
        _realm: &str,
        _src_addr: SocketAddr,
    ) -> Result<Vec<u8>, turn::Error> {
        self.keys
            .get(username)
            .cloned()
            .ok_or(turn::Error::ErrFakeErr)
    }
}

/// A running TURN server accepting one user
pub struct TurnServerFixture {
    server: Server,
    addr: SocketAddr,
    closed: mpsc::Receiver<AllocationInfo>,
}

impl TurnServerFixture {
    /// Start a server that accepts `username`/`password`
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be started.
    pub async fn start(username: &str, password: &str) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("bind TURN server");
        let addr = socket.local_addr().expect("TURN server address");

        let mut keys = HashMap::new();
        keys.insert(
            username.to_owned(),
            generate_auth_key(username, FIXTURE_REALM, password),
        );

        let (closed_tx, closed) = mpsc::channel(8);
        let server = Server::new(ServerConfig {
            conn_configs: vec![ConnConfig {
                conn: Arc::new(socket),
                relay_addr_generator: Box::new(RelayAddressGeneratorStatic {
                    relay_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    address: "127.0.0.1".to_owned(),
                    net: Arc::new(Net::new(None)),
                }),
            }],
            realm: FIXTURE_REALM.to_owned(),
            auth_handler: Arc::new(StaticAuth { keys }),
            channel_bind_timeout: Duration::from_secs(0),
            alloc_close_notify: Some(closed_tx),
        })
        .await
        .expect("start TURN server");

        Self {
            server,
            addr,
            closed,
        }
    }

    /// Address clients dial
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to drop an allocation, up to `wait`
    pub async fn closed_allocation(&mut self, wait: Duration) -> Option<AllocationInfo> {
        tokio::time::timeout(wait, self.closed.recv())
            .await
            .ok()
            .flatten()
    }

    /// Stop the server
    pub async fn shutdown(self) {
        if let Err(e) = self.server.close().await {
            tracing::debug!("TURN fixture close: {}", e);
        }
    }
}
