//! The chat relay server binary's library half: configuration, the
//! per-transport adapters, the liveness sweeper, and the facade that
//! wires a `Config` to exactly one running adapter.

pub mod config;
pub mod sweeper;
pub mod tcp;
pub mod udp;
pub mod ws;

use std::net::SocketAddr;

use chat_core::{Registry, Relay};
pub use config::{Config, RelayError, Transport};
use sweeper::Sweeper;
use tcp::TcpAdapter;
use tracing::info;
use udp::UdpAdapter;
use ws::WsAdapter;

/// A started server: the running adapter plus its liveness sweeper (UDP
/// only carries one; TCP/WS hold it idle with nothing to prune).
pub enum Adapter {
    Tcp(TcpAdapter),
    Udp(UdpAdapter, Sweeper),
    Ws(WsAdapter),
}

impl Adapter {
    pub fn local_addr(&self) -> SocketAddr {
        match self {
            Adapter::Tcp(a) => a.local_addr(),
            Adapter::Udp(a, _) => a.local_addr(),
            Adapter::Ws(a) => a.local_addr(),
        }
    }

    /// Idempotent shutdown of the adapter and its sweeper, if any.
    pub fn stop(&self) {
        match self {
            Adapter::Tcp(a) => a.stop(),
            Adapter::Udp(a, sweeper) => {
                a.stop();
                sweeper.stop();
            }
            Adapter::Ws(a) => a.stop(),
        }
    }
}

/// Server Facade (C7): picks exactly one adapter by `config.transport`,
/// binds it, and (UDP only) starts the liveness sweeper alongside it.
pub async fn start(config: &Config) -> Result<Adapter, RelayError> {
    let addr = SocketAddr::new(config.ip, config.port);
    let registry = Registry::new();
    let relay = Relay::new(registry.clone());

    let adapter = match config.transport {
        Transport::Tcp => {
            let adapter = TcpAdapter::start(addr, registry, relay)
                .await
                .map_err(|source| RelayError::Bind { addr: addr.to_string(), source })?;
            Adapter::Tcp(adapter)
        }
        Transport::Udp => {
            let adapter = UdpAdapter::start(addr, registry.clone(), relay)
                .await
                .map_err(|source| RelayError::Bind { addr: addr.to_string(), source })?;
            let sweeper = Sweeper::start(registry, config.sweep_interval, config.idle_timeout);
            Adapter::Udp(adapter, sweeper)
        }
        Transport::Http => {
            let adapter = WsAdapter::start(addr, registry, relay)
                .await
                .map_err(|source| RelayError::Bind { addr: addr.to_string(), source })?;
            Adapter::Ws(adapter)
        }
    };

    info!(addr = %adapter.local_addr(), transport = %config.transport, "chat relay started");
    Ok(adapter)
}
