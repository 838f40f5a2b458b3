//! Websocket listener: binds once, accepts forever, one task per client.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::ws::connection;
use crate::ws::registry::{self, SharedRegistry};

/// The websocket endpoint and the set of connections it has accepted.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<Config>,
    registry: SharedRegistry,
}

impl Server {
    /// Binds the listener eagerly, so an unavailable port fails startup
    /// instead of the first connection.
    pub async fn bind(config: Config) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        let local_addr = listener.local_addr()?;
        info!("Listening on ws://{}{}", local_addr, config.route);

        Ok(Self {
            listener,
            local_addr,
            config: Arc::new(config),
            registry: registry::new_shared(),
        })
    }

    /// The bound address. Differs from the configured one when port 0 was
    /// requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Accepts connections until the process is signalled to stop.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Accepts connections until `shutdown` resolves, then asks every live
    /// connection to terminate its backend and close.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    let mut registry = self.registry.write().await;
                    info!("Shutdown signal received, draining {} connection(s)", registry.len());
                    registry.drain();
                    break;
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    debug!("Accepted TCP connection from {}", peer);

                    let config = self.config.clone();
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        if let Err(e) = connection::serve(stream, peer, config, registry).await {
                            warn!("Connection from {} ended with error: {}", peer, e);
                        }
                    });
                }
            }
        }

        info!("Listener stopped");
        Ok(())
    }
}

/// Resolves when the process is asked to stop: SIGTERM or Ctrl-C on Unix,
/// Ctrl-C elsewhere.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
