//! Listener and session bookkeeping
//!
//! A [`Server`] owns one TCP listener for one protocol variant. Every
//! accepted connection becomes a session task that runs the variant's state
//! machine and removes itself from the [`SessionRegistry`] when it ends.

mod registry;

pub use registry::{SessionId, SessionRegistry};

use crate::config::Config;
use crate::{socks4, socks5};
use anyhow::{Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Protocol variant served by a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksVersion {
    /// SOCKS4 with the 4A domain-name extension
    Socks4,
    /// SOCKS5 (RFC 1928)
    Socks5,
}

impl fmt::Display for SocksVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksVersion::Socks4 => write!(f, "SOCKS4"),
            SocksVersion::Socks5 => write!(f, "SOCKS5"),
        }
    }
}

/// One protocol listener with its session registry
pub struct Server {
    version: SocksVersion,
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl Server {
    /// Bind the listener on the address and port configured for `version`.
    pub async fn bind(config: Arc<Config>, version: SocksVersion) -> Result<Server> {
        let (address, port) = match version {
            SocksVersion::Socks4 => (config.socks4.address.as_str(), config.socks4.port),
            SocksVersion::Socks5 => (config.socks5.address.as_str(), config.socks5.port),
        };

        let listen_addr = format!("{}:{}", address, port);
        let listener = TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("Failed to bind {} listener on {}", version, listen_addr))?;

        Ok(Server {
            version,
            listener,
            registry: Arc::new(SessionRegistry::new()),
            config,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Listener has no local address")
    }

    /// Registry of the sessions spawned by this listener
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until the task is dropped or aborted.
    ///
    /// Accept errors are logged and the loop continues; a failed session
    /// never stops the server.
    pub async fn run(self) -> Result<()> {
        let Server {
            version,
            listener,
            registry,
            config,
        } = self;

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept incoming connection: {}", e);
                    continue;
                }
            };

            info!("Incoming {} client from {}", version, peer);

            let Some(id) = registry.acquire_id() else {
                error!("No free session identifier, dropping client {}", peer);
                continue;
            };

            let config = Arc::clone(&config);
            let registry_ref = Arc::downgrade(&registry);
            let task = tokio::spawn(async move {
                let result = match version {
                    SocksVersion::Socks4 => socks4::handle_session(stream, &config.socks4).await,
                    SocksVersion::Socks5 => socks5::handle_session(stream, &config.socks5).await,
                };

                // Failure sites have already logged at their own level;
                // keep the context chain available for debugging only.
                if let Err(e) = result {
                    debug!("Session {} terminated: {:#}", id, e);
                }

                if let Some(registry) = registry_ref.upgrade() {
                    registry.remove(id);
                }
            });

            registry.attach(id, task.abort_handle());
        }
    }
}
