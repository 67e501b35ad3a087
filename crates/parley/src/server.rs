//! `ParleyServer` builder and accept loop.
//!
//! This is the entry point for running a Parley server. It wires the
//! layers together: WebSocket socket → frames → session registry → room
//! coordinator, with the [`Relay`] carrying broadcasts back out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parley_protocol::JsonCodec;
use parley_room::{CoordinatorConfig, MemoryStore, RoomCoordinator, RoomStore};
use parley_session::SessionRegistry;
use tokio::net::TcpListener;

use crate::ParleyError;
use crate::handler::handle_connection;
use crate::relay::Relay;

/// Shared state handed to every connection task.
pub(crate) struct ServerState {
    pub(crate) coordinator: RoomCoordinator,
    pub(crate) relay: Arc<Relay>,
    pub(crate) codec: JsonCodec,
    pub(crate) next_session: AtomicU64,
}

/// Builder for configuring and starting a Parley server.
///
/// # Example
///
/// ```rust,no_run
/// use parley::prelude::*;
///
/// # async fn run() -> Result<(), ParleyError> {
/// let server = ParleyServer::builder()
///     .bind("0.0.0.0:8080")
///     .config(CoordinatorConfig::default())
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ParleyServerBuilder {
    bind_addr: String,
    config: CoordinatorConfig,
    store: Option<Arc<dyn RoomStore>>,
}

impl ParleyServerBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: CoordinatorConfig::default(),
            store: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `store` for rooms instead of a fresh [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn RoomStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Binds the listener and assembles the coordinator.
    pub async fn build(self) -> Result<ParleyServer, ParleyError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "WebSocket gateway listening");

        let registry = Arc::new(SessionRegistry::new());
        let relay = Arc::new(Relay::new(Arc::clone(&registry)));
        let store: Arc<dyn RoomStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let coordinator = RoomCoordinator::new(store, relay.clone(), registry, self.config);

        let state = Arc::new(ServerState {
            coordinator,
            relay,
            codec: JsonCodec,
            next_session: AtomicU64::new(1),
        });
        Ok(ParleyServer { listener, state })
    }
}

impl Default for ParleyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Parley server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParleyServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl ParleyServer {
    pub fn builder() -> ParleyServerBuilder {
        ParleyServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A handle on the coordinator behind this server.
    pub fn coordinator(&self) -> &RoomCoordinator {
        &self.state.coordinator
    }

    /// Runs the accept loop and the periodic viability sweep.
    ///
    /// Each accepted socket gets its own task. Runs until the process is
    /// terminated.
    pub async fn run(self) -> Result<(), ParleyError> {
        let _sweeper = self.state.coordinator.presence().spawn_sweeper();
        tracing::info!(
            sweep_interval = ?self.state.coordinator.config().sweep_interval,
            "Parley server running"
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, state).await {
                            tracing::debug!(error = %e, %addr, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
