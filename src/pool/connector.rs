//! Keeps a window of registered sockets open towards every router.
//!
//! # Responsibilities
//! - Run `sliding_window` slots per router, each owning one socket at a time
//! - Reconnect after termination: immediately after a graceful close, with backoff
//!   after a failure. Only a graceful close resets the backoff
//! - Track open sockets and feed the socket metrics
//! - Stop reconnecting and close live sockets with 1001 on shutdown

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use thiserror::Error;
use tokio::task::JoinSet;
use url::Url;
use uuid::Uuid;

use crate::backend::forwarder::RequestForwarder;
use crate::config::{ConnectorConfig, ReconnectConfig};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::connection::SocketTracker;
use crate::net::tls;
use crate::net::websocket::{self, Registration};
use crate::observability::metrics;
use crate::protocol::engine::SocketContext;
use crate::protocol::error::ConnectorError;
use crate::protocol::listener::{NoopEvents, ProxyEventListener, SocketInfo, SocketListener};
use crate::resilience::backoff::Backoff;

/// Errors raised while building a pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Invalid router URL {url}: {source}")]
    InvalidRouter {
        url: String,
        source: url::ParseError,
    },

    #[error("TLS configuration failed: {0}")]
    Tls(#[from] rustls::Error),
}

/// Listener installed by the pool in front of any user listener.
struct PoolListener {
    tracker: SocketTracker,
    inner: Option<Arc<dyn SocketListener>>,
}

impl SocketListener for PoolListener {
    fn on_connection_acquired(&self, socket: &SocketInfo) {
        self.tracker.opened();
        metrics::record_socket_open();
        tracing::debug!(
            connection_id = %socket.id,
            router = %socket.router,
            open = self.tracker.open_count(),
            "Socket acquired"
        );
        if let Some(inner) = &self.inner {
            inner.on_connection_acquired(socket);
        }
    }

    fn on_close(&self, socket: &SocketInfo, error: Option<&ConnectorError>) {
        self.tracker.closed();
        metrics::record_socket_closed();
        match error {
            Some(e) => tracing::warn!(connection_id = %socket.id, router = %socket.router, error = %e, "Socket terminated"),
            None => tracing::debug!(connection_id = %socket.id, router = %socket.router, "Socket closed"),
        }
        if let Some(inner) = &self.inner {
            inner.on_close(socket, error);
        }
    }
}

/// Everything a slot needs, shared by all slots.
struct Shared {
    registration: Registration,
    tls: Arc<ClientConfig>,
    context: Arc<SocketContext>,
    reconnect: ReconnectConfig,
    connect_timeout: Duration,
    close_timeout: Duration,
}

/// Pool of registered sockets.
pub struct ConnectorPool {
    routers: Vec<Url>,
    sliding_window: usize,
    config: ConnectorConfig,
    registration: Registration,
    tls: Arc<ClientConfig>,
    forwarder: Arc<dyn RequestForwarder>,
    events: Arc<dyn ProxyEventListener>,
    listener: Option<Arc<dyn SocketListener>>,
    tracker: SocketTracker,
}

impl ConnectorPool {
    /// Build a pool from validated configuration.
    pub fn new(
        config: &ConnectorConfig,
        forwarder: Arc<dyn RequestForwarder>,
    ) -> Result<Self, PoolError> {
        let routers = config
            .routers
            .iter()
            .map(|r| {
                Url::parse(r).map_err(|source| PoolError::InvalidRouter {
                    url: r.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let registration = Registration {
            component: config.component.clone(),
            version: config.protocol.version,
            instance_id: Uuid::new_v4(),
        };

        Ok(Self {
            routers,
            sliding_window: config.sliding_window,
            config: config.clone(),
            registration,
            tls: tls::client_config(&config.tls)?,
            forwarder,
            events: Arc::new(NoopEvents),
            listener: None,
            tracker: SocketTracker::new(),
        })
    }

    /// Install a best-effort request observer.
    pub fn with_events(mut self, events: Arc<dyn ProxyEventListener>) -> Self {
        self.events = events;
        self
    }

    /// Install a listener called after the pool's own bookkeeping.
    pub fn with_listener(mut self, listener: Arc<dyn SocketListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Open socket accounting, shared with the running slots.
    pub fn tracker(&self) -> SocketTracker {
        self.tracker.clone()
    }

    /// Instance id announced to every router.
    pub fn instance_id(&self) -> Uuid {
        self.registration.instance_id
    }

    /// Run every slot until `shutdown` fires and all sockets have closed.
    pub async fn run(self, shutdown: Shutdown) {
        let timeouts = &self.config.timeouts;
        let ping_interval =
            (timeouts.ping_interval_secs > 0).then(|| Duration::from_secs(timeouts.ping_interval_secs));

        let listener = Arc::new(PoolListener {
            tracker: self.tracker.clone(),
            inner: self.listener.clone(),
        });
        let context = Arc::new(SocketContext {
            forwarder: self.forwarder.clone(),
            listener,
            events: self.events.clone(),
            protocol: self.config.protocol.clone(),
            ping_interval,
            runtime: tokio::runtime::Handle::current(),
        });
        let shared = Arc::new(Shared {
            registration: self.registration.clone(),
            tls: self.tls.clone(),
            context,
            reconnect: self.config.reconnect.clone(),
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
            close_timeout: Duration::from_secs(timeouts.close_secs),
        });

        tracing::info!(
            instance_id = %self.registration.instance_id,
            component = %self.registration.component.name,
            routers = self.routers.len(),
            sliding_window = self.sliding_window,
            "Connector pool starting"
        );

        let mut slots = JoinSet::new();
        for router in &self.routers {
            for index in 0..self.sliding_window {
                slots.spawn(run_slot(
                    shared.clone(),
                    router.clone(),
                    index,
                    shutdown.clone(),
                ));
            }
        }
        while let Some(result) = slots.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Connector slot panicked");
            }
        }
        tracing::info!("Connector pool stopped");
    }
}

async fn run_slot(shared: Arc<Shared>, router: Url, index: usize, shutdown: Shutdown) {
    let mut backoff = Backoff::new(&shared.reconnect);
    let mut stop = shutdown.subscribe();

    while !shutdown.is_triggered() {
        let connected = tokio::select! {
            result = websocket::connect(&router, &shared.registration, &shared.tls, shared.connect_timeout) => result,
            _ = stop.recv() => break,
        };

        let failed = match connected {
            Ok(stream) => {
                let socket_shutdown = shutdown.subscribe();
                if shutdown.is_triggered() {
                    break;
                }
                let info = SocketInfo::new(router.as_str());
                tracing::debug!(router = %router, slot = index, connection_id = %info.id, "Socket registered");
                websocket::run_socket(
                    stream,
                    info,
                    shared.context.clone(),
                    socket_shutdown,
                    shared.close_timeout,
                )
                .await
                .is_some()
            }
            Err(e) => {
                tracing::warn!(router = %router, slot = index, error = %e, "Router registration failed");
                true
            }
        };

        if shutdown.is_triggered() {
            break;
        }
        if !failed {
            backoff.reset();
            continue;
        }
        let delay = backoff.next_delay();
        metrics::record_reconnect(router.as_str());
        tracing::info!(
            router = %router,
            slot = index,
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "Reconnecting after backoff"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.recv() => break,
        }
    }
    tracing::debug!(router = %router, slot = index, "Slot stopped");
}
