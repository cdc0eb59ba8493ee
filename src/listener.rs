use crate::channels::ChannelData;
use crate::connection::Connection;
use crate::prelude::*;

use net2::TcpStreamExt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

const ACCEPT_ERROR_DELAY_MS: u64 = 100;

/// Accepts device connections and hands each one to its own task.
pub struct Listener {
    listener: TcpListener,
    server: config::Server,
    registry: Arc<Registry>,
    store: Store,
    stats: Arc<Mutex<IngestStats>>,
    channels: Channels,
    limit: Option<Arc<Semaphore>>,
}

impl Listener {
    pub async fn bind(
        server: config::Server,
        registry: Arc<Registry>,
        store: Store,
        stats: Arc<Mutex<IngestStats>>,
        channels: Channels,
    ) -> Result<Self> {
        let address = server.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| file_error_with_source!(e, "cannot listen on {}", address))?;

        info!("Listening on {}", listener.local_addr()?);

        let limit = server
            .max_connections()
            .map(|max| Arc::new(Semaphore::new(max)));

        Ok(Self {
            listener,
            server,
            registry,
            store,
            stats,
            channels,
            limit,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Accept failures are logged and retried; only a
    /// `Shutdown` message ends the loop.
    pub async fn run(&self) -> Result<()> {
        let mut rx = self.channels.to_listener.subscribe();

        loop {
            // wait for a free slot before accepting when connections are capped
            let permit = match &self.limit {
                Some(limit) => tokio::select! {
                    msg = rx.recv() => {
                        if Self::is_shutdown(msg) {
                            break;
                        }
                        continue;
                    }
                    permit = limit.clone().acquire_owned() => {
                        Some(permit.map_err(|e| anyhow!("listener.rs:connection limit closed: {}", e))?)
                    }
                },
                None => None,
            };

            tokio::select! {
                msg = rx.recv() => {
                    if Self::is_shutdown(msg) {
                        break;
                    }
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer, permit),
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            IngestStats::lock(&self.stats).accept_errors += 1;
                            tokio::time::sleep(Duration::from_millis(ACCEPT_ERROR_DELAY_MS)).await;
                        }
                    }
                }
            }
        }

        info!("Listener stopped");
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_listener.send(ChannelData::Shutdown);
    }

    fn is_shutdown(msg: Result<ChannelData, broadcast::error::RecvError>) -> bool {
        match msg {
            Ok(ChannelData::Shutdown) => {
                info!("Listener received shutdown signal");
                true
            }
            Err(broadcast::error::RecvError::Closed) => true,
            Err(broadcast::error::RecvError::Lagged(_)) => false,
        }
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: Option<tokio::sync::OwnedSemaphorePermit>,
    ) {
        info!("Connection from {}", peer);
        IngestStats::lock(&self.stats).record_accepted();

        let stream = match self.configure(stream) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("{}: failed to configure socket: {}", peer, e);
                IngestStats::lock(&self.stats).record_connection_end(&Err(e));
                return;
            }
        };

        let connection = Connection::new(
            peer,
            self.registry.clone(),
            self.store.clone(),
            self.stats.clone(),
        )
        .with_read_timeout(self.server.read_timeout());
        let stats = self.stats.clone();

        tokio::spawn(async move {
            let result = connection.run(stream).await;

            match &result {
                Ok(()) => info!("{}: connection closed by peer", peer),
                Err(ConnectionFault::Reset(_)) => info!("{}: connection reset", peer),
                Err(e) => warn!("{}: connection failed: {}", peer, e),
            }
            IngestStats::lock(&stats).record_connection_end(&result);

            drop(permit);
        });
    }

    fn configure(&self, stream: TcpStream) -> Result<TcpStream> {
        let keepalive = self.server.tcp_keepalive();
        if keepalive == 0 {
            return Ok(stream);
        }

        let std_stream = stream.into_std()?;
        if let Err(e) = std_stream.set_keepalive(Some(Duration::from_secs(keepalive))) {
            warn!("Failed to set TCP keepalive: {}", e);
        }

        Ok(TcpStream::from_std(std_stream)?)
    }
}
