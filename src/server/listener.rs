//! TCP listener for the decision service.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, Instrument};

use super::protocol::handle_connection;
use crate::error::Result;
use crate::ratelimit::LimiterBackend;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Decision service bound to a TCP address.
pub struct DecisionServer<B: LimiterBackend + 'static> {
    /// Bound listener
    listener: TcpListener,
    /// The limiter every connection consults
    backend: Arc<B>,
}

impl<B: LimiterBackend + 'static> DecisionServer<B> {
    /// Bind the service to `addr`. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr, backend: Arc<B>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, backend })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the process exits.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until `signal` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            addr = %self.local_addr()?,
            "Decision service accepting connections"
        );

        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Decision service stopped accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            // Back off so descriptor exhaustion does not spin the loop
                            error!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };

                    let backend = Arc::clone(&self.backend);
                    let span = info_span!("connection", peer = %peer);
                    tokio::spawn(
                        async move {
                            debug!("Connection opened");
                            if let Err(e) = handle_connection(&*backend, stream).await {
                                debug!(error = %e, "Connection closed with error");
                            }
                        }
                        .instrument(span),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{Limiter, LimiterConfig};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn request(reader: &mut BufReader<TcpStream>, line: &str) -> serde_json::Value {
        reader.get_mut().write_all(line.as_bytes()).await.unwrap();
        let mut reply = String::new();
        reader.read_line(&mut reply).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_serve_decisions_over_tcp() {
        let config = LimiterConfig::new(60_000, 2, "slow down").unwrap();
        let limiter = Arc::new(Limiter::new(config));
        let server = DecisionServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&limiter))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = stop_rx.await;
        }));

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        let first = request(&mut client, "CHECK 10.1.1.1\n").await;
        assert_eq!(first["allowed"], true);
        assert_eq!(first["remaining"], 1);

        request(&mut client, "CHECK 10.1.1.1\n").await;
        let denied = request(&mut client, "CHECK 10.1.1.1\n").await;
        assert_eq!(denied["allowed"], false);
        assert_eq!(denied["message"], "slow down");

        // A second connection shares the same limiter
        let mut other = BufReader::new(TcpStream::connect(addr).await.unwrap());
        let peek = request(&mut other, "PEEK 10.1.1.1\n").await;
        assert_eq!(peek["count"], 2);
        assert_eq!(limiter.tracked_keys(), 1);

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
