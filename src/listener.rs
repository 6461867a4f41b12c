//! TCP listener and accept loop.
//!
//! A [`Listener`] owns the bound socket and serves one connection at a
//! time: each accepted connection is drained to its terminal state before
//! the next accept. Two accept disciplines are supported:
//!
//! - [`AcceptMode::Blocking`] waits in `accept` until a peer connects.
//! - [`AcceptMode::Polling`] checks for a pending connection without
//!   waiting and sleeps a fixed interval when there is none.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use varsend::{ConsoleSink, Listener, ServerConfig};
//!
//! let listener = Listener::bind(&ServerConfig::default()).await?;
//! listener.run(Arc::new(ConsoleSink::stdout()), async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await;
//! ```

use std::future::{poll_fn, Future};
use std::io;
use std::net::SocketAddr;
use std::task::Poll;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::{Result, VarSendError};
use crate::poll::{poll_until, DEFAULT_POLL_INTERVAL};
use crate::sink::Sink;

/// How the accept loop waits for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptMode {
    /// Wait inside `accept`.
    #[default]
    Blocking,
    /// Check without waiting, sleep `interval` when nothing is pending.
    Polling { interval: Duration },
}

/// Totals over a listener's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Connections accepted.
    pub connections: u64,
    /// Connections that ended in anything but a graceful close.
    pub abnormal: u64,
    /// Payloads dispatched across all connections.
    pub payloads: u64,
    /// Accept calls that failed.
    pub accept_errors: u64,
}

/// A bound, listening socket plus the settings its loop runs with.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    accept_mode: AcceptMode,
    max_payload: u32,
}

impl Listener {
    /// Bind and listen according to `config`.
    ///
    /// # Errors
    ///
    /// - [`VarSendError::Config`] if the host does not resolve
    /// - [`VarSendError::Bind`] if the socket cannot be created or bound
    /// - [`VarSendError::Listen`] if `listen` fails
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = config.resolve().await?;
        let bind_err = |source: io::Error| VarSendError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;

        let listener = socket
            .listen(config.backlog)
            .map_err(|source| VarSendError::Listen { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            backlog = config.backlog,
            mode = ?config.accept_mode,
            "listening"
        );

        Ok(Self {
            listener,
            local_addr,
            accept_mode: config.accept_mode,
            max_payload: config.max_payload,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept mode in effect.
    pub fn accept_mode(&self) -> AcceptMode {
        self.accept_mode
    }

    /// Serve connections one at a time until `shutdown` completes.
    ///
    /// Shutdown is honoured while waiting for a connection and while one
    /// is being served; an in-flight connection is dropped without
    /// dispatching its partial frame. The socket is closed on return.
    pub async fn run<S, F>(self, sink: S, shutdown: F) -> ListenerStats
    where
        S: Sink,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = ListenerStats::default();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                accepted = self.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    stats.accept_errors += 1;
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
                    continue;
                }
            };

            stats.connections += 1;
            debug!(peer = %peer, "connection accepted");

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(peer = %peer, "connection abandoned on shutdown");
                    break;
                }
                summary = handle_connection(stream, peer, &sink, self.max_payload) => {
                    stats.payloads += summary.payloads;
                    if !summary.disconnect.is_graceful() {
                        stats.abnormal += 1;
                    }
                }
            }
        }

        info!(
            addr = %self.local_addr,
            connections = stats.connections,
            payloads = stats.payloads,
            "listener stopped"
        );
        stats
    }

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        match self.accept_mode {
            AcceptMode::Blocking => self.listener.accept().await,
            AcceptMode::Polling { interval } => poll_until(interval, None, || async {
                match self.try_accept().await {
                    Ok(Some(conn)) => Some(Ok(conn)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .await
            .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::TimedOut, "accept polling stopped"))),
        }
    }

    /// Take a pending connection if there is one, without waiting.
    async fn try_accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        poll_fn(|cx| match self.listener.poll_accept(cx) {
            Poll::Ready(result) => Poll::Ready(result.map(Some)),
            Poll::Pending => Poll::Ready(Ok(None)),
        })
        .await
    }
}

/// A listener running on a background task.
///
/// Dropping the handle also stops the listener.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<ListenerStats>,
}

impl ListenerHandle {
    /// Bind according to `config` and start serving into `sink`.
    ///
    /// Returns once the socket is listening, so producers may connect
    /// immediately.
    pub async fn spawn<S: Sink>(config: &ServerConfig, sink: S) -> Result<Self> {
        let listener = Listener::bind(config).await?;
        let local_addr = listener.local_addr();
        let (tx, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(listener.run(sink, async move {
            let _ = rx.await;
        }));

        Ok(Self {
            local_addr,
            shutdown: Some(tx),
            task,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal shutdown and wait for the loop to finish.
    pub async fn stop(mut self) -> Result<ListenerStats> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        (&mut self.task)
            .await
            .map_err(|e| VarSendError::Io(io::Error::other(e)))
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode;
    use crate::sink::{BoxFuture, ReceivedPayload};
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncWriteExt;

    #[derive(Default)]
    struct Collector {
        seen: Mutex<Vec<Bytes>>,
    }

    impl Collector {
        fn seen(&self) -> Vec<Bytes> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Sink for Collector {
        fn consume<'a>(&'a self, message: &'a ReceivedPayload) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.seen.lock().unwrap().push(message.payload.clone());
                Ok(())
            })
        }
    }

    fn ephemeral() -> ServerConfig {
        ServerConfig::default().port(0)
    }

    async fn push(addr: SocketAddr, payloads: &[&[u8]]) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        for payload in payloads {
            stream.write_all(&encode(payload)).await.unwrap();
        }
        stream.shutdown().await.unwrap();
    }

    async fn wait_for(collector: &Collector, count: usize) -> bool {
        poll_until(Duration::from_millis(10), Some(Duration::from_secs(2)), || async {
            (collector.seen().len() >= count).then_some(())
        })
        .await
        .is_some()
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = Listener::bind(&ephemeral()).await.unwrap();

        assert_ne!(listener.local_addr().port(), 0);
        assert_eq!(listener.accept_mode(), AcceptMode::Blocking);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let first = Listener::bind(&ephemeral()).await.unwrap();
        let taken = first.local_addr().port();

        let result = Listener::bind(&ephemeral().port(taken)).await;
        assert!(matches!(result, Err(VarSendError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_blocking_mode_serves_connections_in_turn() {
        let collector = Arc::new(Collector::default());
        let handle = ListenerHandle::spawn(&ephemeral(), collector.clone())
            .await
            .unwrap();

        push(handle.local_addr(), &[b"a1", b"a2"]).await;
        assert!(wait_for(&collector, 2).await);
        push(handle.local_addr(), &[b"b1"]).await;
        assert!(wait_for(&collector, 3).await);

        let stats = handle.stop().await.unwrap();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.payloads, 3);
        assert_eq!(
            collector.seen(),
            vec![
                Bytes::from_static(b"a1"),
                Bytes::from_static(b"a2"),
                Bytes::from_static(b"b1")
            ]
        );
    }

    #[tokio::test]
    async fn test_polling_mode_delivers() {
        let collector = Arc::new(Collector::default());
        let config = ephemeral().polling(Duration::from_millis(5));
        let handle = ListenerHandle::spawn(&config, collector.clone())
            .await
            .unwrap();

        push(handle.local_addr(), &[b"polled"]).await;
        assert!(wait_for(&collector, 1).await);

        let stats = handle.stop().await.unwrap();
        assert_eq!(stats.connections, 1);
    }

    #[tokio::test]
    async fn test_stop_while_idle() {
        let handle = ListenerHandle::spawn(&ephemeral(), Collector::default())
            .await
            .unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, ListenerStats::default());
    }

    #[tokio::test]
    async fn test_stop_with_open_connection() {
        let collector = Arc::new(Collector::default());
        let handle = ListenerHandle::spawn(&ephemeral(), collector.clone())
            .await
            .unwrap();

        let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        stream.write_all(&encode(b"kept")).await.unwrap();
        stream.write_all(&[0, 0]).await.unwrap();
        assert!(wait_for(&collector, 1).await);

        let stats = tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(collector.seen(), vec![Bytes::from_static(b"kept")]);
    }

    #[tokio::test]
    async fn test_abnormal_connections_counted() {
        let collector = Arc::new(Collector::default());
        let handle = ListenerHandle::spawn(&ephemeral(), collector.clone())
            .await
            .unwrap();

        let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        stream.write_all(&[0, 0, 1]).await.unwrap();
        stream.shutdown().await.unwrap();
        drop(stream);

        push(handle.local_addr(), &[b"next"]).await;
        assert!(wait_for(&collector, 1).await);

        let stats = handle.stop().await.unwrap();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.abnormal, 1);
    }
}
