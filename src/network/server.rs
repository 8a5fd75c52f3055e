//! TCP Server
//!
//! Accepts connections and dispatches them to a fixed pool of worker threads.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver};

use crate::config::Config;
use crate::datastore::Datastore;
use crate::error::Result;

use super::Connection;

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// TCP server for logkv
pub struct Server {
    config: Config,
    store: Arc<Datastore>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
}

/// Cloneable handle that stops a running server
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the server to stop accepting and return from `run`
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

impl Server {
    /// Bind the listen address from `config`
    pub fn bind(config: Config, store: Arc<Datastore>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        // Non-blocking accept so the loop can notice shutdown
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            store,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
        }
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Serve until shut down (blocking)
    ///
    /// Connections queue on a bounded channel; each of `max_connections`
    /// workers serves one connection at a time.
    pub fn run(&self) -> Result<()> {
        tracing::info!(
            addr = %self.local_addr()?,
            workers = self.config.max_connections,
            "Server listening"
        );

        let (tx, rx) = channel::bounded::<TcpStream>(self.config.max_connections);
        let workers = (0..self.config.max_connections)
            .map(|id| self.spawn_worker(id, rx.clone()))
            .collect::<Result<Vec<_>>>()?;
        drop(rx);

        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    tracing::trace!(%peer, "Accepted connection");
                    if tx.send(stream).is_err() {
                        tracing::error!("All connection workers exited");
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                }
            }
        }

        // Closing the channel lets workers drain and exit
        drop(tx);
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("Connection worker panicked");
            }
        }

        tracing::info!("Server stopped");
        Ok(())
    }

    fn spawn_worker(&self, id: usize, rx: Receiver<TcpStream>) -> Result<JoinHandle<()>> {
        let store = Arc::clone(&self.store);
        let read_timeout_ms = self.config.read_timeout_ms;
        let write_timeout_ms = self.config.write_timeout_ms;

        let handle = thread::Builder::new()
            .name(format!("logkv-conn-{}", id))
            .spawn(move || {
                for stream in rx.iter() {
                    let result = Connection::new(stream, Arc::clone(&store)).and_then(|mut conn| {
                        conn.set_timeouts(read_timeout_ms, write_timeout_ms)?;
                        conn.handle()
                    });
                    if let Err(e) = result {
                        tracing::debug!(worker = id, error = %e, "Connection ended with error");
                    }
                }
            })?;

        Ok(handle)
    }
}
