//! TCP listener that hands each accepted connection to its own worker.
//!
//! One OS thread per connection; workers share nothing but their
//! (cloned) settings.

use crate::config::Config;
use crate::error::WorkerResult;
use crate::protocols::vector::BatchSummary;
use crate::worker::{Worker, WorkerSettings};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use tracing::{debug, error, info, warn};

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    listen: String,
    settings: WorkerSettings,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: &Config) -> Self {
        Server {
            listen: config.listen.clone(),
            settings: config.worker_settings(),
        }
    }

    /// Bind the configured address and serve until accepting fails fatally.
    pub fn run(&self) -> io::Result<()> {
        let addr = self
            .listen
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address to bind"))?;
        let listener = create_listener(addr)?;
        info!(address = %listener.local_addr()?, "Server listening");
        self.serve(listener)
    }

    /// Accept connections from `listener` forever.
    pub fn serve(&self, listener: TcpListener) -> io::Result<()> {
        let mut next_id: u64 = 0;
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let id = next_id;
                    next_id += 1;
                    debug!(peer = %peer, session = id, "New connection");

                    let settings = self.settings.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("session-{id}"))
                        .spawn(move || match handle_connection(stream, settings) {
                            Ok(summary) => info!(
                                peer = %peer,
                                session = id,
                                vectors = summary.vectors,
                                saturated = summary.saturated,
                                "Session complete"
                            ),
                            Err(e) => {
                                warn!(peer = %peer, session = id, error = %e, "Session failed")
                            }
                        });
                    if let Err(e) = spawned {
                        error!(peer = %peer, error = %e, "Failed to spawn session thread");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Run one worker session on a freshly accepted connection.
fn handle_connection(
    mut stream: TcpStream,
    settings: WorkerSettings,
) -> WorkerResult<BatchSummary> {
    let mut worker = Worker::new(settings);
    let result = worker.run(&mut stream);
    let _ = stream.shutdown(Shutdown::Both);
    result
}

/// Create a blocking TCP listener with SO_REUSEADDR.
pub fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
