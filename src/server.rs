//! TCP listener feeding client sessions into the worker pool.
//!
//! Every accepted connection becomes one [`EchoTask`] submitted to the pool
//! exactly once. The listener never rejects or throttles: connections beyond
//! the pool size wait in the task queue until a session ends.

use crate::config::Config;
use crate::pool::WorkerPool;
use crate::protocols::echo::EchoTask;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use tracing::{debug, error, info};

/// Server instance
pub struct Server {
    listener: TcpListener,
    pool: WorkerPool,
    max_line: usize,
}

impl Server {
    /// Bind the listening socket and start the worker pool.
    pub fn bind(config: &Config) -> io::Result<Self> {
        let addr = resolve(&config.listen)?;
        let listener = create_listener(addr, config.backlog)?;
        let pool = WorkerPool::new(config.workers)?;

        info!(
            address = %listener.local_addr()?,
            workers = config.workers,
            "Server listening"
        );

        Ok(Server {
            listener,
            pool,
            max_line: config.max_line_length,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The pool sessions run on.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Accept connections forever.
    pub fn run(&self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "New connection");
                    self.pool.submit(EchoTask::new(stream, peer, self.max_line));
                    debug!(
                        queued = self.pool.queued(),
                        busy = self.pool.busy(),
                        "Session submitted"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

fn resolve(listen: &str) -> io::Result<SocketAddr> {
    listen.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("listen address '{listen}' did not resolve"),
        )
    })
}

fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
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
    socket.listen(backlog)?;

    Ok(socket.into())
}
