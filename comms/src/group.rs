//! Group rendezvous: the coordinator accepts one connection per worker rank,
//! the workers join and wait until the whole group is present.

use std::{io, time::Duration};

#[cfg(unix)]
use std::path::PathBuf;

use log::{debug, info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    time::{self, Instant},
};

use crate::{
    BoxedRead, BoxedWrite, OnoReceiver, OnoSender, Work,
    msg::{Command, Msg, Payload},
    specs::worker::Backend,
};

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// One established connection to another member of the group.
pub struct Peer {
    rank: usize,
    rx: OnoReceiver<BoxedRead>,
    tx: OnoSender<BoxedWrite>,
}

impl Peer {
    /// The rank of the member on the other end.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Splits the connection into its receiving and sending halves.
    pub fn into_parts(self) -> (OnoReceiver<BoxedRead>, OnoSender<BoxedWrite>) {
        (self.rx, self.tx)
    }
}

/// The coordinator's side of an established group, peers ordered by rank.
pub struct ProcessGroup {
    peers: Vec<Peer>,
    _listener: GroupListener,
}

impl ProcessGroup {
    /// Number of members, the coordinator included.
    pub fn world_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Issues one parameter send per worker.
    ///
    /// # Arguments
    /// * `params` - The flattened policy parameters.
    ///
    /// # Returns
    /// One completion handle per worker, in rank order.
    pub fn isend_params<'a>(&'a mut self, params: &'a [f32]) -> Vec<Work<'a>> {
        self.peers
            .iter_mut()
            .map(|peer| {
                let rank = peer.rank;
                Work::new(rank, async move {
                    let msg = Msg::Data(Payload::Params(params));
                    peer.tx.send(&msg).await
                })
            })
            .collect()
    }

    /// Issues one batch receive per worker, every field landing straight in
    /// the given destination slices.
    ///
    /// # Arguments
    /// * `slices` - For every worker in rank order, one destination per field.
    ///
    /// # Returns
    /// One completion handle per worker, in rank order.
    pub fn irecv_fields<'a>(&'a mut self, slices: Vec<Vec<&'a mut [f32]>>) -> Vec<Work<'a>> {
        self.peers
            .iter_mut()
            .zip(slices)
            .map(|(peer, fields)| {
                let rank = peer.rank;
                Work::new(rank, async move {
                    for dst in fields {
                        peer.rx.recv_field_into(dst).await?;
                    }

                    Ok(())
                })
            })
            .collect()
    }

    /// Tells every worker to stop and closes the sending halves, best effort.
    pub async fn stop(&mut self) {
        let msg = Msg::Control(Command::Stop);

        for peer in &mut self.peers {
            if let Err(e) = peer.tx.send(&msg).await {
                debug!(rank = peer.rank; "could not deliver stop: {e}");
                continue;
            }

            if let Err(e) = peer.tx.close().await {
                debug!(rank = peer.rank; "could not close the connection: {e}");
            }
        }
    }
}

/// The listening socket the coordinator rendezvous on.
pub enum GroupListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixSocket),
}

#[cfg(unix)]
pub struct UnixSocket {
    listener: tokio::net::UnixListener,
    path: PathBuf,
}

#[cfg(unix)]
impl Drop for UnixSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Removes a socket left behind at `path`, anything else there is an error.
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) -> io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

impl GroupListener {
    /// Binds a new listener.
    ///
    /// # Arguments
    /// * `backend` - The transport to listen on.
    /// * `addr` - A `host:port` for tcp, a filesystem path for unix sockets.
    pub async fn bind(backend: Backend, addr: &str) -> io::Result<Self> {
        match backend {
            Backend::Tcp => Ok(Self::Tcp(TcpListener::bind(addr).await?)),
            #[cfg(unix)]
            Backend::Unix => {
                let path = PathBuf::from(addr);
                remove_stale_socket(&path)?;

                let listener = tokio::net::UnixListener::bind(&path)?;
                Ok(Self::Unix(UnixSocket { listener, path }))
            }
            #[cfg(not(unix))]
            Backend::Unix => Err(unix_unsupported()),
        }
    }

    /// The address workers should connect to.
    pub fn local_addr(&self) -> io::Result<String> {
        match self {
            Self::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            #[cfg(unix)]
            Self::Unix(socket) => Ok(socket.path.display().to_string()),
        }
    }

    async fn accept(&self) -> io::Result<(BoxedRead, BoxedWrite)> {
        match self {
            Self::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                debug!("accepted connection from {addr}");
                stream.set_nodelay(true)?;
                let (rx, tx) = stream.into_split();
                Ok((Box::new(rx), Box::new(tx)))
            }
            #[cfg(unix)]
            Self::Unix(socket) => {
                let (stream, _) = socket.listener.accept().await?;
                let (rx, tx) = stream.into_split();
                Ok((Box::new(rx), Box::new(tx)))
            }
        }
    }

    /// Waits for every worker rank to join, then starts the group.
    ///
    /// # Arguments
    /// * `world_size` - Number of members, the coordinator included.
    /// * `timeout` - Upper bound for the whole rendezvous.
    ///
    /// # Returns
    /// The established group, or an io error if a rank was invalid or the
    /// timeout expired.
    pub async fn accept_all(self, world_size: usize, timeout: Duration) -> io::Result<ProcessGroup> {
        let addr = self.local_addr()?;
        let mut slots: Vec<Option<Peer>> = (1..world_size).map(|_| None).collect();

        if time::timeout(timeout, self.fill(&mut slots)).await.is_err() {
            let joined = slots.iter().flatten().count();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!(
                    "rendezvous on {addr} timed out after {timeout:?}, {joined} of {} workers joined",
                    slots.len()
                ),
            ));
        }

        let mut peers: Vec<Peer> = slots.into_iter().flatten().collect();
        let start = Msg::Control(Command::Start { world_size });

        for peer in &mut peers {
            peer.tx.send(&start).await?;
        }

        info!(world_size = world_size; "process group started on {addr}");
        Ok(ProcessGroup {
            peers,
            _listener: self,
        })
    }

    async fn fill(&self, slots: &mut [Option<Peer>]) -> io::Result<()> {
        let mut buf: Vec<u32> = Vec::new();

        while slots.iter().any(Option::is_none) {
            let (rx, tx) = self.accept().await?;
            let (mut rx, tx) = crate::channel(rx, tx);

            let rank = match rx.recv_into(&mut buf).await {
                Ok(Msg::Control(Command::Join { rank })) => rank,
                Ok(msg) => {
                    warn!("expected a join message, got {}", msg.kind());
                    continue;
                }
                Err(e) => {
                    warn!("dropping a connection that failed to join: {e}");
                    continue;
                }
            };

            let Some(slot) = rank.checked_sub(1).and_then(|i| slots.get_mut(i)) else {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("rank {rank} is outside of a group of {}", slots.len() + 1),
                ));
            };

            if slot.is_some() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("rank {rank} joined twice"),
                ));
            }

            debug!(rank = rank; "worker joined");
            *slot = Some(Peer { rank, rx, tx });
        }

        Ok(())
    }
}

/// Joins the group at `addr` as `rank`, retrying the connection until `timeout`.
///
/// # Returns
/// The connection to the coordinator and the group's size.
pub async fn join(
    backend: Backend,
    addr: &str,
    rank: usize,
    timeout: Duration,
) -> io::Result<(Peer, usize)> {
    let deadline = Instant::now() + timeout;

    time::timeout_at(deadline, handshake(backend, addr, rank))
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("could not join the group at {addr} within {timeout:?}"),
            )
        })?
}

async fn handshake(backend: Backend, addr: &str, rank: usize) -> io::Result<(Peer, usize)> {
    let (rx, tx) = loop {
        match connect(backend, addr).await {
            Ok(halves) => break halves,
            Err(e) => {
                debug!(rank = rank; "coordinator not reachable yet: {e}");
                time::sleep(RETRY_DELAY).await;
            }
        }
    };

    let (mut rx, mut tx) = crate::channel(rx, tx);
    tx.send(&Msg::Control(Command::Join { rank })).await?;

    let mut buf: Vec<u32> = Vec::new();
    match rx.recv_into(&mut buf).await? {
        Msg::Control(Command::Start { world_size }) => Ok((Peer { rank: 0, rx, tx }, world_size)),
        Msg::Err(text) => Err(io::Error::other(format!("peer reported: {text}"))),
        msg => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected a start message, got {}", msg.kind()),
        )),
    }
}

async fn connect(backend: Backend, addr: &str) -> io::Result<(BoxedRead, BoxedWrite)> {
    match backend {
        Backend::Tcp => {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            let (rx, tx) = stream.into_split();
            Ok((Box::new(rx), Box::new(tx)))
        }
        #[cfg(unix)]
        Backend::Unix => {
            let stream = tokio::net::UnixStream::connect(addr).await?;
            let (rx, tx) = stream.into_split();
            Ok((Box::new(rx), Box::new(tx)))
        }
        #[cfg(not(unix))]
        Backend::Unix => Err(unix_unsupported()),
    }
}

#[cfg(not(unix))]
fn unix_unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets are not available on this platform",
    )
}
