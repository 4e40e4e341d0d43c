//! TCP transport: accepts connections and runs one reader and one writer task
//! per client.
//!
//! Frames are newline terminated lines. The reader hands each line to the
//! [`Dispatcher`] and delivers whatever it produced; the writer drains the
//! connection's outbox onto the socket. Neither holds a lock across `.await`.

use crate::dispatch::Dispatcher;
use crate::registry::ConnectionId;
use crate::state::ServerState;
use log::{debug, error, info, warn};
use shared::{encode, Packet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Longest accepted line, newline included.
pub const MAX_FRAME_LEN: u64 = 4096;

pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher,
    idle_timeout: Option<Duration>,
}

impl Server {
    /// Binds the address from the state's config. Port 0 picks a free port.
    pub async fn bind(state: Arc<ServerState>) -> io::Result<Self> {
        let listener = TcpListener::bind(state.config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            idle_timeout: state.config.idle_timeout(),
            dispatcher: Dispatcher::new(state),
            listener,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &Arc<ServerState> {
        self.dispatcher.state()
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                warn!("Could not disable Nagle for {}: {}", addr, e);
            }

            let dispatcher = self.dispatcher.clone();
            let idle_timeout = self.idle_timeout;
            tokio::spawn(async move {
                serve_connection(dispatcher, stream, addr, idle_timeout).await;
            });
        }
    }
}

async fn serve_connection(
    dispatcher: Dispatcher,
    stream: TcpStream,
    addr: SocketAddr,
    idle_timeout: Option<Duration>,
) {
    let (reader, writer) = stream.into_split();
    let (outbox, queue) = mpsc::unbounded_channel();
    let conn = dispatcher.state().registry.register(addr, outbox);
    info!("Connection {} accepted from {}", conn, addr);

    tokio::spawn(write_frames(writer, queue, addr));

    read_frames(&dispatcher, conn, reader, addr, idle_timeout).await;

    // Dropping the registry entry closes the outbox, which ends the writer
    // once it has flushed what is already queued.
    let out = dispatcher.handle_disconnect(conn);
    dispatcher.deliver(conn, out);
}

async fn read_frames(
    dispatcher: &Dispatcher,
    conn: ConnectionId,
    reader: OwnedReadHalf,
    addr: SocketAddr,
    idle_timeout: Option<Duration>,
) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_FRAME_LEN);
        let read = limited.read_until(b'\n', &mut line);

        let result = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => {
                    info!("Connection {} from {} timed out", conn, addr);
                    return;
                }
            },
            None => read.await,
        };

        match result {
            Ok(0) => {
                debug!("Connection {} from {} closed by peer", conn, addr);
                return;
            }
            Ok(n) => {
                if n as u64 >= MAX_FRAME_LEN && line.last() != Some(&b'\n') {
                    warn!("Connection {} sent a frame over {} bytes", conn, MAX_FRAME_LEN);
                    return;
                }

                let out = dispatcher.handle_frame(conn, &line);
                dispatcher.deliver(conn, out);
                if dispatcher.is_closed(conn) {
                    return;
                }
            }
            Err(e) => {
                warn!("Error reading from {}: {}", addr, e);
                return;
            }
        }
    }
}

async fn write_frames(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Packet>,
    addr: SocketAddr,
) {
    while let Some(packet) = queue.recv().await {
        let mut frame = match encode(&packet) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Dropping unencodable packet for {}: {}", addr, e);
                continue;
            }
        };
        frame.push(b'\n');

        if let Err(e) = writer.write_all(&frame).await {
            warn!("Failed to send to {}: {}", addr, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use tokio_test::assert_ok;

    async fn start(config: ServerConfig) -> SocketAddr {
        let server = Server::bind(Arc::new(ServerState::new(ServerConfig {
            port: 0,
            ..config
        })))
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    #[tokio::test]
    async fn test_login_over_socket() {
        let addr = start(ServerConfig::default()).await;
        let stream = assert_ok!(TcpStream::connect(addr).await);
        let (reader, mut writer) = stream.into_split();

        assert_ok!(writer.write_all("PLOGIAlice\n".as_bytes()).await);

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        assert_ok!(reader.read_line(&mut line).await);
        assert_eq!(line, "PLOGS1\n");
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let addr = start(ServerConfig::default()).await;
        let mut stream = assert_ok!(TcpStream::connect(addr).await);

        let frame = vec![b'a'; MAX_FRAME_LEN as usize + 100];
        assert_ok!(stream.write_all(&frame).await);

        // Unread bytes left behind may turn the close into a reset.
        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf)).await;
        assert!(read.is_ok(), "connection left open");
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_idle_connection_is_dropped() {
        let addr = start(ServerConfig {
            idle_timeout_secs: 1,
            ..ServerConfig::default()
        })
        .await;
        let mut stream = assert_ok!(TcpStream::connect(addr).await);

        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(3), stream.read_to_end(&mut buf)).await;
        assert!(matches!(read, Ok(Ok(0))));
    }
}
