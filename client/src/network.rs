//! TCP connection to the game server speaking the shared line codec.

use log::debug;
use shared::{decode, encode, DecodeError, EncodeError, Packet};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode packet: {0}")]
    Encode(#[from] EncodeError),

    #[error("server sent an invalid packet: {0}")]
    Decode(#[from] DecodeError),

    #[error("server closed the connection")]
    Closed,

    #[error("server rejected {tag}: {message}")]
    Rejected { tag: String, message: String },
}

/// Receiving half. Partial lines survive a cancelled [`FrameReader::recv`].
pub struct FrameReader {
    inner: BufReader<OwnedReadHalf>,
    buffer: Vec<u8>,
}

impl FrameReader {
    pub async fn recv(&mut self) -> Result<Packet, ClientError> {
        loop {
            let n = self.inner.read_until(b'\n', &mut self.buffer).await?;
            if n == 0 {
                return Err(ClientError::Closed);
            }
            if self.buffer.last() == Some(&b'\n') {
                let packet = decode(&self.buffer);
                self.buffer.clear();
                let packet = packet?;
                debug!("<- {:?}", packet);
                return Ok(packet);
            }
        }
    }
}

pub struct FrameWriter {
    inner: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        let mut frame = encode(packet)?;
        frame.push(b'\n');
        self.inner.write_all(&frame).await?;
        debug!("-> {:?}", packet);
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

pub struct Connection {
    pub reader: FrameReader,
    pub writer: FrameWriter,
}

impl Connection {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            reader: FrameReader {
                inner: BufReader::new(reader),
                buffer: Vec::new(),
            },
            writer: FrameWriter { inner: writer },
        })
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        self.writer.send(packet).await
    }

    pub async fn recv(&mut self) -> Result<Packet, ClientError> {
        self.reader.recv().await
    }

    /// Receives until `pick` accepts a packet. An ERROR for `tag` aborts.
    pub async fn wait_for<T>(
        &mut self,
        tag: &str,
        mut pick: impl FnMut(&Packet) -> Option<T>,
    ) -> Result<T, ClientError> {
        loop {
            let packet = self.recv().await?;
            if let Some(found) = pick(&packet) {
                return Ok(found);
            }
            if let Packet::Error { tag: rejected, message } = packet {
                if rejected == tag {
                    return Err(ClientError::Rejected {
                        tag: rejected,
                        message,
                    });
                }
            }
        }
    }

    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok, block_on};

    /// A connected client plus the server end of its socket.
    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (client, accepted) = tokio::join!(Connection::connect(&addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[test]
    fn test_send_writes_one_line() {
        block_on(async {
            let (mut conn, server) = pair().await;
            assert_ok!(conn.send(&Packet::Ready).await);

            let mut line = String::new();
            assert_ok!(BufReader::new(server).read_line(&mut line).await);
            assert_eq!(line, "READY\n");
        });
    }

    #[test]
    fn test_partial_frame_survives_cancelled_recv() {
        block_on(async {
            let (mut conn, mut server) = pair().await;
            server.write_all(b"PLOG").await.unwrap();

            let early = tokio::time::timeout(Duration::from_millis(50), conn.recv()).await;
            assert_err!(early);

            server.write_all(b"S7\n").await.unwrap();
            assert_eq!(
                conn.recv().await.unwrap(),
                Packet::LoginSuccessful { player_id: 7 }
            );
        });
    }

    #[test]
    fn test_wait_for_stops_at_matching_error() {
        block_on(async {
            let (mut conn, mut server) = pair().await;
            let mut frames = Vec::new();
            for packet in [
                Packet::Error {
                    tag: "READY".to_string(),
                    message: "Not in a lobby".to_string(),
                },
                Packet::Error {
                    tag: "LOBJO".to_string(),
                    message: "Lobby 'Deep' not found".to_string(),
                },
            ] {
                frames.extend(encode(&packet).unwrap());
                frames.push(b'\n');
            }
            server.write_all(&frames).await.unwrap();

            let result = conn
                .wait_for("LOBJO", |p| {
                    matches!(p, Packet::JoinLobbyStatus { .. }).then_some(())
                })
                .await;
            match result {
                Err(ClientError::Rejected { tag, message }) => {
                    assert_eq!(tag, "LOBJO");
                    assert!(message.contains("Deep"));
                }
                other => panic!("unexpected {:?}", other),
            }
        });
    }

    #[test]
    fn test_recv_reports_closed_connection() {
        block_on(async {
            let (mut conn, server) = pair().await;
            drop(server);
            assert!(matches!(conn.recv().await, Err(ClientError::Closed)));
        });
    }
}
