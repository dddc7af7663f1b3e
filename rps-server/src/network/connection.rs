//! Client Connection
//!
//! Framed reads and fully-flushed writes over one TCP stream.
//! The read buffer lives on the connection, so bytes that arrive after a
//! terminator are kept for the next read and a cancelled read loses nothing.

use std::io;
use std::mem::MaybeUninit;
use std::net::SocketAddr;

use socket2::SockRef;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::network::protocol::{
    scan_frame, ClientMessage, FrameError, ProtocolError, ServerMessage, MAX_MESSAGE_LEN,
};

/// Failure to obtain one decoded message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Stream closed, failed, or overflowed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Framed fine but did not parse.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// One end of a client connection.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    buffer: Vec<u8>,
    max_len: usize,
}

impl Connection {
    /// Wrap an accepted stream, capping messages at `max_len` bytes.
    pub fn new(stream: TcpStream, max_len: usize) -> io::Result<Self> {
        let peer_addr = stream.peer_addr()?;
        Ok(Self {
            stream,
            peer_addr,
            buffer: Vec::with_capacity(max_len),
            max_len,
        })
    }

    /// Open a client-side connection with the default message cap.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream, MAX_MESSAGE_LEN)
    }

    /// Remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read one raw message, delimiters included.
    ///
    /// Cancel safe: partial input stays buffered on the connection.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, FrameError> {
        loop {
            if let Some(len) = scan_frame(&self.buffer, self.max_len)? {
                return Ok(self.buffer.drain(..len).collect());
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(FrameError::Closed);
            }
        }
    }

    /// Read and decode one client message.
    pub async fn read_client_message(&mut self) -> Result<ClientMessage, MessageError> {
        let frame = self.read_frame().await?;
        Ok(ClientMessage::decode(&frame)?)
    }

    /// Read and decode one server message.
    pub async fn read_server_message(&mut self) -> Result<ServerMessage, MessageError> {
        let frame = self.read_frame().await?;
        Ok(ServerMessage::decode(&frame)?)
    }

    /// Write `wire` completely or fail.
    pub async fn send(&mut self, wire: &str) -> io::Result<()> {
        self.stream.write_all(wire.as_bytes()).await?;
        self.stream.flush().await
    }

    /// Non-blocking check for a peer that has hung up.
    ///
    /// Peeks one byte without waiting: end-of-stream or a hard socket error
    /// means the peer is gone; pending data or nothing-yet means alive.
    pub fn peer_closed(&self) -> bool {
        let mut probe = [MaybeUninit::<u8>::uninit(); 1];
        match SockRef::from(&self.stream).peek(&mut probe) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => !matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
        }
    }

    /// Close the connection. Irreversible.
    pub fn close(self) {
        drop(self);
    }
}

/// Connected (server side, client side) pair over loopback.
#[cfg(test)]
pub(crate) async fn loopback_pair() -> (Connection, Connection) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(Connection::connect(addr), listener.accept());
    let (stream, _) = accepted.unwrap();
    (Connection::new(stream, MAX_MESSAGE_LEN).unwrap(), client.unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::game::rules::Move;

    #[tokio::test]
    async fn test_message_split_across_writes() {
        let (mut server, mut client) = loopback_pair().await;

        client.send("M|RO").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.send("CK||").await.unwrap();

        let msg = server.read_client_message().await.unwrap();
        assert_eq!(msg, ClientMessage::Move(Move::Rock));
    }

    #[tokio::test]
    async fn test_back_to_back_messages() {
        let (mut server, mut client) = loopback_pair().await;

        client.send("M|PAPER||C").await.unwrap();

        assert_eq!(server.read_frame().await.unwrap(), b"M|PAPER||".to_vec());
        assert_eq!(server.read_frame().await.unwrap(), b"C".to_vec());
    }

    #[tokio::test]
    async fn test_read_after_close() {
        let (mut server, client) = loopback_pair().await;
        client.close();

        assert!(matches!(server.read_frame().await, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_overflow() {
        let (server, mut client) = loopback_pair().await;
        let mut server = Connection { max_len: 16, ..server };

        client.send(&"x".repeat(32)).await.unwrap();

        assert!(matches!(
            server.read_frame().await,
            Err(FrameError::Overflow { cap: 16 })
        ));
    }

    #[tokio::test]
    async fn test_peer_closed_probe() {
        let (server, mut client) = loopback_pair().await;
        assert!(!server.peer_closed());

        // Pending data is not a hang-up.
        client.send("M|ROCK||").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!server.peer_closed());

        let (server, client) = loopback_pair().await;
        client.close();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.peer_closed());
    }

    #[tokio::test]
    async fn test_server_message_exchange() {
        let (mut server, mut client) = loopback_pair().await;

        let msg = ServerMessage::Begin { opponent: "alice".to_string() };
        server.send(&msg.encode()).await.unwrap();

        assert_eq!(client.read_server_message().await.unwrap(), msg);
    }
}
