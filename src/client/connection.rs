use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::ring::NodeInfo;

/// One open, line-framed conversation with a storage node.
pub trait Connection: Send {
    fn peer(&self) -> &NodeInfo;

    fn send_line(&mut self, line: &str) -> impl Future<Output = io::Result<()>> + Send;

    /// Next line without its terminator, or `None` once the peer has closed the connection.
    fn read_line(&mut self) -> impl Future<Output = io::Result<Option<String>>> + Send;
}

/// Opens connections to storage nodes.
pub trait Connector: Send + Sync {
    type Conn: Connection;

    fn connect(&self, node: &NodeInfo) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, node: &NodeInfo) -> io::Result<TcpConnection> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((node.address.as_str(), node.port)),
        )
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {} timed out", node),
            )
        })??;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        Ok(TcpConnection {
            peer: node.clone(),
            reader: BufReader::new(reader),
            writer,
        })
    }
}

pub struct TcpConnection {
    peer: NodeInfo,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection for TcpConnection {
    fn peer(&self) -> &NodeInfo {
        &self.peer
    }

    async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}
