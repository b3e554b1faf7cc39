use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use super::processor::CommandProcessor;

/// First line sent on every accepted connection.
pub const GREETING: &str = "ringkv storage node ready";

/// Accepts client connections forever, one task per connection.
pub async fn serve(listener: TcpListener, processor: Arc<CommandProcessor>) -> Result<()> {
    tracing::info!(
        "Storage node {} accepting clients on {}",
        processor.node(),
        listener.local_addr()?
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        let processor = processor.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, processor).await {
                tracing::warn!("Connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    processor: Arc<CommandProcessor>,
) -> Result<()> {
    tracing::debug!("Client {} connected", peer);
    stream.set_nodelay(true)?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(format!("{}\r\n", GREETING).as_bytes()).await?;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = processor.process(&line).await;
        writer
            .write_all(format!("{}\r\n", response).as_bytes())
            .await?;
    }

    tracing::debug!("Client {} disconnected", peer);
    Ok(())
}
