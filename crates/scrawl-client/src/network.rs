use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use scrawl_common::protocol::{
    ClientEvent, ServerEvent, framed_transport, serialize_message, deserialize_message,
};

/// Connect to the server and return channels for bidirectional communication.
pub async fn connect(
    addr: &str,
) -> anyhow::Result<(mpsc::Sender<ClientEvent>, mpsc::Receiver<ServerEvent>)> {
    let stream = TcpStream::connect(addr).await?;
    let transport = framed_transport(stream);
    let (mut sink, mut stream) = transport.split();

    let (client_tx, mut client_rx) = mpsc::channel::<ClientEvent>(64);
    let (server_tx, server_rx) = mpsc::channel::<ServerEvent>(64);

    // Writer task: client_rx -> TCP sink
    tokio::spawn(async move {
        while let Some(event) = client_rx.recv().await {
            match serialize_message(&event) {
                Ok(bytes) => {
                    if sink.send(bytes.into()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize client event: {}", e);
                }
            }
        }
    });

    // Reader task: TCP stream -> server_tx
    tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            match deserialize_message::<ServerEvent>(&frame) {
                Ok(event) => {
                    if server_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse server event: {}", e);
                }
            }
        }
    });

    Ok((client_tx, server_rx))
}
