use std::sync::atomic::Ordering;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use scrawl_common::member;
use scrawl_common::protocol::{
    self, ClientEvent, ServerEvent, framed_transport, serialize_message,
};

use crate::handler;
use crate::server::SharedState;

/// Outbound buffer per connection. Relay delivery is best-effort, so a
/// client that stalls for longer than this many events starts missing
/// them rather than backing the room up.
pub const OUTBOUND_BUFFER: usize = 256;

pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_name: String,
    pub color: String,
    pub tx: mpsc::Sender<ServerEvent>,
    pub room_code: Option<String>,
}

pub async fn handle_connection(stream: TcpStream, state: SharedState) -> anyhow::Result<()> {
    let mut transport = framed_transport(stream);

    // Step 1: Handshake -- expect Hello
    let hello: ClientEvent = match protocol::recv_message(&mut transport).await? {
        Some(msg) => msg,
        None => return Ok(()),
    };

    let (id, user_name, color) = match hello {
        ClientEvent::Hello { user_name, version } => {
            tracing::info!(
                "'{}' connected (client version: {})",
                user_name,
                version
            );
            let id = Uuid::new_v4();
            let color =
                member::color_for(state.color_seq.fetch_add(1, Ordering::Relaxed)).to_string();
            protocol::send_message(
                &mut transport,
                &ServerEvent::Welcome {
                    id,
                    color: color.clone(),
                    server_version: env!("CARGO_PKG_VERSION").to_string(),
                },
            )
            .await?;
            (id, user_name, color)
        }
        _ => {
            protocol::send_message(
                &mut transport,
                &ServerEvent::HandshakeError {
                    reason: "Expected hello event".into(),
                },
            )
            .await?;
            return Ok(());
        }
    };

    // Step 2: Create mpsc channel for outbound events
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    // Register connection
    {
        let handle = ConnectionHandle {
            id,
            user_name: user_name.clone(),
            color,
            tx: tx.clone(),
            room_code: None,
        };
        state.connections.write().await.insert(id, handle);
    }

    // Step 3: Split transport for independent read/write
    let (mut sink, mut stream) = transport.split();

    // Writer task: drains rx and writes to sink
    let write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serialize_message(&event) {
                Ok(bytes) => {
                    if sink.send(bytes.into()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                }
            }
        }
    });

    // Step 4: Reader loop
    loop {
        match stream.next().await {
            Some(Ok(frame)) => {
                match protocol::deserialize_message::<ClientEvent>(&frame) {
                    Ok(event) => {
                        if let Err(e) = handler::handle_event(id, event, &state).await {
                            tracing::error!("Handler error for {}: {}", user_name, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse event from {}: {}", user_name, e);
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Read error from {}: {}", user_name, e);
                break;
            }
            None => {
                tracing::info!("'{}' disconnected", user_name);
                break;
            }
        }
    }

    // Cleanup
    handler::handle_disconnect(id, &state).await;
    write_task.abort();
    Ok(())
}
