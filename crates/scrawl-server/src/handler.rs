use uuid::Uuid;

use scrawl_common::protocol::{ClientEvent, ServerEvent};

use crate::room::{JoinRequest, RoomSession};
use crate::server::SharedState;

pub async fn handle_event(
    conn_id: Uuid,
    event: ClientEvent,
    state: &SharedState,
) -> anyhow::Result<()> {
    match event {
        // Only valid during the handshake; ignore afterwards.
        ClientEvent::Hello { .. } => {}

        ClientEvent::JoinRoom {
            room_code,
            mode,
            is_host,
        } => {
            // joining a new room implies leaving the current one
            handle_leave_room(conn_id, state).await;

            let request = {
                let conns = state.connections.read().await;
                let Some(conn) = conns.get(&conn_id) else {
                    return Ok(());
                };
                JoinRequest {
                    id: conn.id,
                    user_name: conn.user_name.clone(),
                    color: conn.color.clone(),
                    is_host,
                    tx: conn.tx.clone(),
                }
            };

            // A concurrently emptied room can retire between lookup and
            // join; retry against a fresh session.
            loop {
                let room = state.directory.get_or_create(&room_code, mode).await;
                if room.join(request.clone()).await {
                    break;
                }
            }

            let mut conns = state.connections.write().await;
            if let Some(conn) = conns.get_mut(&conn_id) {
                conn.room_code = Some(room_code);
            }
        }

        ClientEvent::LeaveRoom => handle_leave_room(conn_id, state).await,

        ClientEvent::Draw(segment) => {
            if let Some(room) = current_room(conn_id, state).await {
                room.relay_draw(conn_id, segment).await;
            }
        }

        ClientEvent::CanvasStateUpdate { snapshot } => {
            if let Some(room) = current_room(conn_id, state).await {
                room.update_snapshot(conn_id, snapshot).await;
            }
        }

        ClientEvent::ClearCanvas => {
            if let Some(room) = current_room(conn_id, state).await {
                room.clear_canvas(conn_id).await;
            }
        }

        ClientEvent::Undo { snapshot } => {
            if let Some(room) = current_room(conn_id, state).await {
                room.apply_undo(conn_id, snapshot).await;
            }
        }

        ClientEvent::CursorMove { x, y } => {
            if let Some(room) = current_room(conn_id, state).await {
                room.relay_cursor(conn_id, x, y).await;
            }
        }

        ClientEvent::CursorLeave => {
            if let Some(room) = current_room(conn_id, state).await {
                room.cursor_leave(conn_id).await;
            }
        }

        ClientEvent::SetLock { locked } => {
            if let Some(room) = current_room(conn_id, state).await {
                room.set_lock(conn_id, locked).await;
            }
        }

        ClientEvent::Chat { message } => {
            if let Some(room) = current_room(conn_id, state).await {
                room.chat(conn_id, message).await;
            }
        }

        ClientEvent::StartGame => {
            if let Some(room) = current_room(conn_id, state).await {
                room.start_game(conn_id).await;
            }
        }

        ClientEvent::EndGame => {
            if let Some(room) = current_room(conn_id, state).await {
                room.end_game(conn_id).await;
            }
        }

        ClientEvent::Ping => {
            send_to_conn(conn_id, ServerEvent::Pong, state).await;
        }

        ClientEvent::Disconnect => {
            handle_disconnect(conn_id, state).await;
        }
    }

    Ok(())
}

async fn send_to_conn(conn_id: Uuid, event: ServerEvent, state: &SharedState) {
    let conns = state.connections.read().await;
    if let Some(conn) = conns.get(&conn_id) {
        if conn.tx.try_send(event).is_err() {
            tracing::debug!("dropping event for '{}'", conn.user_name);
        }
    }
}

async fn current_room(conn_id: Uuid, state: &SharedState) -> Option<RoomSession> {
    let code = {
        let conns = state.connections.read().await;
        conns.get(&conn_id)?.room_code.clone()?
    };
    state.directory.get(&code).await
}

async fn handle_leave_room(conn_id: Uuid, state: &SharedState) {
    let code = {
        let mut conns = state.connections.write().await;
        match conns.get_mut(&conn_id) {
            Some(conn) => conn.room_code.take(),
            None => None,
        }
    };
    let Some(code) = code else { return };

    if let Some(room) = state.directory.get(&code).await {
        if room.leave(conn_id).await {
            state.directory.remove_if_empty(&code).await;
        }
    }
}

pub async fn handle_disconnect(conn_id: Uuid, state: &SharedState) {
    handle_leave_room(conn_id, state).await;
    state.connections.write().await.remove(&conn_id);
}
