use uuid::Uuid;

use scrawl_common::protocol::ServerEvent;

use crate::room::RoomMember;

/// Fan an event out to room members, optionally skipping the sender.
/// Delivery is best-effort: a member whose connection already dropped (or
/// whose outbound buffer is full) simply misses the event; snapshot sync
/// re-converges canvas state at the next stroke boundary.
pub fn fan_out<'a>(
    members: impl Iterator<Item = &'a RoomMember>,
    exclude: Option<Uuid>,
    event: &ServerEvent,
) {
    for member in members {
        if Some(member.info.id) == exclude {
            continue;
        }
        send_to(member, event.clone());
    }
}

pub fn send_to(member: &RoomMember, event: ServerEvent) {
    if member.tx.try_send(event).is_err() {
        tracing::debug!("dropping event for '{}'", member.info.user_name);
    }
}
