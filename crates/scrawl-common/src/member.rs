use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed palette cursors and rosters draw from. Assignment cycles by
/// connection order, so two members of a busy room may share a color.
pub const COLOR_PALETTE: [&str; 6] = [
    "#292524", "#EA580C", "#8B5CF6", "#16A34A", "#DC2626", "#2563EB",
];

pub fn color_for(seq: usize) -> &'static str {
    COLOR_PALETTE[seq % COLOR_PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub id: Uuid,
    pub user_name: String,
    pub color: String,
}
