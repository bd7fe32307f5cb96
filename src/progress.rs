//! Progress roll-up for queue items.
//!
//! Tracks report raw transfer percentage. Composites (album, playlist,
//! artist) report `round(100 * completed / total)` once the catalog has told
//! us how many children there are, and hold their current value before that.
//!
//! Child accounting goes through the item's distinct child-id sets, so a
//! child that succeeds twice (after a requeue, say) is counted once. Every
//! helper here only ever raises `progress`; a run never reports a lower
//! percentage than one it already persisted.

use crate::queue::QueueItem;

/// Percentage for `completed` of `total` children, rounded half up.
///
/// Returns `None` while the total is unknown (zero).
#[must_use]
pub fn composite_percent(completed: u32, total: u32) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let completed = u64::from(completed.min(total));
    let total = u64::from(total);
    let percent = (200 * completed + total) / (2 * total);
    u8::try_from(percent).ok()
}

/// Percentage of a byte transfer.
///
/// Returns `None` when the content length is unknown. Capped at 99: an item
/// only shows 100 once it is persisted as completed.
#[must_use]
pub fn transfer_percent(received: u64, content_length: Option<u64>) -> Option<u8> {
    let total = content_length.filter(|len| *len > 0)?;
    let percent = u128::from(received.min(total)) * 100 / u128::from(total);
    u8::try_from(percent.min(99)).ok()
}

/// Raises `item.progress` to `candidate`, never lowering it.
///
/// Returns true when the value changed.
pub fn advance(item: &mut QueueItem, candidate: u8) -> bool {
    let candidate = candidate.min(100);
    if candidate > item.progress {
        item.progress = candidate;
        true
    } else {
        false
    }
}

/// Installs the resolved child list on a composite item.
///
/// Sets `total_tracks`, drops remembered children the catalog no longer
/// lists, then recomputes the roll-up.
pub fn set_children(item: &mut QueueItem, child_ids: &[String]) {
    item.total_tracks = u32::try_from(child_ids.len()).unwrap_or(u32::MAX);
    item.completed_children
        .retain(|id| child_ids.iter().any(|child| child == id));
    item.failed_children
        .retain(|id| child_ids.iter().any(|child| child == id));
    refresh(item);
}

/// Records a child success. Returns false if the child was already counted.
pub fn record_child_success(item: &mut QueueItem, child_id: &str) -> bool {
    item.failed_children.retain(|id| id != child_id);
    if item.completed_children.iter().any(|id| id == child_id) {
        return false;
    }
    item.completed_children.push(child_id.to_string());
    refresh(item);
    true
}

/// Records a terminal child failure. Returns false if already recorded.
pub fn record_child_failure(item: &mut QueueItem, child_id: &str) -> bool {
    if item.completed_children.iter().any(|id| id == child_id)
        || item.failed_children.iter().any(|id| id == child_id)
    {
        return false;
    }
    item.failed_children.push(child_id.to_string());
    true
}

/// Returns true if the child was already downloaded or failed in this run.
#[must_use]
pub fn is_child_settled(item: &QueueItem, child_id: &str) -> bool {
    item.completed_children.iter().any(|id| id == child_id)
        || item.failed_children.iter().any(|id| id == child_id)
}

/// Recomputes `completed_tracks` and raises `progress` from the child set.
pub fn refresh(item: &mut QueueItem) {
    let distinct = u32::try_from(item.completed_children.len()).unwrap_or(u32::MAX);
    item.completed_tracks = distinct.min(item.total_tracks);
    if let Some(percent) = composite_percent(item.completed_tracks, item.total_tracks) {
        advance(item, percent);
    }
}
