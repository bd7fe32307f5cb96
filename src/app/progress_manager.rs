//! Progress UI (one bar per active item) driven by queue snapshots.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use mediafetch_core::{ItemListener, QueueItem, QueueStatus};

const BAR_TEMPLATE: &str = "{prefix:>12.bold} [{bar:30}] {pos:>3}% {msg}";

/// Renders item snapshots as indicatif bars.
///
/// Runs on the notification bridge's task; indicatif handles its own
/// terminal synchronization.
pub(crate) struct ProgressRenderer {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressRenderer {
    pub(crate) fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub(crate) fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bar_for(&self, bars: &mut HashMap<String, ProgressBar>, item: &QueueItem) -> ProgressBar {
        bars.entry(item.id.clone())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(
                    ProgressStyle::with_template(BAR_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar.set_prefix(item.kind.to_string());
                bar
            })
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn active_bars(&self) -> usize {
        self.bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ItemListener for ProgressRenderer {
    fn on_item_changed(&self, item: &QueueItem) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        if item.status != QueueStatus::Downloading && !bars.contains_key(&item.id) {
            return;
        }

        let bar = self.bar_for(&mut bars, item);
        bar.set_position(u64::from(item.progress));
        bar.set_message(describe(item));

        if item.status != QueueStatus::Downloading {
            bar.finish_with_message(describe(item));
            bars.remove(&item.id);
        }
    }
}

/// One-line label for an item, shared with the `list` output.
pub(crate) fn describe(item: &QueueItem) -> String {
    let name = match (item.artist.is_empty(), item.title.is_empty()) {
        (_, true) => item.id.clone(),
        (true, false) => item.title.clone(),
        (false, false) => format!("{} - {}", item.artist, item.title),
    };
    let tracks = if item.total_tracks > 0 {
        format!(" ({}/{} tracks)", item.completed_tracks, item.total_tracks)
    } else {
        String::new()
    };
    let state = match item.status {
        QueueStatus::Completed if item.is_partial_success() => "completed (partial)".to_string(),
        QueueStatus::Failed => match item.error_message.as_deref().and_then(|m| m.lines().next())
        {
            Some(reason) => format!("failed: {reason}"),
            None => "failed".to_string(),
        },
        QueueStatus::Downloading => match item.stop_request {
            Some(request) => format!("downloading ({request} requested)"),
            None => "downloading".to_string(),
        },
        status => status.to_string(),
    };
    format!("{name}{tracks} {state}")
}
