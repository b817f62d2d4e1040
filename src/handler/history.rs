use super::ActionKind;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Bounded record of the actions processed since the last open request.
pub(crate) struct MessageHistory {
    entries: VecDeque<(DateTime<Utc>, ActionKind)>,
    capacity: usize,
}

impl MessageHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn record(&mut self, kind: ActionKind) {
        if kind.is_open() {
            self.entries.clear();
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((Utc::now(), kind));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Diagnostic string handed to open-failure callbacks.
    pub(crate) fn describe(&self, camera_index: usize) -> String {
        let actions: Vec<String> = self
            .entries
            .iter()
            .map(|(at, kind)| format!("{} {}", at.format("%H:%M:%S%.3f"), kind))
            .collect();
        format!("camera {} history: [{}]", camera_index, actions.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_bounded() {
        let mut history = MessageHistory::new(2);
        history.record(ActionKind::ApplySettings);
        history.record(ActionKind::StartPreview);
        history.record(ActionKind::AutoFocus);

        assert_eq!(history.len(), 2);
        let text = history.describe(0);
        assert!(!text.contains("apply_settings"));
        assert!(text.contains("start_preview"));
        assert!(text.contains("auto_focus"));
    }

    #[test]
    fn test_open_resets_history() {
        let mut history = MessageHistory::new(10);
        history.record(ActionKind::Release);
        history.record(ActionKind::OpenCamera);

        assert_eq!(history.len(), 1);
        assert!(history.describe(3).starts_with("camera 3 history: ["));
        assert!(history.describe(3).contains("open_camera"));
    }
}
