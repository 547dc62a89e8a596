use pulse_core::{SupervisorEvent, Workspace};
use tokio::sync::broadcast;

/// Fans supervisor events out to any number of observers.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and a subscriber that falls more than `capacity` events behind
/// gets `RecvError::Lagged` and skips ahead.
#[derive(Clone)]
pub struct OutputBroadcaster {
    tx: broadcast::Sender<SupervisorEvent>,
}

impl OutputBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish(&self, event: SupervisorEvent) {
        tracing::trace!(
            event = event.event_name(),
            workspace_id = event.workspace_id(),
            "publish"
        );
        let _ = self.tx.send(event);
    }

    pub fn workspace_updated(&self, workspace: Workspace) {
        self.publish(SupervisorEvent::WorkspaceUpdated { workspace });
    }

    pub fn workspace_removed(&self, workspace_id: &str) {
        self.publish(SupervisorEvent::WorkspaceRemoved {
            workspace_id: workspace_id.to_string(),
        });
    }

    pub fn terminal_output(&self, workspace_id: &str, text: impl Into<String>, is_error: bool) {
        self.publish(SupervisorEvent::TerminalOutput {
            workspace_id: workspace_id.to_string(),
            text: text.into(),
            is_error,
        });
    }

    pub fn session_launched(&self, workspace_id: &str, pid: Option<u32>) {
        self.publish(SupervisorEvent::SessionLaunched {
            workspace_id: workspace_id.to_string(),
            pid,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_observers_is_fine() {
        let b = OutputBroadcaster::new(4);
        b.terminal_output("ws_1", "nobody listening", false);
        assert_eq!(b.observer_count(), 0);
    }

    #[tokio::test]
    async fn every_observer_sees_events_in_order() {
        let b = OutputBroadcaster::new(16);
        let mut rx1 = b.subscribe();
        let mut rx2 = b.subscribe();
        b.terminal_output("ws_1", "one", false);
        b.terminal_output("ws_1", "two", true);

        for rx in [&mut rx1, &mut rx2] {
            let texts: Vec<(String, bool)> = (0..2)
                .map(|_| match rx.try_recv().unwrap() {
                    SupervisorEvent::TerminalOutput { text, is_error, .. } => (text, is_error),
                    other => panic!("unexpected {other:?}"),
                })
                .collect();
            assert_eq!(texts, vec![("one".into(), false), ("two".into(), true)]);
        }
    }

    #[tokio::test]
    async fn lagging_observer_skips_ahead() {
        let b = OutputBroadcaster::new(2);
        let mut rx = b.subscribe();
        for i in 0..5 {
            b.terminal_output("ws_1", format!("{i}"), false);
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
        assert!(rx.try_recv().is_ok());
    }
}
