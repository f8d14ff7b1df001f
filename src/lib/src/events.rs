//! C11 — event/statistics bus: fan-out notifications for things that
//! happen after a push lands, so consumers (quota recompute, activity
//! feeds, stats collectors) don't have to be woven into the push path
//! itself (spec.md §4.11).

use tokio::sync::broadcast;

use crate::model::RepoId;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum Event {
    /// A push landed; the repo's stored usage should be recomputed.
    QuotaRecompute { repo_id: RepoId },
    /// A push landed on `repo_id`; any virtual repos derived from it should
    /// have their cached derived state refreshed against the new head.
    VirtualRepoCleanup { repo_id: RepoId },
    /// A commit was created on a branch, for activity feeds.
    CommitCreated {
        repo_id: RepoId,
        commit_id: crate::model::ObjectId,
        creator_name: String,
    },
    /// Bytes moved through the block store, for throughput stats.
    BytesTransferred { repo_id: RepoId, bytes: u64, upload: bool },
}

/// Thin wrapper around a `tokio::sync::broadcast` channel. Publishers call
/// `emit`; each subscriber gets its own `Receiver` and sees every event
/// published after it subscribed.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of live subscribers it reached;
    /// `0` subscribers is not an error, it just means nobody's listening.
    pub fn emit(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let repo = RepoId::new_v4();
        bus.emit(Event::QuotaRecompute { repo_id: repo.clone() });

        match rx.recv().await.unwrap() {
            Event::QuotaRecompute { repo_id } => assert_eq!(repo_id, repo),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_the_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(Event::BytesTransferred {
            repo_id: RepoId::new_v4(),
            bytes: 42,
            upload: true,
        });
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        assert_eq!(bus.emit(Event::QuotaRecompute { repo_id: RepoId::new_v4() }), 0);
    }
}
