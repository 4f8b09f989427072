//! Event coalescing engine.
//!
//! A single background task drains the status-change queue in windows.
//! A window opens on its first event and closes when either
//!
//! - no event has arrived for `min_quiescent_time`, or
//! - `max_coalesce_time` has passed since the first event,
//!
//! whichever comes first. Only each member's status before its first
//! event and after its last event in the window matter: members that end
//! where they started are dropped as flaps, the rest are grouped by final
//! status and handed to the [`Delegate`] as one batch per group.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::delegate::Delegate;
use crate::types::{Member, MemberStatus, StatusChange};

/// Members grouped by their net status change over one window.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batches {
    pub joined: Vec<Member>,
    pub left: Vec<Member>,
    pub failed: Vec<Member>,
    pub partitioned: Vec<Member>,
}

impl Batches {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
            && self.left.is_empty()
            && self.failed.is_empty()
            && self.partitioned.is_empty()
    }

    /// Invoke the delegate once per non-empty group.
    pub fn dispatch(self, delegate: &mut dyn Delegate) {
        if !self.joined.is_empty() {
            delegate.members_joined(self.joined);
        }
        if !self.left.is_empty() {
            delegate.members_left(self.left);
        }
        if !self.failed.is_empty() {
            delegate.members_failed(self.failed);
        }
        if !self.partitioned.is_empty() {
            delegate.members_partitioned(self.partitioned);
        }
    }
}

struct WindowEntry {
    first_seen: MemberStatus,
    last: Member,
}

/// First-seen/last-seen bookkeeping for one coalescing window.
#[derive(Default)]
pub struct CoalesceWindow {
    /// Member names in order of first appearance.
    order: Vec<String>,
    entries: HashMap<String, WindowEntry>,
}

impl CoalesceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of distinct members touched in this window.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn record(&mut self, change: StatusChange) {
        let StatusChange {
            mut member,
            old_status,
            new_status,
        } = change;
        member.status = new_status;

        match self.entries.get_mut(&member.name) {
            Some(entry) => entry.last = member,
            None => {
                self.order.push(member.name.clone());
                self.entries.insert(
                    member.name.clone(),
                    WindowEntry {
                        first_seen: old_status,
                        last: member,
                    },
                );
            }
        }
    }

    /// Drop flaps and group the rest by final status.
    pub fn into_batches(mut self) -> Batches {
        let mut batches = Batches::default();
        for name in self.order {
            let Some(entry) = self.entries.remove(&name) else {
                continue;
            };
            if entry.first_seen == entry.last.status {
                continue;
            }
            match entry.last.status {
                MemberStatus::Alive => batches.joined.push(entry.last),
                MemberStatus::Left => batches.left.push(entry.last),
                MemberStatus::Failed => batches.failed.push(entry.last),
                MemberStatus::Partitioned => batches.partitioned.push(entry.last),
                MemberStatus::None | MemberStatus::Leaving => {}
            }
        }
        batches
    }
}

/// The long-running consumer of the status-change queue.
pub struct Coalescer {
    max_coalesce_time: Duration,
    min_quiescent_time: Duration,
    changes: mpsc::UnboundedReceiver<StatusChange>,
    delegate: Option<Box<dyn Delegate>>,
    shutdown: watch::Receiver<bool>,
}

impl Coalescer {
    pub fn new(
        max_coalesce_time: Duration,
        min_quiescent_time: Duration,
        changes: mpsc::UnboundedReceiver<StatusChange>,
        delegate: Option<Box<dyn Delegate>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            max_coalesce_time,
            min_quiescent_time,
            changes,
            delegate,
            shutdown,
        }
    }

    /// Run windows back to back until shutdown or until every producer
    /// has gone away.
    pub async fn run(mut self) {
        info!(
            max_coalesce_ms = self.max_coalesce_time.as_millis() as u64,
            min_quiescent_ms = self.min_quiescent_time.as_millis() as u64,
            "coalescer started"
        );
        while let Some(window) = self.collect_window().await {
            self.flush(window);
        }
        info!("coalescer stopped");
    }

    /// Collect one window. Returns `None` when the loop should exit; any
    /// events gathered so far are discarded in that case.
    async fn collect_window(&mut self) -> Option<CoalesceWindow> {
        let mut window = CoalesceWindow::new();
        let mut deadline: Option<Instant> = None;
        let mut quiescent: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => {
                    debug!(pending = window.len(), "coalescer shutting down, discarding open window");
                    return None;
                }
                _ = sleep_until(deadline) => {
                    debug!(members = window.len(), "coalescing window hit max coalesce time");
                    return Some(window);
                }
                _ = sleep_until(quiescent) => {
                    debug!(members = window.len(), "coalescing window went quiescent");
                    return Some(window);
                }
                change = self.changes.recv() => {
                    let Some(change) = change else {
                        debug!(pending = window.len(), "status-change queue closed");
                        return None;
                    };
                    let now = Instant::now();
                    window.record(change);
                    deadline.get_or_insert(now + self.max_coalesce_time);
                    quiescent = Some(now + self.min_quiescent_time);
                }
            }
        }
    }

    fn flush(&mut self, window: CoalesceWindow) {
        let Some(delegate) = self.delegate.as_deref_mut() else {
            return;
        };
        let batches = window.into_batches();
        if batches.is_empty() {
            debug!("coalescing window had no net changes");
            return;
        }
        debug!(
            joined = batches.joined.len(),
            left = batches.left.len(),
            failed = batches.failed.len(),
            partitioned = batches.partitioned.len(),
            "dispatching membership batches"
        );
        batches.dispatch(delegate);
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{ChannelDelegate, MembershipEvent};

    fn change(name: &str, old: MemberStatus, new: MemberStatus) -> StatusChange {
        let mut member = Member::alive(name, "10.0.0.1:7946", "");
        member.status = new;
        StatusChange {
            member,
            old_status: old,
            new_status: new,
        }
    }

    fn names(members: &[Member]) -> Vec<&str> {
        members.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn flap_is_dropped() {
        let mut window = CoalesceWindow::new();
        window.record(change("a", MemberStatus::Alive, MemberStatus::Failed));
        window.record(change("a", MemberStatus::Failed, MemberStatus::Alive));

        assert!(window.into_batches().is_empty());
    }

    #[test]
    fn join_then_fail_is_a_failure() {
        let mut window = CoalesceWindow::new();
        window.record(change("a", MemberStatus::None, MemberStatus::Alive));
        window.record(change("a", MemberStatus::Alive, MemberStatus::Failed));

        let batches = window.into_batches();
        assert!(batches.joined.is_empty());
        assert_eq!(names(&batches.failed), ["a"]);
        assert_eq!(batches.failed[0].status, MemberStatus::Failed);
    }

    #[test]
    fn groups_by_last_seen_status() {
        let mut window = CoalesceWindow::new();
        window.record(change("a", MemberStatus::None, MemberStatus::Alive));
        window.record(change("b", MemberStatus::Leaving, MemberStatus::Left));
        window.record(change("c", MemberStatus::Alive, MemberStatus::Failed));
        window.record(change("d", MemberStatus::Failed, MemberStatus::Partitioned));
        window.record(change("e", MemberStatus::None, MemberStatus::Alive));

        let batches = window.into_batches();
        assert_eq!(names(&batches.joined), ["a", "e"]);
        assert_eq!(names(&batches.left), ["b"]);
        assert_eq!(names(&batches.failed), ["c"]);
        assert_eq!(names(&batches.partitioned), ["d"]);
    }

    #[test]
    fn leaving_has_no_callback() {
        let mut window = CoalesceWindow::new();
        window.record(change("a", MemberStatus::Alive, MemberStatus::Leaving));
        assert_eq!(window.len(), 1);
        assert!(window.into_batches().is_empty());
    }

    #[test]
    fn dispatch_skips_empty_groups() {
        let (mut delegate, mut rx) = ChannelDelegate::new();
        let batches = Batches {
            failed: vec![Member::alive("a", "10.0.0.1:7946", "")],
            ..Batches::default()
        };
        batches.dispatch(&mut delegate);

        assert!(matches!(rx.try_recv().unwrap(), MembershipEvent::Failed(_)));
        assert!(rx.try_recv().is_err());
    }

    fn spawn_coalescer(
        max: Duration,
        min: Duration,
    ) -> (
        mpsc::UnboundedSender<StatusChange>,
        mpsc::UnboundedReceiver<MembershipEvent>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (delegate, events) = ChannelDelegate::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let coalescer = Coalescer::new(max, min, rx, Some(Box::new(delegate)), shutdown_rx);
        let handle = tokio::spawn(coalescer.run());
        (tx, events, shutdown_tx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn quiescence_closes_window() {
        let (tx, mut events, _shutdown, _handle) =
            spawn_coalescer(Duration::from_secs(10), Duration::from_millis(100));

        let start = Instant::now();
        tx.send(change("a", MemberStatus::None, MemberStatus::Alive)).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event, MembershipEvent::Joined(vec![change("a", MemberStatus::None, MemberStatus::Alive).member]));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_churn_bounded_by_max_coalesce_time() {
        let (tx, mut events, _shutdown, _handle) =
            spawn_coalescer(Duration::from_millis(500), Duration::from_millis(100));

        let start = Instant::now();
        let producer = tokio::spawn(async move {
            for i in 0..20 {
                tx.send(change(&format!("n{i}"), MemberStatus::None, MemberStatus::Alive))
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        let event = events.recv().await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
        let MembershipEvent::Joined(members) = event else {
            panic!("expected a join batch, got {event:?}");
        };
        assert!(members.len() < 20);
        producer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_open_window() {
        let (tx, mut events, shutdown, handle) =
            spawn_coalescer(Duration::from_secs(10), Duration::from_secs(1));

        tx.send(change("a", MemberStatus::None, MemberStatus::Alive)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.send(true).unwrap();
        handle.await.unwrap();

        assert!(events.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_queue_ends_loop() {
        let (tx, _events, _shutdown, handle) =
            spawn_coalescer(Duration::from_secs(10), Duration::from_secs(1));
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_delegate_is_fine() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let coalescer = Coalescer::new(
            Duration::from_millis(200),
            Duration::from_millis(50),
            rx,
            None,
            shutdown_rx,
        );
        let handle = tokio::spawn(coalescer.run());

        tx.send(change("a", MemberStatus::None, MemberStatus::Alive)).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
