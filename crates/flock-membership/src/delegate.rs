//! Application-facing callbacks for coalesced membership changes.
//!
//! A [`Delegate`] is owned by the coalescer task and only ever called from
//! it, one batch at a time, so implementations need no synchronization of
//! their own. Every batch is non-empty.

use tokio::sync::mpsc;
use tracing::info;

use crate::types::Member;

/// Receiver of batched membership changes. All methods default to no-ops.
pub trait Delegate: Send + 'static {
    fn members_joined(&mut self, _members: Vec<Member>) {}

    fn members_left(&mut self, _members: Vec<Member>) {}

    fn members_failed(&mut self, _members: Vec<Member>) {}

    fn members_partitioned(&mut self, _members: Vec<Member>) {}
}

/// One delegate batch, as forwarded by [`ChannelDelegate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Joined(Vec<Member>),
    Left(Vec<Member>),
    Failed(Vec<Member>),
    Partitioned(Vec<Member>),
}

impl MembershipEvent {
    pub fn members(&self) -> &[Member] {
        match self {
            Self::Joined(m) | Self::Left(m) | Self::Failed(m) | Self::Partitioned(m) => m,
        }
    }
}

/// Forwards every batch into an unbounded channel.
pub struct ChannelDelegate {
    tx: mpsc::UnboundedSender<MembershipEvent>,
}

impl ChannelDelegate {
    /// Create a delegate and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MembershipEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: MembershipEvent) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl Delegate for ChannelDelegate {
    fn members_joined(&mut self, members: Vec<Member>) {
        self.forward(MembershipEvent::Joined(members));
    }

    fn members_left(&mut self, members: Vec<Member>) {
        self.forward(MembershipEvent::Left(members));
    }

    fn members_failed(&mut self, members: Vec<Member>) {
        self.forward(MembershipEvent::Failed(members));
    }

    fn members_partitioned(&mut self, members: Vec<Member>) {
        self.forward(MembershipEvent::Partitioned(members));
    }
}

/// Logs each batch at `info`.
#[derive(Debug, Default)]
pub struct LoggingDelegate;

fn names(members: &[Member]) -> Vec<&str> {
    members.iter().map(|m| m.name.as_str()).collect()
}

impl Delegate for LoggingDelegate {
    fn members_joined(&mut self, members: Vec<Member>) {
        info!(members = ?names(&members), "members joined");
    }

    fn members_left(&mut self, members: Vec<Member>) {
        info!(members = ?names(&members), "members left");
    }

    fn members_failed(&mut self, members: Vec<Member>) {
        info!(members = ?names(&members), "members failed");
    }

    fn members_partitioned(&mut self, members: Vec<Member>) {
        info!(members = ?names(&members), "members partitioned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_delegate_forwards_batches() {
        let (mut delegate, mut rx) = ChannelDelegate::new();
        let a = Member::alive("a", "10.0.0.1:7946", "");

        delegate.members_joined(vec![a.clone()]);
        delegate.members_failed(vec![a.clone()]);

        assert_eq!(rx.try_recv().unwrap(), MembershipEvent::Joined(vec![a.clone()]));
        let failed = rx.try_recv().unwrap();
        assert!(matches!(failed, MembershipEvent::Failed(_)));
        assert_eq!(failed.members()[0].name, "a");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_delegate_survives_dropped_receiver() {
        let (mut delegate, rx) = ChannelDelegate::new();
        drop(rx);
        delegate.members_left(vec![Member::alive("a", "10.0.0.1:7946", "")]);
    }

    #[test]
    fn default_methods_are_noops() {
        struct Silent;
        impl Delegate for Silent {}

        let mut d = Silent;
        d.members_joined(vec![Member::alive("a", "10.0.0.1:7946", "")]);
        d.members_partitioned(Vec::new());
    }
}
