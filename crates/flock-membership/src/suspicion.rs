//! Hooks into the external partition-suspicion subsystem.
//!
//! The heuristic that decides whether a failed member is really gone or
//! just cut off lives elsewhere. This crate only tells it when to start
//! and stop watching a member; its verdict comes back through
//! [`Membership::mark_partitioned`](crate::Membership::mark_partitioned).

use crate::types::Member;

/// Receiver of partition-suspicion signals.
///
/// Called from whichever thread triggered the transition, after the
/// registry lock has been released. Implementations must not block.
pub trait PartitionSuspicion: Send + Sync {
    /// `member` just transitioned to `Failed`.
    fn suspect(&self, member: &Member);

    /// `member` rejoined or was force-removed.
    fn unsuspect(&self, member: &Member);
}

/// Suspicion hook that ignores every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSuspicion;

impl PartitionSuspicion for NoopSuspicion {
    fn suspect(&self, _member: &Member) {}

    fn unsuspect(&self, _member: &Member) {}
}
