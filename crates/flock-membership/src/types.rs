//! Domain types shared by the registry, state machine and coalescer.

use std::fmt;
use std::time::Instant;

/// Unique identity of a cluster member.
pub type MemberName = String;

/// Status of a member as locally known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberStatus {
    /// Never seen. Only used as the "before" side of a first join.
    None,
    Alive,
    /// Leave intent announced, not yet confirmed by the transport.
    Leaving,
    Left,
    /// Detected down, cause unknown.
    Failed,
    /// Suspected network split rather than a true failure.
    Partitioned,
}

impl MemberStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Alive => "alive",
            Self::Leaving => "leaving",
            Self::Left => "left",
            Self::Failed => "failed",
            Self::Partitioned => "partitioned",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One cluster node as locally known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: MemberName,
    pub addr: String,
    /// Role/metadata tag carried by the transport.
    pub role: String,
    pub status: MemberStatus,
    /// Bumped on every accepted leave intent so stale revert timers can
    /// recognise themselves.
    pub intent_generation: u64,
}

impl Member {
    /// A freshly joined member.
    pub fn alive(name: &str, addr: &str, role: &str) -> Self {
        Self {
            name: name.to_string(),
            addr: addr.to_string(),
            role: role.to_string(),
            status: MemberStatus::Alive,
            intent_generation: 0,
        }
    }
}

/// A single status transition, as produced by the state machine and
/// consumed by the coalescer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// Snapshot of the member taken right after the transition.
    pub member: Member,
    pub old_status: MemberStatus,
    pub new_status: MemberStatus,
}

/// A member's entry in the failed or left list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgedMember {
    pub name: MemberName,
    /// When the member entered the list.
    pub since: Instant,
}
