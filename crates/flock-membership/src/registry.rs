//! Member registry: in-memory map of known members plus the failed
//! and left lists.
//!
//! The registry holds no lock and no timers of its own. `Membership`
//! wraps it in a single mutex shared with the state machine, so every
//! method here runs inside one critical section.

use std::collections::HashMap;
use std::time::Instant;

use crate::types::{AgedMember, Member, MemberStatus};

/// Known cluster members keyed by name.
#[derive(Debug, Default)]
pub struct MemberRegistry {
    members: HashMap<String, Member>,
    /// Failed members in the order they failed.
    failed: Vec<AgedMember>,
    /// Departed members in the order they left.
    left: Vec<AgedMember>,
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub(crate) fn lookup_mut(&mut self, name: &str) -> Option<&mut Member> {
        self.members.get_mut(name)
    }

    /// Insert an unknown member as `Alive`, or fetch a known one.
    ///
    /// Returns the member together with its status before this call
    /// (`MemberStatus::None` for a new member). The status of an existing
    /// member is left for the caller to transition; its address and role
    /// are kept as first seen.
    pub fn upsert_on_join(
        &mut self,
        name: &str,
        addr: &str,
        role: &str,
    ) -> (&mut Member, MemberStatus) {
        let mut previous = MemberStatus::None;
        let member = self
            .members
            .entry(name.to_string())
            .and_modify(|m| previous = m.status)
            .or_insert_with(|| Member::alive(name, addr, role));
        (member, previous)
    }

    /// All members, in no particular order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn failed(&self) -> &[AgedMember] {
        &self.failed
    }

    pub fn left(&self) -> &[AgedMember] {
        &self.left
    }

    /// Append to the failed list, dropping any left-list entry.
    pub fn push_failed(&mut self, name: &str, now: Instant) {
        remove_aged(&mut self.left, name);
        remove_aged(&mut self.failed, name);
        self.failed.push(AgedMember {
            name: name.to_string(),
            since: now,
        });
    }

    /// Append to the left list, dropping any failed-list entry.
    pub fn push_left(&mut self, name: &str, now: Instant) {
        remove_aged(&mut self.failed, name);
        remove_aged(&mut self.left, name);
        self.left.push(AgedMember {
            name: name.to_string(),
            since: now,
        });
    }

    /// Drop the member from both lists. Returns true if anything was removed.
    pub fn clear_aged(&mut self, name: &str) -> bool {
        let failed = remove_aged(&mut self.failed, name);
        let left = remove_aged(&mut self.left, name);
        failed || left
    }
}

fn remove_aged(list: &mut Vec<AgedMember>, name: &str) -> bool {
    let before = list.len();
    list.retain(|aged| aged.name != name);
    list.len() != before
}
