//! Status state machine.
//!
//! Pure transition logic over a [`MemberRegistry`]. Each function applies
//! one trigger and describes what the caller must do afterwards (emit an
//! event, poke the partition-suspicion hooks, rebroadcast, schedule a
//! revert) as a [`Transition`]. Nothing here blocks, sleeps or sends.
//!
//! | trigger            | from                  | to       |
//! |--------------------|-----------------------|----------|
//! | join               | unknown / any         | Alive    |
//! | leave              | Alive                 | Failed   |
//! | leave              | Leaving               | Left     |
//! | leave intent       | Alive                 | Leaving  |
//! | revert (same gen)  | Leaving               | Alive    |
//! | force remove       | Failed                | Left     |
//! | mark partitioned   | Failed                | Partitioned |

use std::time::Instant;

use crate::registry::MemberRegistry;
use crate::types::{Member, MemberStatus, StatusChange};

/// Partition-suspicion hook to invoke once the lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suspicion {
    Raise(Member),
    Cancel(Member),
}

/// Outcome of applying one trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Set when the member's status actually changed.
    pub change: Option<StatusChange>,
    pub suspicion: Option<Suspicion>,
    /// Whether the triggering gossip message should be rebroadcast.
    pub rebroadcast: bool,
    /// Leave-intent generation to schedule a revert timer for.
    pub revert_generation: Option<u64>,
}

impl Transition {
    fn noop() -> Self {
        Self::default()
    }

    fn changed(member: &Member, old_status: MemberStatus) -> Self {
        Self {
            change: Some(StatusChange {
                member: member.clone(),
                old_status,
                new_status: member.status,
            }),
            ..Self::default()
        }
    }
}

/// The transport observed `name` joining.
pub fn join(reg: &mut MemberRegistry, name: &str, addr: &str, role: &str) -> Transition {
    let (member, previous) = reg.upsert_on_join(name, addr, role);
    if previous == MemberStatus::Alive {
        return Transition::noop();
    }

    member.status = MemberStatus::Alive;
    let mut transition = Transition::changed(member, previous);

    match previous {
        MemberStatus::Failed | MemberStatus::Partitioned => {
            transition.suspicion = Some(Suspicion::Cancel(member.clone()));
            reg.clear_aged(name);
        }
        MemberStatus::Left => {
            reg.clear_aged(name);
        }
        _ => {}
    }
    transition
}

/// The transport lost contact with `name`.
pub fn leave(reg: &mut MemberRegistry, name: &str, now: Instant) -> Transition {
    let Some(member) = reg.lookup_mut(name) else {
        return Transition::noop();
    };

    let previous = member.status;
    match previous {
        MemberStatus::Alive => {
            member.status = MemberStatus::Failed;
            let mut transition = Transition::changed(member, previous);
            transition.suspicion = Some(Suspicion::Raise(member.clone()));
            reg.push_failed(name, now);
            transition
        }
        MemberStatus::Leaving => {
            member.status = MemberStatus::Left;
            let transition = Transition::changed(member, previous);
            reg.push_left(name, now);
            transition
        }
        _ => Transition::noop(),
    }
}

/// A gossiped leave intent for `name` arrived.
pub fn intend_leave(reg: &mut MemberRegistry, name: &str) -> Transition {
    let Some(member) = reg.lookup_mut(name) else {
        return Transition::noop();
    };
    if member.status != MemberStatus::Alive {
        return Transition::noop();
    }

    member.status = MemberStatus::Leaving;
    member.intent_generation += 1;

    let mut transition = Transition::changed(member, MemberStatus::Alive);
    transition.rebroadcast = true;
    transition.revert_generation = Some(member.intent_generation);
    transition
}

/// The leave timeout for intent `generation` of `name` elapsed.
///
/// Only reverts if the member is still `Leaving` under that same intent.
pub fn revert_intent(reg: &mut MemberRegistry, name: &str, generation: u64) -> Transition {
    let Some(member) = reg.lookup_mut(name) else {
        return Transition::noop();
    };
    if member.status != MemberStatus::Leaving || member.intent_generation != generation {
        return Transition::noop();
    }

    member.status = MemberStatus::Alive;
    Transition::changed(member, MemberStatus::Leaving)
}

/// An administrative force-remove for `name` arrived.
pub fn force_remove(reg: &mut MemberRegistry, name: &str, now: Instant) -> Transition {
    let Some(member) = reg.lookup_mut(name) else {
        return Transition::noop();
    };
    if member.status != MemberStatus::Failed {
        return Transition::noop();
    }

    member.status = MemberStatus::Left;
    let mut transition = Transition::changed(member, MemberStatus::Failed);
    transition.suspicion = Some(Suspicion::Cancel(member.clone()));
    transition.rebroadcast = true;
    reg.push_left(name, now);
    transition
}

/// The partition-suspicion subsystem reclassified a failed member.
///
/// The member keeps its failed-list entry.
pub fn mark_partitioned(reg: &mut MemberRegistry, name: &str) -> Transition {
    let Some(member) = reg.lookup_mut(name) else {
        return Transition::noop();
    };
    if member.status != MemberStatus::Failed {
        return Transition::noop();
    }

    member.status = MemberStatus::Partitioned;
    Transition::changed(member, MemberStatus::Failed)
}
