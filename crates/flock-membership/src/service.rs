//! `Membership`: the handle the transport layer talks to.
//!
//! Owns the registry lock, the status-change queue and the coalescer task.
//! Every entry point follows the same shape:
//!
//! 1. take the registry lock and run one pure transition,
//! 2. push the resulting event while still holding the lock,
//! 3. release the lock, then log, call the suspicion hook, and schedule a
//!    revert timer if the transition asked for one.
//!
//! The queue is unbounded, so step 2 never blocks a transport callback
//! or stalls the critical section on the coalescer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coalesce::Coalescer;
use crate::config::MembershipConfig;
use crate::delegate::Delegate;
use crate::error::{MembershipError, MembershipResult};
use crate::registry::MemberRegistry;
use crate::suspicion::{NoopSuspicion, PartitionSuspicion};
use crate::transition::{self, Suspicion, Transition};
use crate::types::{AgedMember, Member, StatusChange};

/// State shared between the handle and its revert timers.
struct Shared {
    registry: Mutex<MemberRegistry>,
    changes: mpsc::UnboundedSender<StatusChange>,
    suspicion: Arc<dyn PartitionSuspicion>,
    leave_timeout: Duration,
    runtime: Handle,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, MemberRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one transition under the lock and queue its event before the
    /// lock is released, then act on the rest of its outcome.
    fn apply<F>(self: &Arc<Self>, name: &str, f: F) -> Transition
    where
        F: FnOnce(&mut MemberRegistry) -> Transition,
    {
        let (transition, queued) = {
            let mut registry = self.registry();
            let transition = f(&mut registry);
            // Queue order must match transition order per member.
            let queued = match &transition.change {
                Some(change) => self.changes.send(change.clone()).is_ok(),
                None => true,
            };
            (transition, queued)
        };

        if let Some(change) = &transition.change {
            info!(
                member = %name,
                from = %change.old_status,
                to = %change.new_status,
                "member status changed"
            );
            if !queued {
                debug!(member = %name, "coalescer gone, status change not queued");
            }
        }

        match &transition.suspicion {
            Some(Suspicion::Raise(member)) => self.suspicion.suspect(member),
            Some(Suspicion::Cancel(member)) => self.suspicion.unsuspect(member),
            None => {}
        }

        if let Some(generation) = transition.revert_generation {
            self.schedule_revert(name, generation);
        }

        transition
    }

    /// Revert `name` back to `Alive` after the leave timeout unless the
    /// intent was confirmed or superseded in the meantime.
    fn schedule_revert(self: &Arc<Self>, name: &str, generation: u64) {
        let shared = Arc::clone(self);
        let name = name.to_string();
        let timeout = self.leave_timeout;

        self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let reverted = shared
                .apply(&name, |reg| transition::revert_intent(reg, &name, generation))
                .change
                .is_some();
            if reverted {
                warn!(member = %name, generation, "leave intent timed out, member reverted to alive");
            } else {
                debug!(member = %name, generation, "stale leave-intent timer ignored");
            }
        });
    }
}

/// Builder for [`Membership`].
pub struct MembershipBuilder {
    config: MembershipConfig,
    delegate: Option<Box<dyn Delegate>>,
    suspicion: Arc<dyn PartitionSuspicion>,
}

impl MembershipBuilder {
    /// Deliver coalesced batches to `delegate`. Without one, batches are
    /// computed and dropped.
    pub fn with_delegate(mut self, delegate: impl Delegate) -> Self {
        self.delegate = Some(Box::new(delegate));
        self
    }

    pub fn with_suspicion(mut self, suspicion: Arc<dyn PartitionSuspicion>) -> Self {
        self.suspicion = suspicion;
        self
    }

    /// Validate the config and spawn the coalescer on the current tokio
    /// runtime.
    pub fn start(self) -> MembershipResult<Membership> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| MembershipError::NoRuntime)?;

        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let coalescer = Coalescer::new(
            self.config.max_coalesce_time,
            self.config.min_quiescent_time,
            changes_rx,
            self.delegate,
            shutdown_rx,
        );
        let handle = runtime.spawn(coalescer.run());

        let shared = Arc::new(Shared {
            registry: Mutex::new(MemberRegistry::new()),
            changes: changes_tx,
            suspicion: self.suspicion,
            leave_timeout: self.config.leave_timeout,
            runtime,
        });

        info!(
            leave_timeout_ms = self.config.leave_timeout.as_millis() as u64,
            "membership coordinator started"
        );

        Ok(Membership {
            shared,
            shutdown_tx,
            coalescer: Mutex::new(Some(handle)),
        })
    }
}

/// Membership coordinator handle.
///
/// All methods take `&self` and are safe to call concurrently from any
/// thread; wrap in an `Arc` to share with the transport.
pub struct Membership {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    coalescer: Mutex<Option<JoinHandle<()>>>,
}

impl Membership {
    pub fn builder(config: MembershipConfig) -> MembershipBuilder {
        MembershipBuilder {
            config,
            delegate: None,
            suspicion: Arc::new(NoopSuspicion),
        }
    }

    /// The transport observed a node joining.
    pub fn notify_join(&self, name: &str, addr: &str, role: &str) {
        self.shared
            .apply(name, |reg| transition::join(reg, name, addr, role));
    }

    /// The transport lost contact with a node.
    pub fn notify_leave(&self, name: &str) {
        let now = Instant::now();
        self.shared
            .apply(name, |reg| transition::leave(reg, name, now));
    }

    /// Handle a gossiped leave intent. Returns whether to rebroadcast it.
    pub fn intend_leave(&self, name: &str) -> bool {
        self.shared
            .apply(name, |reg| transition::intend_leave(reg, name))
            .rebroadcast
    }

    /// Handle a force-remove message. Returns whether to rebroadcast it.
    pub fn force_remove(&self, name: &str) -> bool {
        let now = Instant::now();
        self.shared
            .apply(name, |reg| transition::force_remove(reg, name, now))
            .rebroadcast
    }

    /// Record the suspicion subsystem's verdict that a failed member is
    /// partitioned rather than gone. Returns whether the status changed.
    pub fn mark_partitioned(&self, name: &str) -> bool {
        self.shared
            .apply(name, |reg| transition::mark_partitioned(reg, name))
            .change
            .is_some()
    }

    pub fn member(&self, name: &str) -> Option<Member> {
        self.shared.registry().lookup(name).cloned()
    }

    /// Snapshot of all known members, sorted by name.
    pub fn members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.shared.registry().members().cloned().collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members
    }

    /// Snapshot of the failed list, oldest first.
    pub fn failed_members(&self) -> Vec<AgedMember> {
        self.shared.registry().failed().to_vec()
    }

    /// Snapshot of the left list, oldest first.
    pub fn left_members(&self) -> Vec<AgedMember> {
        self.shared.registry().left().to_vec()
    }

    /// Stop the coalescer and wait for it to exit.
    ///
    /// The open coalescing window, if any, is discarded without a delegate
    /// call. Outstanding revert timers are not cancelled. Calling this more
    /// than once is harmless.
    pub async fn shutdown(&self) -> MembershipResult<()> {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .coalescer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| MembershipError::Join(e.to_string()))?;
            info!("membership coordinator stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemberStatus;

    fn test_config() -> MembershipConfig {
        MembershipConfig::new(
            Duration::from_millis(500),
            Duration::from_millis(50),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn start_without_runtime_fails() {
        let err = Membership::builder(test_config()).start().err().unwrap();
        assert!(matches!(err, MembershipError::NoRuntime));
    }

    #[tokio::test]
    async fn start_rejects_zero_durations() {
        let config = test_config().with_leave_timeout(Duration::ZERO);
        let err = Membership::builder(config).start().err().unwrap();
        assert!(matches!(err, MembershipError::ZeroDuration("leave_timeout")));
    }

    #[tokio::test]
    async fn accessors_reflect_registry() {
        let membership = Membership::builder(test_config()).start().unwrap();
        membership.notify_join("b", "10.0.0.2:7946", "db");
        membership.notify_join("a", "10.0.0.1:7946", "web");
        membership.notify_leave("b");

        let names: Vec<_> = membership.members().into_iter().map(|m| m.name).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(membership.member("b").unwrap().status, MemberStatus::Failed);
        assert_eq!(membership.member("a").unwrap().role, "web");
        assert!(membership.member("c").is_none());
        assert_eq!(membership.failed_members()[0].name, "b");
        assert!(membership.left_members().is_empty());

        membership.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let membership = Membership::builder(test_config()).start().unwrap();
        membership.shutdown().await.unwrap();
        membership.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn operations_after_shutdown_still_update_registry() {
        let membership = Membership::builder(test_config()).start().unwrap();
        membership.shutdown().await.unwrap();

        membership.notify_join("a", "10.0.0.1:7946", "");
        assert_eq!(membership.member("a").unwrap().status, MemberStatus::Alive);
    }
}
