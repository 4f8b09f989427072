//! Replay of scripted transport notifications.
//!
//! A script is a JSON array of steps:
//!
//! ```json
//! [
//!   {"op": "join", "name": "node-a", "addr": "10.0.0.1:7946", "role": "web"},
//!   {"op": "intend_leave", "name": "node-a"},
//!   {"op": "sleep", "ms": 250},
//!   {"op": "leave", "name": "node-a"}
//! ]
//! ```

use std::path::Path;
use std::time::Duration;

use flock_membership::{LoggingDelegate, Membership, MembershipConfig};
use serde::Deserialize;
use tracing::{debug, info};

/// One scripted transport notification or pause.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Join {
        name: String,
        addr: String,
        #[serde(default)]
        role: String,
    },
    Leave {
        name: String,
    },
    IntendLeave {
        name: String,
    },
    ForceRemove {
        name: String,
    },
    MarkPartitioned {
        name: String,
    },
    Sleep {
        ms: u64,
    },
}

pub fn parse_script(content: &str) -> anyhow::Result<Vec<Step>> {
    Ok(serde_json::from_str(content)?)
}

/// Apply a single step. Returns the rebroadcast decision for gossip
/// messages, `None` for everything else.
pub async fn apply(membership: &Membership, step: &Step) -> Option<bool> {
    match step {
        Step::Join { name, addr, role } => {
            membership.notify_join(name, addr, role);
            None
        }
        Step::Leave { name } => {
            membership.notify_leave(name);
            None
        }
        Step::IntendLeave { name } => Some(membership.intend_leave(name)),
        Step::ForceRemove { name } => Some(membership.force_remove(name)),
        Step::MarkPartitioned { name } => {
            membership.mark_partitioned(name);
            None
        }
        Step::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            None
        }
    }
}

pub async fn run(config: MembershipConfig, script: &Path) -> anyhow::Result<()> {
    let steps = parse_script(&std::fs::read_to_string(script)?)?;
    info!(steps = steps.len(), path = ?script, "replaying script");

    let membership = Membership::builder(config)
        .with_delegate(LoggingDelegate)
        .start()?;

    for step in &steps {
        if let Some(rebroadcast) = apply(&membership, step).await {
            debug!(?step, rebroadcast, "gossip message handled");
        }
    }

    // Let the last window close on its own before shutting down.
    tokio::time::sleep(config.max_coalesce_time).await;

    for member in membership.members() {
        println!("{:<24} {:<22} {:<10} {}", member.name, member.addr, member.status, member.role);
    }

    membership.shutdown().await?;
    Ok(())
}
