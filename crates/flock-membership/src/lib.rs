//! flock-membership: membership-state coordinator for gossip clusters.
//!
//! Sits above a gossip/failure-detection transport that only reports
//! "node joined" and "node left", and turns those possibly-flapping
//! notifications into a coalesced view of cluster membership delivered
//! to application code as batched callbacks.
//!
//! # Architecture
//!
//! ```text
//! Gossip transport
//!   ├── notify_join() / notify_leave()        ┐
//!   └── intend_leave() / force_remove()       │  Membership (handle)
//!                                             │   ├── Mutex<MemberRegistry>
//!                                             │   │     ├── members
//!                                             │   │     ├── failed list
//!                                             │   │     └── left list
//!                                             │   └── transition::* (pure)
//!                                             ┘
//!        │ StatusChange (unbounded mpsc, sent after unlock)
//!        ▼
//! Coalescer (single background task)
//!   ├── first-seen / last-seen per member
//!   ├── quiescence timer + hard deadline
//!   └── Delegate: members_joined / left / failed / partitioned
//! ```
//!
//! # Shutdown
//!
//! Shutting down aborts the open coalescing window: events buffered for
//! that window are discarded and no partial batch is delivered. Pending
//! leave-intent revert timers are left running; they check the member's
//! current status before acting.

pub mod coalesce;
pub mod config;
pub mod delegate;
pub mod error;
pub mod registry;
pub mod service;
pub mod suspicion;
pub mod transition;
pub mod types;

pub use config::MembershipConfig;
pub use delegate::{ChannelDelegate, Delegate, LoggingDelegate, MembershipEvent};
pub use error::{MembershipError, MembershipResult};
pub use registry::MemberRegistry;
pub use service::Membership;
pub use suspicion::{NoopSuspicion, PartitionSuspicion};
pub use types::*;
