//! Cross-process coordination primitives.
//!
//! Everything in this module operates purely through the shared store, so
//! any number of service instances can participate:
//!
//! - [`lease`]: named, owned, auto-extending mutual exclusion backing leader
//!   election.
//! - [`rendezvous`]: single-slot mailboxes on which blocked followers wait
//!   for the leader's publish.

pub mod lease;
pub mod rendezvous;

pub use lease::{DistributedLease, LeaseConfig, LeaseError};
pub use rendezvous::{Rendezvous, WaitError};
