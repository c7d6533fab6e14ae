//! Dependency Graph
//!
//! This module implements the graph that connects keypaths in a data tree
//! to the render nodes that read them.
//!
//! # Overview
//!
//! Unlike a signal graph, edges here are keyed by *keypath*, not by value
//! identity:
//!
//! - A dependant registers interest in a keypath (`items.2.name`).
//! - A write to a keypath notifies dependants at that keypath, at every
//!   ancestor, and at descendants that actually have live registrations.
//!
//! # Design Decisions
//!
//! 1. Each viewmodel owns its own [`Registry`]; there are no process-wide
//!    tables. Cross-instance edges exist only through mappings.
//!
//! 2. Registrations are ordered per keypath so notification order is
//!    deterministic.
//!
//! 3. A second table of per-link counts lets a write skip whole subtrees
//!    that have nothing registered in them.

mod dependant;
mod registry;

pub use dependant::{Dependant, DependantId, DependantKind, Group, SpliceSummary};
pub use registry::Registry;
