//! Tether Core
//!
//! This crate provides the core runtime for the Tether reactive templating
//! engine. It implements:
//!
//! - A keypath-indexed dependency graph with smart-update pruning
//! - Cross-instance data sharing through mappings
//! - A batching runloop that settles every write in one glitch-free flush
//! - Bound template items (interpolators, sections, partials, components)
//!   rendering into an in-memory document tree
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `keypath`: hierarchical data paths
//! - `graph`: the `Dependant` capability and the registration tables
//! - `viewmodel`: data, notification, mappings, computed values, observers
//! - `runloop`: batching and flush ordering
//! - `render`: templates, scopes, fragments and items
//! - `instance`: the application-facing entry point
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tether_core::render::template::{interpolator, text};
//! use tether_core::render::Node;
//! use tether_core::{Instance, InstanceOptions};
//!
//! let instance = Instance::new(
//!     InstanceOptions::default()
//!         .with_data(json!({ "name": "world" }))
//!         .with_template(vec![text("hello "), interpolator("name")]),
//! )?;
//!
//! let target = Node::element("div");
//! instance.render(&target)?;
//! assert_eq!(target.inner_html(), "hello world");
//!
//! instance.set("name", json!("again"))?;
//! assert_eq!(target.inner_html(), "hello again");
//! # Ok::<(), tether_core::Error>(())
//! ```

pub mod error;
pub mod graph;
pub mod instance;
pub mod keypath;
pub mod render;
pub mod runloop;
pub mod viewmodel;

pub use error::{Error, Result};
pub use graph::{Dependant, DependantId, Group};
pub use instance::{ComponentDefinition, Instance, InstanceOptions};
pub use keypath::Keypath;
pub use viewmodel::Viewmodel;
