//! Render Layer
//!
//! The template-side half of the engine: bound template items that register
//! as dependants, and the small document tree they render into.
//!
//! # Components
//!
//! - [`template`]: the template tree items are built from
//! - [`scope`]: reference resolution against nested contexts
//! - [`fragment`]: an ordered, bound list of items
//! - [`items`]: text, interpolators, sections, partials, elements and
//!   components
//! - [`dom`]: the in-memory document tree
//!
//! # Render Lifecycle
//!
//! 1. **Bind**: constructing a fragment resolves every reference and
//!    registers the resulting dependants in the viewmodel.
//! 2. **Render**: [`fragment::Fragment::render`] produces document nodes.
//! 3. **Update**: dependants invalidated by a write recompute their state
//!    during the flush and queue [`View`](crate::runloop::View) work, which
//!    touches the document once values have settled.
//! 4. **Unbind**: every registration made during bind is released.

pub mod dom;
pub mod fragment;
pub mod items;
pub mod scope;
pub mod template;

pub use dom::Node;
pub use fragment::Fragment;
pub use template::{Attribute, Template, TemplateItem};
