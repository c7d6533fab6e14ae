//! Error Types
//!
//! Errors fall into two camps. Internal-invariant violations (a dependant
//! unregistered twice, for instance) mean the dependency graph's own
//! bookkeeping is broken; they are propagated to the caller and never
//! swallowed. User-data problems (a partial whose template is missing) are
//! logged and degraded by the node that hit them.

use thiserror::Error;

use crate::graph::Group;
use crate::keypath::Keypath;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A dependant was unregistered from a keypath it was never registered
    /// at. This indicates a double-unregister or a registration bug.
    #[error(
        "attempted to remove a dependant that was no longer registered at `{keypath}` \
         (group {group:?}); this should not happen, please report it"
    )]
    NotRegistered { keypath: Keypath, group: Group },

    /// A list operation targeted a value that is not an array.
    #[error("cannot splice `{keypath}`: value is not an array")]
    NotAnArray { keypath: Keypath },

    /// A write named an object key under an array.
    #[error("cannot set `{keypath}`: arrays take indices or `length`, not named keys")]
    NotAnObject { keypath: Keypath },

    /// No partial template is registered under the given name.
    #[error("could not find template for partial `{name}`")]
    MissingTemplate { name: String },

    /// A component item names a definition that was never registered.
    #[error("unknown component `{name}`")]
    UnknownComponent { name: String },

    /// A flush kept invalidating dependants past the pass limit, usually a
    /// computed value that depends on its own output. The batch's pending
    /// updates and view work were discarded.
    #[error("changes did not settle after {passes} update passes")]
    Unsettled { passes: usize },

    /// Instance options could not be deserialized.
    #[error("invalid instance options: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error reflects broken graph bookkeeping rather than bad
    /// user data.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NotRegistered { .. })
    }
}
