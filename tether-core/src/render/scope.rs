//! Reference resolution.
//!
//! A reference such as `name` inside `{{#items}}...{{/items}}` is resolved
//! against the stack of contexts the template is nested in, innermost
//! first, then against the instance root. A non-isolated component that
//! cannot resolve a reference itself looks it up in the scope it was
//! created in and, on success, maps the reference's top-level key onto the
//! parent's keypath. An index reference found that way is copied into the
//! component's own data instead.

use serde_json::Value;

use crate::instance::Root;
use crate::keypath::Keypath;

/// Context stack and index references visible at a point in a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    contexts: Vec<Keypath>,
    index_refs: Vec<(String, usize)>,
}

/// What a reference resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A keypath in the instance's viewmodel.
    Keypath(Keypath),

    /// The current index of an enclosing list section.
    IndexRef { name: String, index: usize },
}

impl Scope {
    /// The empty scope at an instance root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Innermost context, or the root keypath.
    pub fn context(&self) -> Keypath {
        self.contexts.last().cloned().unwrap_or_default()
    }

    pub fn push_context(&self, context: Keypath) -> Scope {
        let mut scope = self.clone();
        scope.contexts.push(context);
        scope
    }

    pub fn with_index_ref(&self, name: &str, index: usize) -> Scope {
        let mut scope = self.clone();
        scope.index_refs.push((name.to_string(), index));
        scope
    }

    /// Value of the innermost index reference called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index_refs
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, index)| *index)
    }

    /// Follow a list shift: contexts under `old` move to `new`, and the
    /// index reference `index_ref` takes `new_index`.
    pub fn rebind(&mut self, index_ref: Option<&str>, new_index: Option<usize>, old: &Keypath, new: &Keypath) {
        for context in &mut self.contexts {
            if let Some(moved) = context.replace_prefix(old, new) {
                *context = moved;
            }
        }

        if let (Some(name), Some(index)) = (index_ref, new_index) {
            if let Some(entry) = self.index_refs.iter_mut().rev().find(|(n, _)| n == name) {
                entry.1 = index;
            }
        }
    }
}

/// Resolve `reference` for an item living in `scope` of `root`'s template.
/// `None` when nothing in scope holds the reference's top-level key.
pub fn resolve(root: &Root, scope: &Scope, reference: &str) -> Option<Reference> {
    let reference = reference.trim();

    if reference == "." || reference == "this" {
        return Some(Reference::Keypath(scope.context()));
    }
    if let Some(rest) = reference
        .strip_prefix("./")
        .or_else(|| reference.strip_prefix("this."))
    {
        return Some(Reference::Keypath(scope.context().join_path(&Keypath::from(rest))));
    }

    let keypath = Keypath::from(reference);
    let first = keypath.top()?.clone();
    let first_key = first.as_key();

    if keypath.len() == 1 {
        if let Some(index) = scope.index_of(&first_key) {
            return Some(Reference::IndexRef {
                name: first_key,
                index,
            });
        }
    }

    let viewmodel = root.viewmodel();
    for context in scope.contexts.iter().rev() {
        if viewmodel.get(&context.join(first.clone())).is_some() {
            return Some(Reference::Keypath(context.join_path(&keypath)));
        }
    }

    let top = Keypath::from_segments([first]);
    if viewmodel.is_mapped(&first_key) || viewmodel.get(&top).is_some() {
        return Some(Reference::Keypath(keypath));
    }

    let link = root.parent()?;
    let parent_scope = link.scope()?;
    match resolve(link.root(), &parent_scope, &first_key)? {
        Reference::Keypath(target) => match viewmodel.map(&first_key, link.root().viewmodel().clone(), target) {
            Ok(_) => Some(Reference::Keypath(keypath)),
            Err(err) => {
                tracing::warn!(%err, reference, "could not create implicit mapping");
                None
            }
        },
        Reference::IndexRef { name, index } => match viewmodel.set(&top, Value::from(index)) {
            Ok(()) => {
                link.inherit_index_ref(&name);
                Some(Reference::Keypath(keypath))
            }
            Err(err) => {
                tracing::warn!(%err, reference, "could not copy index reference");
                None
            }
        },
    }
}
