//! Components
//!
//! A component tag creates a child instance with its own viewmodel. Bound
//! attributes become mappings onto the parent's data, so both sides read
//! and write one storage slot; literal attributes are copied in once.
//!
//! When a component sits inside a list section and the list shifts, its
//! mappings are re-pointed at the item's new index. The child's own
//! template is not rebound: inside the child, keypaths are relative to its
//! viewmodel and did not move. Index references the child picked up from
//! the enclosing list are plain values in its viewmodel and are rewritten
//! with the new index.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value;

use super::{next_node, parent_node, ItemOptions};
use crate::error::{Error, Result};
use crate::instance::{ParentLink, Root};
use crate::keypath::Keypath;
use crate::render::dom::Node;
use crate::render::fragment::{Fragment, FragmentOptions, Owner};
use crate::render::scope::{self, Reference, Scope};
use crate::render::template::Attribute;
use crate::runloop;
use crate::viewmodel::Viewmodel;

pub struct Component {
    name: String,
    parent: Weak<Fragment>,
    index: usize,
    root: Rc<Root>,
    fragment: RefCell<Option<Rc<Fragment>>>,
    /// Attributes fed by an index reference: attribute key, index ref name.
    index_attributes: Vec<(String, String)>,
}

impl Component {
    pub(super) fn new(
        options: &ItemOptions<'_>,
        name: &str,
        attributes: &IndexMap<String, Attribute>,
    ) -> Result<Rc<Self>> {
        let definition = options
            .root
            .component_definition(name)
            .ok_or_else(|| Error::UnknownComponent {
                name: name.to_string(),
            })?;

        let viewmodel = Viewmodel::new(definition.initial_data());
        let parent_viewmodel = options.root.viewmodel();
        let mut index_attributes = Vec::new();

        for (key, attribute) in attributes {
            let local = Keypath::from(key.as_str());
            match attribute {
                Attribute::Static { value } => viewmodel.set(&local, value.clone())?,
                Attribute::Bound { r } => match scope::resolve(options.root, options.scope, r) {
                    Some(Reference::Keypath(keypath)) => {
                        map_attribute(&viewmodel, key, parent_viewmodel, keypath)?;
                    }
                    Some(Reference::IndexRef { name, index }) => {
                        viewmodel.set(&local, Value::from(index))?;
                        index_attributes.push((key.clone(), name));
                    }
                    None => {
                        map_attribute(&viewmodel, key, parent_viewmodel, Keypath::from(r.as_str()))?;
                    }
                },
            }
        }

        let link_scope = (!definition.isolated).then(|| options.scope.clone());
        let root = Root::new(
            &definition,
            viewmodel,
            Some(ParentLink::new(options.root.clone(), link_scope)),
        );

        let component = Rc::new(Self {
            name: name.to_string(),
            parent: options.parent.clone(),
            index: options.index,
            root: root.clone(),
            fragment: RefCell::new(None),
            index_attributes,
        });

        let fragment = Fragment::new(FragmentOptions {
            root,
            owner: Owner::Component(Rc::downgrade(&component)),
            scope: Scope::root(),
            depth: options.depth + 1,
            template: &definition.template,
        });
        match fragment {
            Ok(fragment) => *component.fragment.borrow_mut() = Some(fragment),
            Err(err) => {
                component.viewmodel().teardown()?;
                return Err(err);
            }
        }

        tracing::debug!(name, "component created");
        Ok(component)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn viewmodel(&self) -> &Rc<Viewmodel> {
        self.root.viewmodel()
    }

    pub fn root(&self) -> &Rc<Root> {
        &self.root
    }

    pub fn fragment(&self) -> Option<Rc<Fragment>> {
        self.fragment.borrow().clone()
    }

    pub fn get(&self, keypath: &str) -> Option<Value> {
        self.viewmodel().get(&Keypath::from(keypath))
    }

    pub fn set(&self, keypath: &str, value: Value) -> Result<()> {
        runloop::batch(|| self.viewmodel().set(&Keypath::from(keypath), value))
    }

    pub(super) fn render(&self) -> Result<Node> {
        match self.fragment() {
            Some(fragment) => fragment.render(),
            None => Ok(Node::fragment()),
        }
    }

    pub(super) fn unrender(&self) {
        if let Some(fragment) = self.fragment() {
            fragment.unrender();
        }
    }

    pub(super) fn first_node(&self) -> Option<Node> {
        self.fragment()?.first_node()
    }

    pub(crate) fn parent_node(&self) -> Option<Node> {
        parent_node(&self.parent)
    }

    pub(crate) fn find_next_node(&self) -> Option<Node> {
        next_node(&self.parent, self.index)
    }

    /// Release the child template, then sever every mapping into the
    /// parent.
    pub(super) fn unbind(&self) -> Result<()> {
        if let Some(fragment) = self.fragment() {
            fragment.unbind()?;
        }
        self.viewmodel().teardown()
    }

    pub(super) fn rebind(&self, index_ref: Option<&str>, new_index: Option<usize>, old: &Keypath, new: &Keypath) -> Result<()> {
        for mapping in self.viewmodel().mappings() {
            mapping.rebind(old, new)?;
        }

        if let (Some(index_ref), Some(new_index)) = (index_ref, new_index) {
            for (key, name) in &self.index_attributes {
                if name == index_ref {
                    self.viewmodel()
                        .set(&Keypath::from(key.as_str()), Value::from(new_index))?;
                }
            }
        }

        if let Some(link) = self.root.parent() {
            link.rebind(index_ref, new_index, old, new);
            let scope = link.scope().unwrap_or_default();
            for name in link.inherited_index_refs() {
                if let Some(index) = scope.index_of(&name) {
                    self.viewmodel()
                        .set(&Keypath::from(name.as_str()), Value::from(index))?;
                }
            }
        }
        Ok(())
    }
}

/// Map the child's `key` onto `keypath` in the parent. A parent slot that
/// is still missing takes the child's own default first.
fn map_attribute(viewmodel: &Viewmodel, key: &str, parent: &Rc<Viewmodel>, keypath: Keypath) -> Result<()> {
    if parent.get(&keypath).is_none() {
        if let Some(default) = viewmodel.get(&Keypath::from(key)) {
            tracing::debug!(key, %keypath, "component default propagated to parent");
            parent.set(&keypath, default)?;
        }
    }
    viewmodel.map(key, parent.clone(), keypath)?;
    Ok(())
}
