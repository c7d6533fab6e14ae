//! Instances
//!
//! An [`Instance`] ties a viewmodel to a rendered template. It is the entry
//! point applications use: every mutation method opens a runloop batch, so
//! a sequence of writes made through one call settles in a single flush.
//!
//! Components are instances too. A component's [`Root`] keeps a link to the
//! parent root it was created under, which is how partials and component
//! definitions are looked up through the nesting and how non-isolated
//! components resolve references they cannot find locally.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::keypath::Keypath;
use crate::render::dom::Node;
use crate::render::fragment::{Fragment, FragmentOptions, Owner};
use crate::render::items::Component;
use crate::render::scope::Scope;
use crate::render::template::Template;
use crate::runloop;
use crate::viewmodel::{Computation, Observer, ObserverCallback, Viewmodel};

/// Options for creating an instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceOptions {
    /// Initial data. `null` is treated as an empty object.
    pub data: Value,

    pub template: Template,

    /// Named templates available to `{{>name}}`.
    pub partials: IndexMap<String, Template>,

    /// Component definitions by tag name.
    pub components: IndexMap<String, ComponentDefinition>,

    /// An isolated component never reaches into its parent's data.
    pub isolated: bool,

    /// Report missing partial templates at `error` rather than `warn`.
    pub debug: bool,
}

/// A component is defined by the options its instances are created with.
pub type ComponentDefinition = InstanceOptions;

impl InstanceOptions {
    /// Load options from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = template;
        self
    }

    pub fn with_partial(mut self, name: &str, template: Template) -> Self {
        self.partials.insert(name.to_string(), template);
        self
    }

    pub fn with_component(mut self, name: &str, definition: ComponentDefinition) -> Self {
        self.components.insert(name.to_string(), definition);
        self
    }

    pub fn isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub(crate) fn initial_data(&self) -> Value {
        match &self.data {
            Value::Null => Value::Object(Default::default()),
            data => data.clone(),
        }
    }
}

/// Where a component was created: the parent root and, unless the
/// component is isolated, the scope its tag sits in.
pub struct ParentLink {
    root: Rc<Root>,
    scope: RefCell<Option<Scope>>,
    index_refs: RefCell<Vec<String>>,
}

impl ParentLink {
    pub(crate) fn new(root: Rc<Root>, scope: Option<Scope>) -> Self {
        Self {
            root,
            scope: RefCell::new(scope),
            index_refs: RefCell::new(Vec::new()),
        }
    }

    /// Remember that the child copied the parent's index reference `name`.
    pub(crate) fn inherit_index_ref(&self, name: &str) {
        let mut index_refs = self.index_refs.borrow_mut();
        if !index_refs.iter().any(|n| n == name) {
            index_refs.push(name.to_string());
        }
    }

    /// Index references the child copied from the parent scope.
    pub fn inherited_index_refs(&self) -> Vec<String> {
        self.index_refs.borrow().clone()
    }

    pub fn root(&self) -> &Rc<Root> {
        &self.root
    }

    /// The scope used for implicit lookups; `None` when isolated.
    pub fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }

    pub(crate) fn rebind(&self, index_ref: Option<&str>, new_index: Option<usize>, old: &Keypath, new: &Keypath) {
        if let Some(scope) = self.scope.borrow_mut().as_mut() {
            scope.rebind(index_ref, new_index, old, new);
        }
    }
}

/// Shared state of one instance: what every item in its template needs.
pub struct Root {
    viewmodel: Rc<Viewmodel>,
    partials: RefCell<IndexMap<String, Template>>,
    components: IndexMap<String, ComponentDefinition>,
    parent: Option<ParentLink>,
    target: RefCell<Option<Node>>,
    debug: bool,
}

impl Root {
    pub(crate) fn new(options: &InstanceOptions, viewmodel: Rc<Viewmodel>, parent: Option<ParentLink>) -> Rc<Self> {
        Rc::new(Self {
            viewmodel,
            partials: RefCell::new(options.partials.clone()),
            components: options.components.clone(),
            parent,
            target: RefCell::new(None),
            debug: options.debug,
        })
    }

    pub fn viewmodel(&self) -> &Rc<Viewmodel> {
        &self.viewmodel
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// A partial registered on this root only.
    pub fn partial(&self, name: &str) -> Option<Template> {
        self.partials.borrow().get(name).cloned()
    }

    pub fn add_partial(&self, name: &str, template: Template) {
        self.partials.borrow_mut().insert(name.to_string(), template);
    }

    /// A component definition from this root or the nearest ancestor that
    /// has one.
    pub fn component_definition(&self, name: &str) -> Option<ComponentDefinition> {
        if let Some(definition) = self.components.get(name) {
            return Some(definition.clone());
        }
        self.parent.as_ref()?.root.component_definition(name)
    }

    /// The node this root's top-level fragment renders into.
    pub fn target(&self) -> Option<Node> {
        self.target.borrow().clone()
    }

    pub(crate) fn set_target(&self, target: Option<Node>) {
        *self.target.borrow_mut() = target;
    }
}

/// A rendered, data-bound template.
pub struct Instance {
    root: Rc<Root>,
    fragment: Rc<Fragment>,
    observers: RefCell<Vec<Rc<Observer>>>,
}

impl Instance {
    /// Build the viewmodel and bind the template. Nothing is rendered
    /// until [`Instance::render`].
    pub fn new(options: InstanceOptions) -> Result<Self> {
        let viewmodel = Viewmodel::new(options.initial_data());
        let root = Root::new(&options, viewmodel, None);

        let fragment = runloop::batch(|| {
            Fragment::new(FragmentOptions {
                root: root.clone(),
                owner: Owner::Instance,
                scope: Scope::root(),
                depth: 0,
                template: &options.template,
            })
        })?;

        tracing::debug!(items = options.template.len(), "instance created");
        Ok(Self {
            root,
            fragment,
            observers: RefCell::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Rc<Root> {
        &self.root
    }

    pub fn viewmodel(&self) -> &Rc<Viewmodel> {
        self.root.viewmodel()
    }

    pub fn fragment(&self) -> &Rc<Fragment> {
        &self.fragment
    }

    /// Render into `target`, appending after its existing children.
    pub fn render(&self, target: &Node) -> Result<()> {
        self.root.set_target(Some(target.clone()));
        let nodes = self.fragment.render()?;
        target.append_child(&nodes);
        Ok(())
    }

    /// Detach everything this instance rendered.
    pub fn unrender(&self) {
        self.fragment.unrender();
        self.root.set_target(None);
    }

    /// Unrender, release every registration and sever all mappings.
    pub fn teardown(&self) -> Result<()> {
        runloop::batch(|| {
            self.unrender();
            self.fragment.unbind()?;
            for observer in self.observers.borrow_mut().drain(..) {
                observer.cancel()?;
            }
            self.viewmodel().teardown()
        })?;
        tracing::debug!("instance torn down");
        Ok(())
    }

    pub fn get(&self, keypath: &str) -> Option<Value> {
        self.viewmodel().get(&Keypath::from(keypath))
    }

    pub fn set(&self, keypath: &str, value: Value) -> Result<()> {
        runloop::batch(|| self.viewmodel().set(&Keypath::from(keypath), value))
    }

    /// Several writes settled in one flush.
    pub fn set_many<'a, I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        runloop::batch(|| {
            for (keypath, value) in values {
                self.viewmodel().set(&Keypath::from(keypath), value)?;
            }
            Ok(())
        })
    }

    pub fn splice(&self, keypath: &str, start: usize, remove: usize, items: Vec<Value>) -> Result<Vec<Value>> {
        runloop::batch(|| {
            self.viewmodel()
                .splice(&Keypath::from(keypath), start, remove, items)
        })
    }

    pub fn push(&self, keypath: &str, items: Vec<Value>) -> Result<usize> {
        runloop::batch(|| self.viewmodel().push(&Keypath::from(keypath), items))
    }

    pub fn pop(&self, keypath: &str) -> Result<Option<Value>> {
        runloop::batch(|| self.viewmodel().pop(&Keypath::from(keypath)))
    }

    pub fn shift(&self, keypath: &str) -> Result<Option<Value>> {
        runloop::batch(|| self.viewmodel().shift(&Keypath::from(keypath)))
    }

    pub fn unshift(&self, keypath: &str, items: Vec<Value>) -> Result<usize> {
        runloop::batch(|| self.viewmodel().unshift(&Keypath::from(keypath), items))
    }

    /// Observe `keypath`; the observer lives until cancelled or teardown.
    pub fn observe(&self, keypath: &str, callback: ObserverCallback, init: bool) -> Rc<Observer> {
        let observer = self
            .viewmodel()
            .observe(Keypath::from(keypath), callback, init);
        self.observers.borrow_mut().push(observer.clone());
        observer
    }

    /// Install a computed value at `key`.
    pub fn compute<F>(&self, key: &str, dependencies: &[&str], compute: F) -> Result<Rc<Computation>>
    where
        F: Fn(&Viewmodel) -> Value + 'static,
    {
        let dependencies = dependencies.iter().map(|d| Keypath::from(*d)).collect();
        runloop::batch(|| {
            self.viewmodel()
                .compute(Keypath::from(key), dependencies, compute)
        })
    }

    /// First component called `name`, depth first in template order.
    pub fn find_component(&self, name: &str) -> Option<Rc<Component>> {
        self.fragment.find_component(name)
    }

    /// Markup currently rendered into the target.
    pub fn to_html(&self) -> String {
        self.root
            .target()
            .map(|target| target.inner_html())
            .unwrap_or_default()
    }
}
