//! In-memory document tree.
//!
//! Just enough of a DOM to host rendered output: elements, text nodes and
//! detached fragments. Inserting a fragment moves its children, the way a
//! browser `DocumentFragment` behaves.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

enum NodeKind {
    Element(String),
    Text(String),
    Fragment,
}

struct NodeData {
    kind: NodeKind,
    children: Vec<Node>,
    parent: Weak<RefCell<NodeData>>,
}

/// A shared handle to a document node.
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

impl Node {
    fn with_kind(kind: NodeKind) -> Self {
        Self(Rc::new(RefCell::new(NodeData {
            kind,
            children: Vec::new(),
            parent: Weak::new(),
        })))
    }

    pub fn element(tag: &str) -> Self {
        Self::with_kind(NodeKind::Element(tag.to_string()))
    }

    pub fn text(text: &str) -> Self {
        Self::with_kind(NodeKind::Text(text.to_string()))
    }

    pub fn fragment() -> Self {
        Self::with_kind(NodeKind::Fragment)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Fragment)
    }

    pub fn tag(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element(tag) => Some(tag.clone()),
            _ => None,
        }
    }

    /// Text of a text node.
    pub fn text_value(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Replace the text of a text node. No effect on other nodes.
    pub fn set_text(&self, text: &str) {
        if let NodeKind::Text(current) = &mut self.0.borrow_mut().kind {
            *current = text.to_string();
        }
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.upgrade().map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.clone()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.0.borrow().children.first().cloned()
    }

    /// Whether `self` is currently attached below `ancestor`.
    pub fn is_within(&self, ancestor: &Node) -> bool {
        let mut current = self.parent();
        while let Some(node) = current {
            if node.ptr_eq(ancestor) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    pub fn append_child(&self, child: &Node) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `anchor`, or at the end when `anchor` is `None`
    /// or not a child of `self`. A fragment contributes its children and is
    /// left empty.
    pub fn insert_before(&self, child: &Node, anchor: Option<&Node>) {
        let incoming = if child.is_fragment() {
            let moved = std::mem::take(&mut child.0.borrow_mut().children);
            for node in &moved {
                node.0.borrow_mut().parent = Weak::new();
            }
            moved
        } else {
            child.detach();
            vec![child.clone()]
        };

        for node in &incoming {
            node.0.borrow_mut().parent = Rc::downgrade(&self.0);
        }

        let mut data = self.0.borrow_mut();
        let position = anchor
            .and_then(|anchor| data.children.iter().position(|c| c.ptr_eq(anchor)))
            .unwrap_or(data.children.len());
        data.children.splice(position..position, incoming);
    }

    /// Remove this node from its parent, if it has one.
    pub fn detach(&self) {
        let Some(parent) = self.parent() else {
            return;
        };
        parent
            .0
            .borrow_mut()
            .children
            .retain(|c| !c.ptr_eq(self));
        self.0.borrow_mut().parent = Weak::new();
    }

    /// Serialize this node and its subtree.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    /// Serialize the children only.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for child in self.children() {
            child.write_html(&mut out);
        }
        out
    }

    fn write_html(&self, out: &mut String) {
        let data = self.0.borrow();
        match &data.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                out.push('>');
                for child in &data.children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            NodeKind::Fragment => {
                for child in &data.children {
                    child.write_html(out);
                }
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.to_html())
    }
}
