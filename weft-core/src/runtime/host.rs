//! Host Interface
//!
//! The renderer never touches a real UI tree directly. Every primitive
//! operation goes through [`HostOps`], an object-safe trait over opaque
//! [`HostId`] handles. A production embedder implements it against its
//! platform tree; tests use [`MemoryHost`], which keeps a real tree in
//! memory and records an operation log so diff tests can assert on exactly
//! what the renderer did.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use super::vnode::PropValue;

/// Opaque handle to one host-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostId(pub u64);

/// Which channel of an element a prop writes through.
///
/// Resolved from the prop name by [`channel_for`]; the host applies each
/// channel with platform-appropriate semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropChannel {
    /// A plain attribute.
    Attr,
    /// The class list.
    Class,
    /// The inline style.
    Style,
    /// An event handler subscription.
    Event,
}

/// Resolve the channel a prop name writes through.
///
/// `on`-prefixed names with a capitalized event (`onClick`) are handlers;
/// `class` and `style` get their own channels; everything else is an
/// attribute.
pub fn channel_for(name: &str) -> PropChannel {
    match name {
        "class" => PropChannel::Class,
        "style" => PropChannel::Style,
        _ if name.starts_with("on")
            && name.chars().nth(2).is_some_and(|c| c.is_ascii_uppercase()) =>
        {
            PropChannel::Event
        }
        _ => PropChannel::Attr,
    }
}

/// The primitive tree operations the renderer is written against.
pub trait HostOps {
    /// Create a detached element node.
    fn create_element(&self, tag: &str) -> HostId;
    /// Create a detached text node.
    fn create_text(&self, text: &str) -> HostId;
    /// Create a detached comment node (used as placeholders and anchors).
    fn create_comment(&self, text: &str) -> HostId;
    /// Replace the payload of a text node.
    fn set_text(&self, node: HostId, text: &str);
    /// Replace an element's children with a single text payload.
    fn set_element_text(&self, el: HostId, text: &str);
    /// Insert `node` into `parent` before `anchor`, or at the end.
    ///
    /// Inserting an already-parented node moves it.
    fn insert(&self, node: HostId, parent: HostId, anchor: Option<HostId>);
    /// Detach a node from its parent.
    fn remove(&self, node: HostId);
    /// The node's current parent, if attached.
    fn parent(&self, node: HostId) -> Option<HostId>;
    /// The node's next sibling, if any.
    fn next_sibling(&self, node: HostId) -> Option<HostId>;
    /// Write one prop through its channel. `None` removes it.
    fn patch_prop(&self, el: HostId, channel: PropChannel, name: &str, value: Option<&PropValue>);
}

// ----------------------------------------------------------------------------
// In-memory host
// ----------------------------------------------------------------------------

/// One recorded host operation.
///
/// `Move` is an insert of a node that already had a parent; diff tests
/// count moves and mounts separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    /// An element was created.
    CreateElement(String),
    /// A text node was created.
    CreateText(String),
    /// A comment node was created.
    CreateComment(String),
    /// A detached node was inserted.
    Insert,
    /// An attached node was re-inserted elsewhere.
    Move,
    /// A node was detached.
    Remove,
    /// A text payload changed.
    SetText(String),
    /// A prop was written or removed.
    PatchProp(String),
}

#[derive(Debug)]
enum NodeKind {
    Element(String),
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct MemoryNode {
    kind: NodeKind,
    parent: Option<HostId>,
    children: Vec<HostId>,
    attrs: IndexMap<String, String>,
    handlers: Vec<String>,
}

/// Reference [`HostOps`] implementation over an in-memory tree.
///
/// Keeps full parent/child structure plus an operation log. Intended for
/// tests and headless use.
#[derive(Default)]
pub struct MemoryHost {
    nodes: RefCell<HashMap<HostId, MemoryNode>>,
    next_id: RefCell<u64>,
    ops: RefCell<Vec<HostOp>>,
}

impl MemoryHost {
    /// Create an empty host with one root container.
    ///
    /// Returns the host and the container's id.
    pub fn new() -> (Rc<Self>, HostId) {
        let host = Rc::new(Self::default());
        let root = host.alloc(NodeKind::Element("root".into()));
        (host, root)
    }

    fn alloc(&self, kind: NodeKind) -> HostId {
        let mut next = self.next_id.borrow_mut();
        let id = HostId(*next);
        *next += 1;
        self.nodes.borrow_mut().insert(
            id,
            MemoryNode {
                kind,
                parent: None,
                children: Vec::new(),
                attrs: IndexMap::new(),
                handlers: Vec::new(),
            },
        );
        id
    }

    fn log(&self, op: HostOp) {
        self.ops.borrow_mut().push(op);
    }

    /// Snapshot of the operation log.
    pub fn ops(&self) -> Vec<HostOp> {
        self.ops.borrow().clone()
    }

    /// Clear the operation log; structure is untouched.
    pub fn clear_ops(&self) {
        self.ops.borrow_mut().clear();
    }

    /// Count log entries matching a predicate.
    pub fn count_ops(&self, pred: impl Fn(&HostOp) -> bool) -> usize {
        self.ops.borrow().iter().filter(|op| pred(op)).count()
    }

    /// The child ids of a node, in order.
    pub fn children_of(&self, parent: HostId) -> Vec<HostId> {
        self.nodes
            .borrow()
            .get(&parent)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// One attribute of an element.
    pub fn attr(&self, el: HostId, name: &str) -> Option<String> {
        self.nodes
            .borrow()
            .get(&el)
            .and_then(|n| n.attrs.get(name).cloned())
    }

    /// Render a node and its subtree to a compact string, for assertions.
    ///
    /// Elements render as `<tag>…</tag>`, text as-is, comments as `<!--…-->`.
    pub fn to_string(&self, node: HostId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        Self::write_node(&nodes, node, &mut out);
        out
    }

    fn write_node(nodes: &HashMap<HostId, MemoryNode>, id: HostId, out: &mut String) {
        let Some(node) = nodes.get(&id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &node.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(value);
                    out.push('"');
                }
                out.push('>');
                for child in &node.children {
                    Self::write_node(nodes, *child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn detach(&self, node: HostId) {
        let mut nodes = self.nodes.borrow_mut();
        let parent = nodes.get(&node).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(p) = nodes.get_mut(&parent) {
                p.children.retain(|c| *c != node);
            }
        }
        if let Some(n) = nodes.get_mut(&node) {
            n.parent = None;
        }
    }
}

impl HostOps for MemoryHost {
    fn create_element(&self, tag: &str) -> HostId {
        self.log(HostOp::CreateElement(tag.to_owned()));
        self.alloc(NodeKind::Element(tag.to_owned()))
    }

    fn create_text(&self, text: &str) -> HostId {
        self.log(HostOp::CreateText(text.to_owned()));
        self.alloc(NodeKind::Text(text.to_owned()))
    }

    fn create_comment(&self, text: &str) -> HostId {
        self.log(HostOp::CreateComment(text.to_owned()));
        self.alloc(NodeKind::Comment(text.to_owned()))
    }

    fn set_text(&self, node: HostId, text: &str) {
        self.log(HostOp::SetText(text.to_owned()));
        if let Some(n) = self.nodes.borrow_mut().get_mut(&node) {
            match &mut n.kind {
                NodeKind::Text(t) | NodeKind::Comment(t) => *t = text.to_owned(),
                NodeKind::Element(_) => {}
            }
        }
    }

    fn set_element_text(&self, el: HostId, text: &str) {
        // Drop existing children, then attach a single text node.
        let children = self.children_of(el);
        for child in children {
            self.detach(child);
        }
        let text_node = self.alloc(NodeKind::Text(text.to_owned()));
        self.log(HostOp::SetText(text.to_owned()));
        let mut nodes = self.nodes.borrow_mut();
        if let Some(n) = nodes.get_mut(&text_node) {
            n.parent = Some(el);
        }
        if let Some(n) = nodes.get_mut(&el) {
            n.children.push(text_node);
        }
    }

    fn insert(&self, node: HostId, parent: HostId, anchor: Option<HostId>) {
        let had_parent = self
            .nodes
            .borrow()
            .get(&node)
            .map(|n| n.parent.is_some())
            .unwrap_or(false);
        self.log(if had_parent { HostOp::Move } else { HostOp::Insert });

        self.detach(node);
        let mut nodes = self.nodes.borrow_mut();
        if let Some(n) = nodes.get_mut(&node) {
            n.parent = Some(parent);
        }
        if let Some(p) = nodes.get_mut(&parent) {
            let at = anchor
                .and_then(|a| p.children.iter().position(|c| *c == a))
                .unwrap_or(p.children.len());
            p.children.insert(at, node);
        }
    }

    fn remove(&self, node: HostId) {
        self.log(HostOp::Remove);
        self.detach(node);
    }

    fn parent(&self, node: HostId) -> Option<HostId> {
        self.nodes.borrow().get(&node).and_then(|n| n.parent)
    }

    fn next_sibling(&self, node: HostId) -> Option<HostId> {
        let nodes = self.nodes.borrow();
        let parent = nodes.get(&node).and_then(|n| n.parent)?;
        let siblings = &nodes.get(&parent)?.children;
        let at = siblings.iter().position(|c| *c == node)?;
        siblings.get(at + 1).copied()
    }

    fn patch_prop(&self, el: HostId, channel: PropChannel, name: &str, value: Option<&PropValue>) {
        self.log(HostOp::PatchProp(name.to_owned()));
        let mut nodes = self.nodes.borrow_mut();
        let Some(node) = nodes.get_mut(&el) else {
            return;
        };
        match channel {
            PropChannel::Event => {
                node.handlers.retain(|h| h != name);
                if value.is_some() {
                    node.handlers.push(name.to_owned());
                }
            }
            PropChannel::Attr | PropChannel::Class | PropChannel::Style => match value {
                Some(value) => {
                    node.attrs.insert(name.to_owned(), value.display());
                }
                None => {
                    node.attrs.shift_remove(name);
                }
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_resolution() {
        assert_eq!(channel_for("class"), PropChannel::Class);
        assert_eq!(channel_for("style"), PropChannel::Style);
        assert_eq!(channel_for("onClick"), PropChannel::Event);
        assert_eq!(channel_for("onPointerDown"), PropChannel::Event);
        // Lowercase after the prefix is a plain attribute, as is a bare "on".
        assert_eq!(channel_for("once"), PropChannel::Attr);
        assert_eq!(channel_for("on"), PropChannel::Attr);
        assert_eq!(channel_for("id"), PropChannel::Attr);
    }

    #[test]
    fn insert_and_remove_maintain_structure() {
        let (host, root) = MemoryHost::new();
        let a = host.create_element("a");
        let b = host.create_element("b");

        host.insert(a, root, None);
        host.insert(b, root, None);
        assert_eq!(host.children_of(root), vec![a, b]);

        let c = host.create_element("c");
        host.insert(c, root, Some(b));
        assert_eq!(host.children_of(root), vec![a, c, b]);

        host.remove(c);
        assert_eq!(host.children_of(root), vec![a, b]);
        assert_eq!(host.parent(c), None);
    }

    #[test]
    fn reinsert_of_attached_node_logs_a_move() {
        let (host, root) = MemoryHost::new();
        let a = host.create_element("a");
        let b = host.create_element("b");
        host.insert(a, root, None);
        host.insert(b, root, None);
        host.clear_ops();

        host.insert(b, root, Some(a));
        assert_eq!(host.ops(), vec![HostOp::Move]);
        assert_eq!(host.children_of(root), vec![b, a]);
    }

    #[test]
    fn next_sibling_walks_the_child_list() {
        let (host, root) = MemoryHost::new();
        let a = host.create_element("a");
        let b = host.create_element("b");
        host.insert(a, root, None);
        host.insert(b, root, None);

        assert_eq!(host.next_sibling(a), Some(b));
        assert_eq!(host.next_sibling(b), None);
    }

    #[test]
    fn tree_renders_to_string() {
        let (host, root) = MemoryHost::new();
        let div = host.create_element("div");
        host.patch_prop(
            div,
            PropChannel::Class,
            "class",
            Some(&PropValue::from("box")),
        );
        let text = host.create_text("hi");
        host.insert(div, root, None);
        host.insert(text, div, None);

        assert_eq!(host.to_string(root), "<root><div class=\"box\">hi</div></root>");
    }
}
