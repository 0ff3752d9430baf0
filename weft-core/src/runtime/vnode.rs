//! Virtual Nodes
//!
//! A [`VNode`] describes one node of the desired UI tree. The renderer
//! diffs an old tree against a new one and applies the difference through
//! the host interface.
//!
//! Nodes carry optimization hints computed at build time: a
//! [`patch_flags`] bitmask narrowing what can possibly have changed, and
//! an optional list of the prop names that are dynamic. A hinted node is
//! diffed along its hinted channels only; an unhinted node gets the full
//! diff.
//!
//! Mounted-state fields (`el`, `anchor`, `instance`) are interior-mutable:
//! the renderer fills them at mount and clears them at unmount, while the
//! describing fields stay immutable after construction.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::Error;
use crate::reactive::Value;

use super::component::{Component, ComponentInstance};
use super::host::HostId;

/// Patch-flag bitmask values.
///
/// Positive flags are OR-combined channels; negative flags are whole-node
/// markers that short-circuit the diff.
pub mod patch_flags {
    /// The element's text children are dynamic.
    pub const TEXT: i32 = 1;
    /// The `class` prop is dynamic.
    pub const CLASS: i32 = 1 << 1;
    /// The `style` prop is dynamic.
    pub const STYLE: i32 = 1 << 2;
    /// The props named in `dynamic_props` are dynamic.
    pub const PROPS: i32 = 1 << 3;
    /// Props have dynamic keys; the full prop set must be diffed.
    pub const FULL_PROPS: i32 = 1 << 4;
    /// A fragment whose children keep their order.
    pub const STABLE_FRAGMENT: i32 = 1 << 6;
    /// A fragment with fully keyed children.
    pub const KEYED_FRAGMENT: i32 = 1 << 7;
    /// A fragment with unkeyed children.
    pub const UNKEYED_FRAGMENT: i32 = 1 << 8;
    /// A hoisted static node, never diffed.
    pub const HOISTED: i32 = -1;
    /// Opt out of every fast path; full diff.
    pub const BAIL: i32 = -2;
}

/// Identity key for list diffing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A string key.
    Str(String),
    /// An integer key.
    Int(i64),
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Str(v.to_owned())
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

/// Shared event-handler closure. The argument is the event payload.
pub type Handler = Rc<dyn Fn(&Value) -> Result<(), Error>>;

/// One prop value.
///
/// Handlers compare by identity; everything else by value.
#[derive(Clone)]
pub enum PropValue {
    /// A string prop.
    Str(String),
    /// An integer prop.
    Int(i64),
    /// A float prop.
    Float(f64),
    /// A boolean prop.
    Bool(bool),
    /// An event handler.
    Handler(Handler),
}

impl PropValue {
    /// Wrap a closure as a handler prop.
    pub fn handler<F>(func: F) -> Self
    where
        F: Fn(&Value) -> Result<(), Error> + 'static,
    {
        PropValue::Handler(Rc::new(func))
    }

    /// The handler payload, if this is one.
    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            PropValue::Handler(h) => Some(h),
            _ => None,
        }
    }

    /// Render the value for an attribute write.
    pub fn display(&self) -> String {
        match self {
            PropValue::Str(s) => s.clone(),
            PropValue::Int(n) => n.to_string(),
            PropValue::Float(n) => n.to_string(),
            PropValue::Bool(b) => b.to_string(),
            PropValue::Handler(_) => "[handler]".to_owned(),
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropValue::Str(s) => write!(f, "Str({s:?})"),
            PropValue::Int(n) => write!(f, "Int({n})"),
            PropValue::Float(n) => write!(f, "Float({n})"),
            PropValue::Bool(b) => write!(f, "Bool({b})"),
            PropValue::Handler(_) => write!(f, "Handler"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float(v)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

/// The ordered prop map of a node.
pub type Props = IndexMap<String, PropValue>;

/// The node's type tag.
#[derive(Clone)]
pub enum VNodeType {
    /// A host element with a tag name.
    Element(String),
    /// A text node.
    Text,
    /// A comment node.
    Comment,
    /// A container with no host node of its own; its children mount
    /// between two anchor comments.
    Fragment,
    /// A subtree mounted once and never diffed again.
    Static,
    /// A component occurrence.
    Component(Rc<Component>),
}

impl std::fmt::Debug for VNodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VNodeType::Element(tag) => write!(f, "Element({tag})"),
            VNodeType::Text => write!(f, "Text"),
            VNodeType::Comment => write!(f, "Comment"),
            VNodeType::Fragment => write!(f, "Fragment"),
            VNodeType::Static => write!(f, "Static"),
            VNodeType::Component(def) => write!(f, "Component({})", def.name()),
        }
    }
}

/// The node's children.
#[derive(Clone, Debug)]
pub enum Children {
    /// No children.
    None,
    /// A single text payload (the element-text fast path).
    Text(String),
    /// A list of child nodes.
    Nodes(Vec<Rc<VNode>>),
}

/// One node of a virtual tree.
pub struct VNode {
    /// Type tag.
    pub kind: VNodeType,
    /// Ordered props.
    pub props: Props,
    /// Children.
    pub children: Children,
    /// Identity key for list diffing.
    pub key: Option<Key>,
    /// Patch-flag bitmask; 0 means full diff.
    pub patch_flag: i32,
    /// The dynamic prop names, when `PROPS` is set.
    pub dynamic_props: Option<Vec<String>>,
    /// The mounted host node. Fragments store their start anchor here.
    pub el: Cell<Option<HostId>>,
    /// A fragment's end anchor.
    pub anchor: Cell<Option<HostId>>,
    /// The mounted component instance, for component nodes.
    pub instance: RefCell<Option<Rc<ComponentInstance>>>,
}

impl VNode {
    /// General constructor; the builder helpers below cover common shapes.
    pub fn new(
        kind: VNodeType,
        props: Props,
        children: Children,
        key: Option<Key>,
        patch_flag: i32,
        dynamic_props: Option<Vec<String>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            kind,
            props,
            children,
            key,
            patch_flag,
            dynamic_props,
            el: Cell::new(None),
            anchor: Cell::new(None),
            instance: RefCell::new(None),
        })
    }

    /// A copy with cleared mounted state, for remounting a described tree.
    pub fn clone_fresh(self: &Rc<Self>) -> Rc<Self> {
        let children = match &self.children {
            Children::Nodes(nodes) => {
                Children::Nodes(nodes.iter().map(VNode::clone_fresh).collect())
            }
            other => other.clone(),
        };
        Self::new(
            self.kind.clone(),
            self.props.clone(),
            children,
            self.key.clone(),
            self.patch_flag,
            self.dynamic_props.clone(),
        )
    }

    /// The element tag, for element nodes.
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            VNodeType::Element(tag) => Some(tag),
            _ => None,
        }
    }

    /// The child node list, empty for other child shapes.
    pub fn child_nodes(&self) -> &[Rc<VNode>] {
        match &self.children {
            Children::Nodes(nodes) => nodes,
            _ => &[],
        }
    }
}

impl std::fmt::Debug for VNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VNode")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("patch_flag", &self.patch_flag)
            .field("el", &self.el.get())
            .finish()
    }
}

/// Whether two nodes describe the same logical node.
///
/// Same type tag (same element tag, same component definition) and equal
/// key. Different answers mean replace, equal answers mean patch in place.
pub fn same_node(a: &VNode, b: &VNode) -> bool {
    if a.key != b.key {
        return false;
    }
    match (&a.kind, &b.kind) {
        (VNodeType::Element(ta), VNodeType::Element(tb)) => ta == tb,
        (VNodeType::Text, VNodeType::Text) => true,
        (VNodeType::Comment, VNodeType::Comment) => true,
        (VNodeType::Fragment, VNodeType::Fragment) => true,
        (VNodeType::Static, VNodeType::Static) => true,
        (VNodeType::Component(da), VNodeType::Component(db)) => Rc::ptr_eq(da, db),
        _ => false,
    }
}

// ----------------------------------------------------------------------------
// Builders
// ----------------------------------------------------------------------------

/// A text node.
pub fn text(content: impl Into<String>) -> Rc<VNode> {
    VNode::new(
        VNodeType::Text,
        Props::new(),
        Children::Text(content.into()),
        None,
        0,
        None,
    )
}

/// A comment node.
pub fn comment(content: impl Into<String>) -> Rc<VNode> {
    VNode::new(
        VNodeType::Comment,
        Props::new(),
        Children::Text(content.into()),
        None,
        0,
        None,
    )
}

/// An element with child nodes and no hints (full diff).
pub fn element(tag: impl Into<String>, props: Props, children: Vec<Rc<VNode>>) -> Rc<VNode> {
    let children = if children.is_empty() {
        Children::None
    } else {
        Children::Nodes(children)
    };
    VNode::new(VNodeType::Element(tag.into()), props, children, None, 0, None)
}

/// An element whose only child is a text payload.
pub fn element_text(tag: impl Into<String>, props: Props, content: impl Into<String>) -> Rc<VNode> {
    VNode::new(
        VNodeType::Element(tag.into()),
        props,
        Children::Text(content.into()),
        None,
        0,
        None,
    )
}

/// An element with an explicit patch flag and dynamic-prop hint.
pub fn element_with(
    tag: impl Into<String>,
    props: Props,
    children: Children,
    patch_flag: i32,
    dynamic_props: Option<Vec<String>>,
) -> Rc<VNode> {
    VNode::new(
        VNodeType::Element(tag.into()),
        props,
        children,
        None,
        patch_flag,
        dynamic_props,
    )
}

/// A keyed element, for children of keyed fragments.
pub fn keyed_element(
    tag: impl Into<String>,
    key: impl Into<Key>,
    props: Props,
    children: Vec<Rc<VNode>>,
) -> Rc<VNode> {
    let children = if children.is_empty() {
        Children::None
    } else {
        Children::Nodes(children)
    };
    VNode::new(
        VNodeType::Element(tag.into()),
        props,
        children,
        Some(key.into()),
        0,
        None,
    )
}

/// A fragment. The keyed-ness hint is derived from the children: any key
/// routes the fragment through the keyed differ, which matches unkeyed
/// stragglers by a linear scan.
pub fn fragment(children: Vec<Rc<VNode>>) -> Rc<VNode> {
    let flag = if children.iter().any(|c| c.key.is_some()) {
        patch_flags::KEYED_FRAGMENT
    } else {
        patch_flags::UNKEYED_FRAGMENT
    };
    VNode::new(
        VNodeType::Fragment,
        Props::new(),
        Children::Nodes(children),
        None,
        flag,
        None,
    )
}

/// A hoisted static subtree: mounted once, skipped by every later diff.
pub fn static_node(children: Vec<Rc<VNode>>) -> Rc<VNode> {
    VNode::new(
        VNodeType::Static,
        Props::new(),
        Children::Nodes(children),
        None,
        patch_flags::HOISTED,
        None,
    )
}

/// A component occurrence.
pub fn component_node(def: Rc<Component>, props: Props) -> Rc<VNode> {
    VNode::new(
        VNodeType::Component(def),
        props,
        Children::None,
        None,
        0,
        None,
    )
}

/// A keyed component occurrence.
pub fn keyed_component_node(def: Rc<Component>, key: impl Into<Key>, props: Props) -> Rc<VNode> {
    VNode::new(
        VNodeType::Component(def),
        props,
        Children::None,
        Some(key.into()),
        0,
        None,
    )
}

/// Build a prop map from pairs.
pub fn props<const N: usize>(pairs: [(&str, PropValue); N]) -> Props {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
