//! Renderer
//!
//! The renderer turns virtual-tree differences into host operations. Its
//! entry points are [`Renderer::mount`], [`Renderer::patch`] and
//! [`Renderer::unmount`]; everything else is dispatch.
//!
//! Patch dispatch, per node pair:
//!
//! 1. Different type or key: unmount the old node, mount the new one in
//!    its place.
//! 2. Component: hand over to the instance, which bails out when no
//!    observed prop changed.
//! 3. Text and comment nodes: update the payload in place.
//! 4. Elements and fragments: diff props along the patch-flag channels,
//!    then diff children. Keyed child lists get the minimal-move
//!    treatment: prefix/suffix trim, then a Longest Increasing
//!    Subsequence over the surviving old positions decides which nodes
//!    stand still while the rest move around them.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::error::Error;

use super::component;
use super::host::{channel_for, HostId, HostOps};
use super::vnode::{patch_flags, same_node, Children, Key, Props, VNode, VNodeType};

/// Applies virtual-tree differences through a host.
///
/// Cheap to clone; clones share the host.
#[derive(Clone)]
pub struct Renderer {
    host: Rc<dyn HostOps>,
}

impl Renderer {
    /// Create a renderer over a host.
    pub fn new(host: Rc<dyn HostOps>) -> Self {
        Self { host }
    }

    /// The underlying host.
    pub fn host(&self) -> &Rc<dyn HostOps> {
        &self.host
    }

    /// Mount a node into `container` before `anchor`.
    pub fn mount(
        &self,
        vnode: &Rc<VNode>,
        container: HostId,
        anchor: Option<HostId>,
    ) -> Result<(), Error> {
        match &vnode.kind {
            VNodeType::Text => {
                let content = match &vnode.children {
                    Children::Text(t) => t.as_str(),
                    _ => "",
                };
                let el = self.host.create_text(content);
                vnode.el.set(Some(el));
                self.host.insert(el, container, anchor);
            }
            VNodeType::Comment => {
                let content = match &vnode.children {
                    Children::Text(t) => t.as_str(),
                    _ => "",
                };
                let el = self.host.create_comment(content);
                vnode.el.set(Some(el));
                self.host.insert(el, container, anchor);
            }
            VNodeType::Element(tag) => {
                let el = self.host.create_element(tag);
                vnode.el.set(Some(el));
                for (name, value) in &vnode.props {
                    self.host
                        .patch_prop(el, channel_for(name), name, Some(value));
                }
                match &vnode.children {
                    Children::None => {}
                    Children::Text(text) => self.host.set_element_text(el, text),
                    Children::Nodes(children) => {
                        self.mount_children(children, el, None)?;
                    }
                }
                self.host.insert(el, container, anchor);
            }
            VNodeType::Fragment => {
                // A fragment owns no host node; its children live between
                // two comment anchors.
                let start = self.host.create_comment("");
                let end = self.host.create_comment("");
                vnode.el.set(Some(start));
                vnode.anchor.set(Some(end));
                self.host.insert(start, container, anchor);
                self.host.insert(end, container, anchor);
                self.mount_children(vnode.child_nodes(), container, Some(end))?;
            }
            VNodeType::Static => {
                self.mount_children(vnode.child_nodes(), container, anchor)?;
                vnode
                    .el
                    .set(vnode.child_nodes().first().and_then(|c| c.el.get()));
                vnode
                    .anchor
                    .set(vnode.child_nodes().last().and_then(|c| c.el.get()));
            }
            VNodeType::Component(_) => {
                component::mount_component(self, vnode, container, anchor)?;
            }
        }
        Ok(())
    }

    fn mount_children(
        &self,
        children: &[Rc<VNode>],
        container: HostId,
        anchor: Option<HostId>,
    ) -> Result<(), Error> {
        for child in children {
            self.mount(child, container, anchor)?;
        }
        Ok(())
    }

    /// Diff `old` against `new` and apply the difference.
    pub fn patch(
        &self,
        old: &Rc<VNode>,
        new: &Rc<VNode>,
        container: HostId,
        anchor: Option<HostId>,
    ) -> Result<(), Error> {
        if Rc::ptr_eq(old, new) {
            return Ok(());
        }

        if !same_node(old, new) {
            // Replace: the new node takes the old one's slot.
            let at = self.next_host_sibling(old);
            self.unmount(old);
            return self.mount(new, container, at.or(anchor));
        }

        match &new.kind {
            VNodeType::Text => {
                let el = old.el.get();
                new.el.set(el);
                if let (Some(el), Children::Text(text)) = (el, &new.children) {
                    if !matches!(&old.children, Children::Text(t) if t == text) {
                        self.host.set_text(el, text);
                    }
                }
            }
            VNodeType::Comment => {
                new.el.set(old.el.get());
            }
            VNodeType::Static => {
                // Hoisted content is mounted once and carried forward.
                new.el.set(old.el.get());
                new.anchor.set(old.anchor.get());
            }
            VNodeType::Element(_) => {
                let el = old.el.get().ok_or_else(|| {
                    Error::Render("patch target element was never mounted".into())
                })?;
                new.el.set(Some(el));
                self.patch_element(old, new, el)?;
            }
            VNodeType::Fragment => {
                new.el.set(old.el.get());
                new.anchor.set(old.anchor.get());
                let end = new.anchor.get();
                self.patch_children(
                    old.child_nodes(),
                    new.child_nodes(),
                    container,
                    end,
                    new.patch_flag == patch_flags::KEYED_FRAGMENT,
                )?;
            }
            VNodeType::Component(_) => {
                component::update_component(old, new)?;
            }
        }
        Ok(())
    }

    fn patch_element(&self, old: &Rc<VNode>, new: &Rc<VNode>, el: HostId) -> Result<(), Error> {
        let flag = new.patch_flag;

        if flag > 0 {
            // Compiled hints: only the flagged channels can have changed.
            if flag & patch_flags::FULL_PROPS != 0 {
                self.patch_props(el, &old.props, &new.props);
            } else {
                if flag & patch_flags::CLASS != 0 {
                    self.patch_one_prop(el, &old.props, &new.props, "class");
                }
                if flag & patch_flags::STYLE != 0 {
                    self.patch_one_prop(el, &old.props, &new.props, "style");
                }
                if flag & patch_flags::PROPS != 0 {
                    if let Some(names) = &new.dynamic_props {
                        for name in names {
                            self.patch_one_prop(el, &old.props, &new.props, name);
                        }
                    }
                }
            }
            if flag & patch_flags::TEXT != 0 {
                if let Children::Text(text) = &new.children {
                    if !matches!(&old.children, Children::Text(t) if t == text) {
                        self.host.set_element_text(el, text);
                    }
                }
                return Ok(());
            }
        } else {
            // No hints (or BAIL): full prop diff.
            self.patch_props(el, &old.props, &new.props);
        }

        self.patch_element_children(old, new, el)
    }

    fn patch_element_children(
        &self,
        old: &Rc<VNode>,
        new: &Rc<VNode>,
        el: HostId,
    ) -> Result<(), Error> {
        match (&old.children, &new.children) {
            (Children::Text(a), Children::Text(b)) => {
                if a != b {
                    self.host.set_element_text(el, b);
                }
            }
            (_, Children::Text(text)) => {
                self.unmount_children(old.child_nodes());
                self.host.set_element_text(el, text);
            }
            (Children::Text(_), Children::Nodes(children)) => {
                self.host.set_element_text(el, "");
                self.mount_children(children, el, None)?;
            }
            (Children::Nodes(old_children), Children::Nodes(new_children)) => {
                // Any key on either side is enough: the keyed differ matches
                // the unkeyed stragglers by a linear scan.
                let keyed = new_children.iter().any(|c| c.key.is_some())
                    || old_children.iter().any(|c| c.key.is_some());
                self.patch_children(old_children, new_children, el, None, keyed)?;
            }
            (Children::None, Children::Nodes(children)) => {
                self.mount_children(children, el, None)?;
            }
            (Children::Nodes(old_children), Children::None) => {
                self.unmount_children(old_children);
            }
            (Children::Text(_), Children::None) => {
                self.host.set_element_text(el, "");
            }
            (Children::None, Children::None) => {}
        }
        Ok(())
    }

    fn patch_props(&self, el: HostId, old: &Props, new: &Props) {
        for (name, value) in new {
            if old.get(name) != Some(value) {
                self.host
                    .patch_prop(el, channel_for(name), name, Some(value));
            }
        }
        for name in old.keys() {
            if !new.contains_key(name) {
                self.host.patch_prop(el, channel_for(name), name, None);
            }
        }
    }

    fn patch_one_prop(&self, el: HostId, old: &Props, new: &Props, name: &str) {
        let next = new.get(name);
        if old.get(name) != next {
            self.host.patch_prop(el, channel_for(name), name, next);
        }
    }

    fn patch_children(
        &self,
        old: &[Rc<VNode>],
        new: &[Rc<VNode>],
        container: HostId,
        anchor: Option<HostId>,
        keyed: bool,
    ) -> Result<(), Error> {
        if keyed {
            self.patch_keyed_children(old, new, container, anchor)
        } else {
            self.patch_unkeyed_children(old, new, container, anchor)
        }
    }

    /// Unkeyed diff: patch the common prefix by position, then mount or
    /// unmount the tail.
    fn patch_unkeyed_children(
        &self,
        old: &[Rc<VNode>],
        new: &[Rc<VNode>],
        container: HostId,
        anchor: Option<HostId>,
    ) -> Result<(), Error> {
        let common = old.len().min(new.len());
        for i in 0..common {
            self.patch(&old[i], &new[i], container, anchor)?;
        }
        if new.len() > common {
            self.mount_children(&new[common..], container, anchor)?;
        } else {
            self.unmount_children(&old[common..]);
        }
        Ok(())
    }

    /// Keyed diff with minimal host movement.
    fn patch_keyed_children(
        &self,
        old: &[Rc<VNode>],
        new: &[Rc<VNode>],
        container: HostId,
        parent_anchor: Option<HostId>,
    ) -> Result<(), Error> {
        let mut i = 0usize;
        let mut e1 = old.len() as isize - 1;
        let mut e2 = new.len() as isize - 1;

        // Sync the stable prefix.
        while (i as isize) <= e1 && (i as isize) <= e2 && same_node(&old[i], &new[i]) {
            self.patch(&old[i], &new[i], container, parent_anchor)?;
            i += 1;
        }

        // Sync the stable suffix.
        while (i as isize) <= e1 && (i as isize) <= e2 && same_node(&old[e1 as usize], &new[e2 as usize]) {
            self.patch(&old[e1 as usize], &new[e2 as usize], container, parent_anchor)?;
            e1 -= 1;
            e2 -= 1;
        }

        if i as isize > e1 {
            // Old side exhausted: whatever is left on the new side mounts
            // before the node just past the new range.
            if i as isize <= e2 {
                let at = self.anchor_after(new, e2, parent_anchor);
                for node in &new[i..=(e2 as usize)] {
                    self.mount(node, container, at)?;
                }
            }
            return Ok(());
        }

        if i as isize > e2 {
            // New side exhausted: the leftover old nodes go away.
            for node in &old[i..=(e1 as usize)] {
                self.unmount(node);
            }
            return Ok(());
        }

        // Unknown middle.
        let s1 = i;
        let s2 = i;
        let count = (e2 - s2 as isize + 1) as usize;

        let mut key_to_new: HashMap<&Key, usize> = HashMap::with_capacity(count);
        for (offset, node) in new[s2..=(e2 as usize)].iter().enumerate() {
            if let Some(key) = &node.key {
                key_to_new.insert(key, s2 + offset);
            }
        }

        // For each new-middle slot, the old index it matched, plus one;
        // zero means it has no old counterpart and must mount.
        let mut new_index_to_old = vec![0usize; count];
        let mut patched = 0usize;
        let mut moved = false;
        let mut max_new_index_so_far = 0usize;

        for (offset, node) in old[s1..=(e1 as usize)].iter().enumerate() {
            let old_index = s1 + offset;
            if patched >= count {
                // Every new slot already has a match; the rest of the old
                // middle is surplus.
                self.unmount(node);
                continue;
            }
            let new_index = match &node.key {
                Some(key) => key_to_new.get(key).copied(),
                // Unkeyed straggler: linear scan for an unmatched slot of
                // the same type in the remaining new range.
                None => new[s2..=(e2 as usize)]
                    .iter()
                    .enumerate()
                    .find(|&(offset, candidate)| {
                        new_index_to_old[offset] == 0 && same_node(node, candidate)
                    })
                    .map(|(offset, _)| s2 + offset),
            };
            match new_index {
                None => self.unmount(node),
                Some(new_index) => {
                    new_index_to_old[new_index - s2] = old_index + 1;
                    if new_index >= max_new_index_so_far {
                        max_new_index_so_far = new_index;
                    } else {
                        moved = true;
                    }
                    self.patch(node, &new[new_index], container, parent_anchor)?;
                    patched += 1;
                }
            }
        }

        // The longest run of old nodes already in the right relative order
        // stays put; everything else moves or mounts, back to front so each
        // insertion anchor is already final.
        let stable = if moved {
            longest_increasing_run(&new_index_to_old)
        } else {
            Vec::new()
        };
        let mut j = stable.len() as isize - 1;

        for offset in (0..count).rev() {
            let new_index = s2 + offset;
            let at = self.anchor_after(new, new_index as isize, parent_anchor);
            if new_index_to_old[offset] == 0 {
                self.mount(&new[new_index], container, at)?;
            } else if moved {
                if j < 0 || offset != stable[j as usize] {
                    trace!(index = new_index, "child moved");
                    self.move_node(&new[new_index], container, at);
                } else {
                    j -= 1;
                }
            }
        }

        Ok(())
    }

    // The host anchor just past new[index]: the next sibling's first host
    // node, or the parent list's own anchor at the end.
    fn anchor_after(
        &self,
        new: &[Rc<VNode>],
        index: isize,
        parent_anchor: Option<HostId>,
    ) -> Option<HostId> {
        let next = (index + 1) as usize;
        if next < new.len() {
            first_host_node(&new[next]).or(parent_anchor)
        } else {
            parent_anchor
        }
    }

    /// Re-insert a mounted node (and everything it spans) at a new position.
    pub fn move_node(&self, vnode: &Rc<VNode>, container: HostId, anchor: Option<HostId>) {
        match &vnode.kind {
            VNodeType::Fragment => {
                if let Some(start) = vnode.el.get() {
                    self.host.insert(start, container, anchor);
                }
                for child in vnode.child_nodes() {
                    self.move_node(child, container, anchor);
                }
                if let Some(end) = vnode.anchor.get() {
                    self.host.insert(end, container, anchor);
                }
            }
            VNodeType::Static => {
                for child in vnode.child_nodes() {
                    self.move_node(child, container, anchor);
                }
            }
            VNodeType::Component(_) => {
                let subtree = vnode
                    .instance
                    .borrow()
                    .as_ref()
                    .and_then(|inst| inst.subtree());
                if let Some(subtree) = subtree {
                    self.move_node(&subtree, container, anchor);
                } else if let Some(placeholder) =
                    vnode.instance.borrow().as_ref().and_then(|i| i.placeholder())
                {
                    self.host.insert(placeholder, container, anchor);
                }
            }
            _ => {
                if let Some(el) = vnode.el.get() {
                    self.host.insert(el, container, anchor);
                }
            }
        }
    }

    /// Unmount a node: fire component teardown, then detach its host nodes.
    pub fn unmount(&self, vnode: &Rc<VNode>) {
        self.unmount_inner(vnode, true);
    }

    fn unmount_children(&self, children: &[Rc<VNode>]) {
        for child in children {
            self.unmount_inner(child, true);
        }
    }

    fn unmount_inner(&self, vnode: &Rc<VNode>, detach: bool) {
        match &vnode.kind {
            VNodeType::Component(_) => {
                let instance = vnode.instance.borrow().clone();
                if let Some(instance) = instance {
                    instance.unmount();
                }
                vnode.instance.borrow_mut().take();
            }
            VNodeType::Fragment => {
                // Children detach individually; then the anchors go.
                for child in vnode.child_nodes() {
                    self.unmount_inner(child, detach);
                }
                if detach {
                    if let Some(start) = vnode.el.take() {
                        self.host.remove(start);
                    }
                    if let Some(end) = vnode.anchor.take() {
                        self.host.remove(end);
                    }
                }
            }
            VNodeType::Static => {
                for child in vnode.child_nodes() {
                    self.unmount_inner(child, detach);
                }
                vnode.el.set(None);
                vnode.anchor.set(None);
            }
            _ => {
                // Detaching the element takes its whole host subtree with
                // it; descendants only need their teardown pass.
                for child in vnode.child_nodes() {
                    self.unmount_inner(child, false);
                }
                if let Some(el) = vnode.el.take() {
                    if detach {
                        self.host.remove(el);
                    }
                }
            }
        }
    }

    // The anchor a replacement should mount at: whatever currently follows
    // the node's last host node.
    fn next_host_sibling(&self, vnode: &Rc<VNode>) -> Option<HostId> {
        last_host_node(vnode).and_then(|id| self.host.next_sibling(id))
    }
}

/// The first host node a vnode spans, crossing fragment and component
/// boundaries.
pub fn first_host_node(vnode: &Rc<VNode>) -> Option<HostId> {
    match &vnode.kind {
        VNodeType::Component(_) => {
            let instance = vnode.instance.borrow().clone()?;
            match instance.subtree() {
                Some(subtree) => first_host_node(&subtree),
                None => instance.placeholder(),
            }
        }
        _ => vnode.el.get(),
    }
}

/// The last host node a vnode spans.
pub fn last_host_node(vnode: &Rc<VNode>) -> Option<HostId> {
    match &vnode.kind {
        VNodeType::Fragment | VNodeType::Static => vnode.anchor.get(),
        VNodeType::Component(_) => {
            let instance = vnode.instance.borrow().clone()?;
            match instance.subtree() {
                Some(subtree) => last_host_node(&subtree),
                None => instance.placeholder(),
            }
        }
        _ => vnode.el.get(),
    }
}

/// Indices of the longest strictly-increasing run of nonzero entries.
///
/// Classic patience-sorting form with predecessor links; `arr[i] == 0`
/// entries are fresh mounts and never participate.
fn longest_increasing_run(arr: &[usize]) -> Vec<usize> {
    let mut predecessors = vec![0usize; arr.len()];
    let mut result: Vec<usize> = Vec::new();

    for (i, &value) in arr.iter().enumerate() {
        if value == 0 {
            continue;
        }
        if let Some(&last) = result.last() {
            if arr[last] < value {
                predecessors[i] = last;
                result.push(i);
                continue;
            }
        } else {
            result.push(i);
            continue;
        }

        let mut lo = 0usize;
        let mut hi = result.len() - 1;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if arr[result[mid]] < value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if value < arr[result[lo]] {
            if lo > 0 {
                predecessors[i] = result[lo - 1];
            }
            result[lo] = i;
        }
    }

    let mut u = result.len();
    if u > 0 {
        let mut last = result[u - 1];
        while u > 0 {
            u -= 1;
            result[u] = last;
            last = predecessors[last];
        }
    }
    result
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::host::{HostOp, MemoryHost};
    use crate::runtime::vnode::{
        element, element_text, fragment, keyed_element, props, text, PropValue,
    };

    fn keyed_list(keys: &[&str]) -> Rc<VNode> {
        fragment(
            keys.iter()
                .map(|k| keyed_element("li", *k, Props::new(), vec![text(*k)]))
                .collect(),
        )
    }

    fn moves(host: &MemoryHost) -> usize {
        host.count_ops(|op| matches!(op, HostOp::Move))
    }

    fn mounts(host: &MemoryHost) -> usize {
        host.count_ops(|op| matches!(op, HostOp::CreateElement(_)))
    }

    fn removes(host: &MemoryHost) -> usize {
        host.count_ops(|op| matches!(op, HostOp::Remove))
    }

    fn list_text(host: &MemoryHost, root: HostId) -> String {
        let rendered = host.to_string(root);
        rendered
            .replace("<root>", "")
            .replace("</root>", "")
            .replace("<!---->", "")
            .replace("<li>", "")
            .replace("</li>", " ")
            .trim()
            .replace(' ', ",")
    }

    #[test]
    fn mounts_an_element_tree() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let tree = element(
            "div",
            props([("class", PropValue::from("box"))]),
            vec![element_text("span", Props::new(), "hi")],
        );
        renderer.mount(&tree, root, None).unwrap();
        assert_eq!(
            host.to_string(root),
            "<root><div class=\"box\"><span>hi</span></div></root>"
        );
    }

    #[test]
    fn patches_text_in_place() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = element_text("p", Props::new(), "one");
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = element_text("p", Props::new(), "two");
        renderer.patch(&old, &new, root, None).unwrap();
        assert_eq!(mounts(&host), 0);
        assert_eq!(host.to_string(root), "<root><p>two</p></root>");
    }

    #[test]
    fn replaces_on_tag_mismatch() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = element_text("p", Props::new(), "x");
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = element_text("h1", Props::new(), "x");
        renderer.patch(&old, &new, root, None).unwrap();
        assert_eq!(removes(&host), 1);
        assert_eq!(host.to_string(root), "<root><h1>x</h1></root>");
    }

    #[test]
    fn prop_diff_writes_only_changes() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = element(
            "div",
            props([
                ("class", PropValue::from("a")),
                ("id", PropValue::from("same")),
            ]),
            vec![],
        );
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = element(
            "div",
            props([
                ("class", PropValue::from("b")),
                ("id", PropValue::from("same")),
            ]),
            vec![],
        );
        renderer.patch(&old, &new, root, None).unwrap();
        assert_eq!(
            host.ops(),
            vec![HostOp::PatchProp("class".into())],
        );
    }

    #[test]
    fn removed_prop_is_cleared() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = element("div", props([("id", PropValue::from("x"))]), vec![]);
        renderer.mount(&old, root, None).unwrap();

        let new = element("div", Props::new(), vec![]);
        renderer.patch(&old, &new, root, None).unwrap();
        assert_eq!(host.attr(old.el.get().unwrap(), "id"), None);
    }

    #[test]
    fn rotation_is_one_move() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = keyed_list(&["a", "b", "c", "d"]);
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = keyed_list(&["d", "a", "b", "c"]);
        renderer.patch(&old, &new, root, None).unwrap();

        assert_eq!(moves(&host), 1);
        assert_eq!(mounts(&host), 0);
        assert_eq!(removes(&host), 0);
        assert_eq!(list_text(&host, root), "d,a,b,c");
    }

    #[test]
    fn swap_with_new_tail_is_one_mount_and_one_move() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = keyed_list(&["a", "b", "c"]);
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = keyed_list(&["a", "c", "b", "e"]);
        renderer.patch(&old, &new, root, None).unwrap();

        assert_eq!(mounts(&host), 1);
        assert_eq!(moves(&host), 1);
        assert_eq!(removes(&host), 0);
        assert_eq!(list_text(&host, root), "a,c,b,e");
    }

    #[test]
    fn keyed_removal_unmounts_only_the_missing_node() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = keyed_list(&["a", "b", "c"]);
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = keyed_list(&["a", "c"]);
        renderer.patch(&old, &new, root, None).unwrap();

        assert_eq!(mounts(&host), 0);
        assert_eq!(list_text(&host, root), "a,c");
    }

    #[test]
    fn reversal_keeps_one_node_still() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = keyed_list(&["a", "b", "c", "d"]);
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = keyed_list(&["d", "c", "b", "a"]);
        renderer.patch(&old, &new, root, None).unwrap();

        // A full reversal has an increasing run of length one, so three of
        // the four nodes move.
        assert_eq!(moves(&host), 3);
        assert_eq!(list_text(&host, root), "d,c,b,a");
    }

    #[test]
    fn unkeyed_diff_patches_by_position() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = fragment(vec![
            element_text("li", Props::new(), "one"),
            element_text("li", Props::new(), "two"),
        ]);
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = fragment(vec![
            element_text("li", Props::new(), "uno"),
            element_text("li", Props::new(), "dos"),
            element_text("li", Props::new(), "tres"),
        ]);
        renderer.patch(&old, &new, root, None).unwrap();

        assert_eq!(mounts(&host), 1);
        assert_eq!(moves(&host), 0);
    }

    #[test]
    fn hoisted_static_subtree_is_never_diffed() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = crate::runtime::vnode::static_node(vec![element_text(
            "footer",
            Props::new(),
            "fine print",
        )]);
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = old.clone_fresh();
        renderer.patch(&old, &new, root, None).unwrap();
        assert!(host.ops().is_empty());
        assert_eq!(new.el.get(), old.el.get());
    }

    #[test]
    fn partially_keyed_lists_reuse_unkeyed_nodes() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = element(
            "ul",
            Props::new(),
            vec![
                keyed_element("li", "a", Props::new(), vec![text("a")]),
                element_text("li", Props::new(), "sep"),
                keyed_element("li", "b", Props::new(), vec![text("b")]),
            ],
        );
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = element(
            "ul",
            Props::new(),
            vec![
                keyed_element("li", "b", Props::new(), vec![text("b")]),
                element_text("li", Props::new(), "sep2"),
                keyed_element("li", "a", Props::new(), vec![text("a")]),
            ],
        );
        renderer.patch(&old, &new, root, None).unwrap();

        // The unkeyed separator is matched in place and repatched; nothing
        // is thrown away or recreated.
        assert_eq!(mounts(&host), 0);
        assert_eq!(removes(&host), 0);
        assert_eq!(moves(&host), 2);
        assert_eq!(
            host.count_ops(|op| matches!(op, HostOp::SetText(t) if t.as_str() == "sep2")),
            1
        );
        assert_eq!(
            host.to_string(root),
            "<root><ul><li>b</li><li>sep2</li><li>a</li></ul></root>"
        );
    }

    #[test]
    fn text_flag_skips_the_prop_diff() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = crate::runtime::vnode::element_with(
            "p",
            props([("class", PropValue::from("a"))]),
            Children::Text("one".into()),
            patch_flags::TEXT,
            None,
        );
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        // The class also changed, but the hint says only text can move.
        let new = crate::runtime::vnode::element_with(
            "p",
            props([("class", PropValue::from("b"))]),
            Children::Text("two".into()),
            patch_flags::TEXT,
            None,
        );
        renderer.patch(&old, &new, root, None).unwrap();
        assert_eq!(host.ops(), vec![HostOp::SetText("two".into())]);
    }

    #[test]
    fn dynamic_props_hint_narrows_the_diff() {
        let (host, root) = MemoryHost::new();
        let renderer = Renderer::new(host.clone());

        let old = crate::runtime::vnode::element_with(
            "div",
            props([
                ("id", PropValue::from("x")),
                ("title", PropValue::from("t1")),
            ]),
            Children::None,
            patch_flags::PROPS,
            Some(vec!["title".into()]),
        );
        renderer.mount(&old, root, None).unwrap();
        host.clear_ops();

        let new = crate::runtime::vnode::element_with(
            "div",
            props([
                ("id", PropValue::from("y")),
                ("title", PropValue::from("t2")),
            ]),
            Children::None,
            patch_flags::PROPS,
            Some(vec!["title".into()]),
        );
        renderer.patch(&old, &new, root, None).unwrap();
        // Only the hinted prop is diffed; the id change is invisible by
        // contract.
        assert_eq!(host.ops(), vec![HostOp::PatchProp("title".into())]);
    }

    #[test]
    fn increasing_run_extraction() {
        assert_eq!(longest_increasing_run(&[2, 3, 1, 4]), vec![0, 1, 3]);
        assert_eq!(longest_increasing_run(&[4, 3, 2, 1]), vec![3]);
        // Zeroes are fresh mounts and never join the run.
        assert_eq!(longest_increasing_run(&[0, 2, 0, 3]), vec![1, 3]);
        assert_eq!(longest_increasing_run(&[]), Vec::<usize>::new());
    }
}
