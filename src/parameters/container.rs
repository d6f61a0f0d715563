//! Structural edits on parameter containers
//!
//! Adding or removing a child changes the flat index space of every ancestor.
//! Registries are shifted in place on the root, then [`Node::reconnect`]
//! recomputes the whole layout and swaps every node's storage window and
//! registry view in one pass.

use crate::error::{ParamzError, Result};
use crate::parameters::index_registry::RegistryView;
use crate::parameters::node::{Indexable, Named, Node, NodeKind, Storage};
use crate::parameters::observer::{Callback, Observable, PRIORITY_PASS_THROUGH};
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Position of one node in a freshly computed layout.
struct Slot {
    node: Node,
    offset: usize,
    size: usize,
}

/// Pre-order layout of the subtree at `node`, starting at `offset`.
fn layout(node: &Node, offset: usize, slots: &mut Vec<Slot>) -> usize {
    let position = slots.len();
    slots.push(Slot {
        node: node.clone(),
        offset,
        size: 0,
    });

    let size = if node.is_container() {
        node.children()
            .iter()
            .fold(0, |acc, child| acc + layout(child, offset + acc, slots))
    } else {
        node.size()
    };

    slots[position].size = size;
    size
}

impl Node {
    fn require_container(&self) -> Result<()> {
        if self.is_container() {
            Ok(())
        } else {
            Err(ParamzError::NotAContainer {
                name: self.hierarchy_name(),
            })
        }
    }

    /// Insert `node` as a child at `index` (appended when `None`).
    ///
    /// A node owned by another container is detached from it first. A node
    /// that is already a direct child is moved when `index` is given.
    pub fn add_parameter(&self, node: &Node, index: Option<usize>) -> Result<()> {
        self.require_container()?;

        let mut cursor = Some(self.clone());
        while let Some(current) = cursor {
            if current.ptr_eq(node) {
                return Err(ParamzError::HierarchyCycle {
                    parent: self.hierarchy_name(),
                    child: node.name(),
                });
            }
            cursor = current.parent();
        }

        // Containers left behind by a move, hooked once after the insert
        let mut vacated = Vec::new();
        if let Some(parent) = node.parent() {
            if parent.ptr_eq(self) {
                if index.is_none() {
                    return Err(ParamzError::DuplicateParameter {
                        name: node.name(),
                        container: self.hierarchy_name(),
                    });
                }
                self.detach(node)?;
            } else if node.is_descendant_of(self) {
                return Err(ParamzError::DuplicateParameter {
                    name: node.hierarchy_name(),
                    container: self.hierarchy_name(),
                });
            } else {
                vacated = parent.ancestry();
                parent.detach(node)?;
            }
        }

        let children = self.children();
        let index = index.map_or(children.len(), |i| i.min(children.len()));
        let start = self.offset() + children[..index].iter().map(Node::size).sum::<usize>();
        let size = node.size();

        // Make room in the root registries and merge the newcomer's entries
        let root = self.root();
        let constraints = node.constraints().to_registry();
        let priors = node.priors().to_registry();
        {
            let root_constraints = root.constraints();
            let mut registry = root_constraints.registry().borrow_mut();
            registry.shift_right(start, size);
            registry.update(&constraints, start);
        }
        {
            let root_priors = root.priors();
            let mut registry = root_priors.registry().borrow_mut();
            registry.shift_right(start, size);
            registry.update(&priors, start);
        }

        let requested = node.name();
        let unique = self.unique_child_name(&requested, None);
        if unique != requested {
            warn!(
                "name '{}' is taken in '{}', renaming to '{}'",
                requested,
                self.hierarchy_name(),
                unique
            );
            node.0.borrow_mut().name = unique;
        }

        if let NodeKind::Container { children, .. } = &mut self.0.borrow_mut().kind {
            children.insert(index, node.clone());
        }

        let weak = Rc::downgrade(&self.0);
        let pass_through: Callback<Node> = Rc::new(move |origin: &Node| {
            if let Some(inner) = weak.upgrade() {
                Node(inner).notify_observers(Some(origin), None);
            }
        });
        node.add_observer(self.id(), PRIORITY_PASS_THROUGH, pass_through);

        root.reconnect();
        debug!(
            "added '{}' to '{}' at index {}",
            node.name(),
            self.hierarchy_name(),
            index
        );

        let mut hooked = self.ancestry();
        for container in vacated {
            if !hooked.iter().any(|seen| seen.ptr_eq(&container)) {
                hooked.push(container);
            }
        }
        for container in hooked {
            container.parameters_changed();
        }
        Ok(())
    }

    /// Append every node in order.
    pub fn add_parameters(&self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.add_parameter(node, None)?;
        }
        Ok(())
    }

    /// Detach a direct child.
    ///
    /// The child keeps its current values and its transforms and priors in a
    /// private buffer and registry.
    pub fn remove_parameter(&self, node: &Node) -> Result<()> {
        self.detach(node)?;
        self.run_hooks_upward();
        Ok(())
    }

    /// Unlink a direct child and re-slice both trees without running hooks.
    fn detach(&self, node: &Node) -> Result<()> {
        self.require_container()?;

        let position = self
            .children()
            .iter()
            .position(|child| child.ptr_eq(node))
            .ok_or_else(|| ParamzError::ForeignParameter {
                name: node.name(),
                container: self.hierarchy_name(),
            })?;

        let start = node.offset();
        let size = node.size();
        let root = self.root();

        let constraints = {
            let root_constraints = root.constraints();
            let mut registry = root_constraints.registry().borrow_mut();
            let own = registry.restricted(start, size);
            registry.shift_left(start, size);
            own
        };
        let priors = {
            let root_priors = root.priors();
            let mut registry = root_priors.registry().borrow_mut();
            let own = registry.restricted(start, size);
            registry.shift_left(start, size);
            own
        };

        if let NodeKind::Container { children, .. } = &mut self.0.borrow_mut().kind {
            children.remove(position);
        }
        node.remove_observer(self.id());
        {
            let mut inner = node.0.borrow_mut();
            inner.parent = None;
            inner.parent_index = None;
            inner.constraints = RegistryView::owned(constraints, size);
            inner.priors = RegistryView::owned(priors, size);
        }

        // Copies the values out of the old tree before it is re-sliced
        node.reconnect();
        root.reconnect();
        debug!("removed '{}' from '{}'", node.name(), self.hierarchy_name());
        Ok(())
    }

    /// Recompute the layout of the tree rooted here and swap every view.
    ///
    /// Values and gradients are gathered from the leaves' current windows
    /// into a new buffer before anything is replaced.
    pub(crate) fn reconnect(&self) {
        let mut slots = Vec::new();
        let size = layout(self, 0, &mut slots);

        let mut storage = Storage {
            values: Vec::with_capacity(size),
            gradient: Vec::with_capacity(size),
        };
        for slot in slots.iter().filter(|slot| slot.node.is_leaf()) {
            let (old, offset, len) = slot.node.window();
            let old = old.borrow();
            storage.values.extend_from_slice(&old.values[offset..offset + len]);
            storage
                .gradient
                .extend_from_slice(&old.gradient[offset..offset + len]);
        }
        let storage = Rc::new(RefCell::new(storage));

        let constraints = Rc::clone(self.constraints().registry());
        let priors = Rc::clone(self.priors().registry());

        for slot in &slots {
            let children = slot.node.children();
            let names: Vec<String> = children.iter().map(Named::name).collect();
            {
                let mut inner = slot.node.0.borrow_mut();
                inner.storage = Rc::clone(&storage);
                inner.offset = slot.offset;
                inner.size = slot.size;
                inner.constraints =
                    RegistryView::new(Rc::clone(&constraints), slot.offset, slot.size);
                inner.priors = RegistryView::new(Rc::clone(&priors), slot.offset, slot.size);
                inner.fixes = None;
                if let NodeKind::Container { names: table, .. } = &mut inner.kind {
                    *table = names.into_iter().enumerate().map(|(i, n)| (n, i)).collect();
                }
            }

            let weak = Rc::downgrade(&slot.node.0);
            for (i, child) in children.iter().enumerate() {
                let mut inner = child.0.borrow_mut();
                inner.parent = Some(weak.clone());
                inner.parent_index = Some(i);
            }
        }

        self.rebuild_fixes();
    }

    /// Rebuild the root's fixed mask from the fixed transform's positions.
    pub(crate) fn rebuild_fixes(&self) {
        let fixed = self.constraints().indices_where(|t| t.is_fixed());
        let size = self.size();
        let fixes = if fixed.is_empty() {
            None
        } else {
            let mut mask = vec![false; size];
            for i in fixed.into_iter().filter(|&i| i < size) {
                mask[i] = true;
            }
            Some(mask)
        };
        self.0.borrow_mut().fixes = fixes;
    }

    /// `name`, or `name_1`, `name_2`, ... if a sibling other than `exclude` has it.
    pub(crate) fn unique_child_name(&self, name: &str, exclude: Option<&Node>) -> String {
        let taken: Vec<String> = self
            .children()
            .iter()
            .filter(|child| exclude.map_or(true, |node| !child.ptr_eq(node)))
            .map(Named::name)
            .collect();

        if !taken.iter().any(|n| n == name) {
            return name.to_string();
        }
        (1..)
            .map(|k| format!("{}_{}", name, k))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| name.to_string())
    }

    /// Re-key the child lookup table.
    pub(crate) fn rebuild_names(&self) {
        let names: Vec<String> = self.names();
        if let NodeKind::Container { names: table, .. } = &mut self.0.borrow_mut().kind {
            *table = names.into_iter().enumerate().map(|(i, n)| (n, i)).collect();
        }
    }

    /// This node followed by its ancestors, bottom-up.
    fn ancestry(&self) -> Vec<Node> {
        let mut chain = Vec::new();
        let mut cursor = Some(self.clone());
        while let Some(node) = cursor {
            cursor = node.parent();
            chain.push(node);
        }
        chain
    }

    /// Run the recompute hook here and on every ancestor, bottom-up.
    fn run_hooks_upward(&self) {
        for node in self.ancestry() {
            node.parameters_changed();
        }
    }
}
