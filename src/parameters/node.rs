//! Parameter tree nodes
//!
//! A [`Node`] is a shared handle to one vertex of a parameter tree. Leaves
//! carry a shaped numeric payload; containers carry an ordered list of
//! children. Either way the numbers live in a single [`Storage`] arena owned
//! by the root of the tree, and every node only remembers where its window
//! starts (`offset`) and how long it is (`size`).
//!
//! ```
//! use paramz_rs::parameters::{Indexable, Node};
//!
//! let model = Node::container("model");
//! let variance = Node::param("variance", vec![1.0]);
//! let lengthscale = Node::param("lengthscale", vec![0.5, 2.0]);
//! model.add_parameters(&[variance.clone(), lengthscale.clone()]).unwrap();
//!
//! assert_eq!(model.size(), 3);
//! assert_eq!(model.values(), vec![1.0, 0.5, 2.0]);
//!
//! lengthscale.set(&[4.0, 8.0]).unwrap();
//! assert_eq!(model.values(), vec![1.0, 4.0, 8.0]);
//! ```

use crate::error::{ParamzError, Result};
use crate::parameters::index_registry::{IndexRegistry, RegistryView};
use crate::parameters::observer::{
    Callback, Observable, ObserverBus, ObserverId, PRIORITY_PARAMETERS_CHANGED,
};
use crate::parameters::priors::Prior;
use crate::parameters::transform::Transform;
use ndarray::{ArrayD, IxDyn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Backing value and gradient buffers of one tree.
#[derive(Debug, Default, Clone)]
pub(crate) struct Storage {
    pub(crate) values: Vec<f64>,
    pub(crate) gradient: Vec<f64>,
}

impl Storage {
    pub(crate) fn new(values: Vec<f64>) -> Self {
        let gradient = vec![0.0; values.len()];
        Self { values, gradient }
    }
}

pub(crate) type SharedStorage = Rc<RefCell<Storage>>;

/// Recompute hook installed with [`Node::set_parameters_changed`].
pub(crate) type Hook = Rc<dyn Fn(&Node)>;

pub(crate) enum NodeKind {
    Leaf {
        shape: Vec<usize>,
    },
    Container {
        children: Vec<Node>,
        names: HashMap<String, usize>,
    },
}

pub(crate) struct NodeInner {
    pub(crate) id: ObserverId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) size: usize,
    pub(crate) storage: SharedStorage,
    pub(crate) offset: usize,
    pub(crate) constraints: RegistryView<Transform>,
    pub(crate) priors: RegistryView<Prior>,
    /// Only maintained on the root. `None` when nothing is fixed.
    pub(crate) fixes: Option<Vec<bool>>,
    pub(crate) parent: Option<Weak<RefCell<NodeInner>>>,
    pub(crate) parent_index: Option<usize>,
    pub(crate) observers: ObserverBus<Node>,
    pub(crate) hook: Option<Hook>,
}

/// Shared handle to a parameter or a parameter container.
///
/// Cloning a `Node` clones the handle, not the parameter. Two handles are
/// equal when they point at the same node.
#[derive(Clone)]
pub struct Node(pub(crate) Rc<RefCell<NodeInner>>);

/// Naming capability.
pub trait Named {
    fn name(&self) -> String;

    /// Change the name. Inside a container the name is made unique among
    /// the siblings and the parent's lookup table is re-keyed.
    fn rename(&self, name: &str);

    /// Dotted path from the root, e.g. `model.kern.variance`.
    fn hierarchy_name(&self) -> String;
}

/// Position of a node inside the flat parameter vector of its tree.
pub trait Indexable {
    /// Number of scalar entries.
    fn size(&self) -> usize;

    /// Start of this node's window inside the root buffer.
    fn offset(&self) -> usize;

    /// Flat root positions covered by this node.
    fn raveled_index(&self) -> Vec<usize>;

    /// Offset of `descendant` relative to this node, if it lives in this subtree.
    fn offset_for(&self, descendant: &Node) -> Option<usize>;
}

impl Node {
    fn with_kind(name: &str, kind: NodeKind, values: Vec<f64>) -> Self {
        let size = values.len();
        let inner = NodeInner {
            id: ObserverId::next(),
            name: name.to_string(),
            kind,
            size,
            storage: Rc::new(RefCell::new(Storage::new(values))),
            offset: 0,
            constraints: RegistryView::owned(IndexRegistry::new(), size),
            priors: RegistryView::owned(IndexRegistry::new(), size),
            fixes: None,
            parent: None,
            parent_index: None,
            observers: ObserverBus::new(),
            hook: None,
        };
        let node = Node(Rc::new(RefCell::new(inner)));

        // Every node runs its own recompute hook after ordinary observers
        let weak = Rc::downgrade(&node.0);
        let callback: Callback<Node> = Rc::new(move |_origin: &Node| {
            if let Some(inner) = weak.upgrade() {
                Node(inner).parameters_changed();
            }
        });
        node.add_observer(node.id(), PRIORITY_PARAMETERS_CHANGED, callback);
        node
    }

    /// A one-dimensional leaf parameter.
    pub fn param(name: &str, values: Vec<f64>) -> Self {
        let shape = vec![values.len()];
        Self::with_kind(name, NodeKind::Leaf { shape }, values)
    }

    /// A single-entry leaf parameter.
    pub fn scalar(name: &str, value: f64) -> Self {
        Self::param(name, vec![value])
    }

    /// A leaf parameter with an explicit shape. `values` are in row-major order.
    pub fn param_with_shape(name: &str, values: Vec<f64>, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(ParamzError::ShapeMismatch {
                name: name.to_string(),
                expected,
                actual: values.len(),
            });
        }
        Ok(Self::with_kind(
            name,
            NodeKind::Leaf {
                shape: shape.to_vec(),
            },
            values,
        ))
    }

    /// A leaf parameter taking its shape and values from `array`.
    pub fn param_array(name: &str, array: ArrayD<f64>) -> Self {
        let shape = array.shape().to_vec();
        let values = array.iter().copied().collect();
        Self::with_kind(name, NodeKind::Leaf { shape }, values)
    }

    /// An empty container.
    pub fn container(name: &str) -> Self {
        Self::with_kind(
            name,
            NodeKind::Container {
                children: Vec::new(),
                names: HashMap::new(),
            },
            Vec::new(),
        )
    }

    pub fn id(&self) -> ObserverId {
        self.0.borrow().id
    }

    /// Whether both handles point at the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether `subscriber` currently listens to this node.
    pub fn is_observed_by(&self, subscriber: ObserverId) -> bool {
        self.0.borrow().observers.contains(subscriber)
    }

    pub fn is_container(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Container { .. })
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_container()
    }

    /// Shape of the payload. Containers report `[size]`.
    pub fn shape(&self) -> Vec<usize> {
        let inner = self.0.borrow();
        match &inner.kind {
            NodeKind::Leaf { shape } => shape.clone(),
            NodeKind::Container { .. } => vec![inner.size],
        }
    }

    pub(crate) fn window(&self) -> (SharedStorage, usize, usize) {
        let inner = self.0.borrow();
        (Rc::clone(&inner.storage), inner.offset, inner.size)
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        let expected = self.size();
        if actual != expected {
            return Err(ParamzError::ShapeMismatch {
                name: self.hierarchy_name(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Run `f` on this node's window of the value buffer.
    ///
    /// `f` must not write to the tree.
    pub fn with_values<R>(&self, f: impl FnOnce(&[f64]) -> R) -> R {
        let (storage, offset, size) = self.window();
        let storage = storage.borrow();
        f(&storage.values[offset..offset + size])
    }

    /// Copy of the current values in flat order.
    pub fn values(&self) -> Vec<f64> {
        self.with_values(|values| values.to_vec())
    }

    /// Current values with this node's shape.
    pub fn values_array(&self) -> Result<ArrayD<f64>> {
        let shape = self.shape();
        let values = self.values();
        let actual = values.len();
        ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|_| ParamzError::ShapeMismatch {
            name: self.hierarchy_name(),
            expected: shape.iter().product(),
            actual,
        })
    }

    /// Write into the shared buffer without notifying.
    pub(crate) fn write_values(&self, values: &[f64]) {
        let (storage, offset, size) = self.window();
        storage.borrow_mut().values[offset..offset + size].copy_from_slice(values);
    }

    /// Overwrite all values and notify observers.
    pub fn set(&self, values: &[f64]) -> Result<()> {
        self.check_len(values.len())?;
        self.write_values(values);
        self.notify_observers(None, None);
        Ok(())
    }

    /// Overwrite one entry and notify observers.
    pub fn set_value(&self, index: usize, value: f64) -> Result<()> {
        let (storage, offset, size) = self.window();
        if index >= size {
            return Err(ParamzError::ParameterNotFound(format!(
                "{}[{}]",
                self.hierarchy_name(),
                index
            )));
        }
        storage.borrow_mut().values[offset + index] = value;
        self.notify_observers(None, None);
        Ok(())
    }

    /// Overwrite all values from an array with this node's size.
    pub fn set_array(&self, array: &ArrayD<f64>) -> Result<()> {
        let values: Vec<f64> = array.iter().copied().collect();
        self.set(&values)
    }

    /// Copy of the gradient window.
    pub fn gradient(&self) -> Vec<f64> {
        let (storage, offset, size) = self.window();
        let storage = storage.borrow();
        storage.gradient[offset..offset + size].to_vec()
    }

    /// Gradient with this node's shape.
    pub fn gradient_array(&self) -> Result<ArrayD<f64>> {
        let shape = self.shape();
        let gradient = self.gradient();
        let actual = gradient.len();
        ArrayD::from_shape_vec(IxDyn(&shape), gradient).map_err(|_| ParamzError::ShapeMismatch {
            name: self.hierarchy_name(),
            expected: shape.iter().product(),
            actual,
        })
    }

    /// Overwrite the gradient window. Does not notify.
    pub fn set_gradient(&self, gradient: &[f64]) -> Result<()> {
        self.check_len(gradient.len())?;
        let (storage, offset, size) = self.window();
        storage.borrow_mut().gradient[offset..offset + size].copy_from_slice(gradient);
        Ok(())
    }

    pub fn parent(&self) -> Option<Node> {
        let parent = self.0.borrow().parent.as_ref().and_then(Weak::upgrade);
        parent.map(Node)
    }

    /// Position among the parent's children.
    pub fn parent_index(&self) -> Option<usize> {
        self.0.borrow().parent_index
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Topmost ancestor, `self` for a standalone node.
    pub fn root(&self) -> Node {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    /// Whether `ancestor` is a proper ancestor of this node.
    pub fn is_descendant_of(&self, ancestor: &Node) -> bool {
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            if node.ptr_eq(ancestor) {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    /// Direct children in order. Empty for leaves.
    pub fn children(&self) -> Vec<Node> {
        match &self.0.borrow().kind {
            NodeKind::Container { children, .. } => children.clone(),
            NodeKind::Leaf { .. } => Vec::new(),
        }
    }

    /// Number of direct children.
    pub fn num_params(&self) -> usize {
        match &self.0.borrow().kind {
            NodeKind::Container { children, .. } => children.len(),
            NodeKind::Leaf { .. } => 0,
        }
    }

    /// Direct child called `name`.
    pub fn child(&self, name: &str) -> Option<Node> {
        match &self.0.borrow().kind {
            NodeKind::Container { children, names } => {
                names.get(name).and_then(|&i| children.get(i)).cloned()
            }
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Descendant at a dotted path relative to this node, e.g. `kern.variance`.
    pub fn get(&self, path: &str) -> Result<Node> {
        let mut node = self.clone();
        for part in path.split('.') {
            node = node.child(part).ok_or_else(|| {
                ParamzError::ParameterNotFound(format!("{}.{}", self.hierarchy_name(), path))
            })?;
        }
        Ok(node)
    }

    /// Names of the direct children in order.
    pub fn names(&self) -> Vec<String> {
        self.children().iter().map(Named::name).collect()
    }

    /// Leaves of this subtree in flat order.
    pub fn flattened_parameters(&self) -> Vec<Node> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    /// Dotted leaf paths relative to this node, in flat order.
    pub fn parameter_names(&self) -> Vec<String> {
        if self.is_leaf() {
            return vec![self.name()];
        }
        let mut out = Vec::new();
        for child in self.children() {
            collect_names(&child, child.name(), &mut out);
        }
        out
    }

    /// Whether both nodes read from the same backing buffer.
    pub fn shares_storage_with(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0.borrow().storage, &other.0.borrow().storage)
    }

    /// Transforms applied to this node, in local coordinates.
    pub fn constraints(&self) -> RegistryView<Transform> {
        self.0.borrow().constraints.clone()
    }

    /// Priors attached to this node, in local coordinates.
    pub fn priors(&self) -> RegistryView<Prior> {
        self.0.borrow().priors.clone()
    }

    /// Run the recompute hook, if any.
    pub fn parameters_changed(&self) {
        let hook = self.0.borrow().hook.clone();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    /// Install the recompute hook.
    ///
    /// It runs once after every update of this node or its subtree. The hook
    /// receives the node, so it should not capture a strong handle to it.
    pub fn set_parameters_changed<F>(&self, hook: F)
    where
        F: Fn(&Node) + 'static,
    {
        self.0.borrow_mut().hook = Some(Rc::new(hook));
    }

    /// Remove the recompute hook.
    pub fn clear_parameters_changed(&self) {
        self.0.borrow_mut().hook = None;
    }
}

fn collect_leaves(node: &Node, out: &mut Vec<Node>) {
    if node.is_leaf() {
        out.push(node.clone());
        return;
    }
    for child in node.children() {
        collect_leaves(&child, out);
    }
}

fn collect_names(node: &Node, path: String, out: &mut Vec<String>) {
    if node.is_leaf() {
        out.push(path);
        return;
    }
    for child in node.children() {
        let child_path = format!("{}.{}", path, child.name());
        collect_names(&child, child_path, out);
    }
}

impl Named for Node {
    fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    fn rename(&self, name: &str) {
        let parent = self.parent();
        let unique = match &parent {
            Some(parent) => parent.unique_child_name(name, Some(self)),
            None => name.to_string(),
        };
        if unique != name {
            log::warn!(
                "name '{}' is taken in '{}', renaming to '{}'",
                name,
                parent.as_ref().map(Node::hierarchy_name).unwrap_or_default(),
                unique
            );
        }
        self.0.borrow_mut().name = unique;
        if let Some(parent) = parent {
            parent.rebuild_names();
        }
    }

    fn hierarchy_name(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{}.{}", parent.hierarchy_name(), self.name()),
            None => self.name(),
        }
    }
}

impl Indexable for Node {
    fn size(&self) -> usize {
        self.0.borrow().size
    }

    fn offset(&self) -> usize {
        self.0.borrow().offset
    }

    fn raveled_index(&self) -> Vec<usize> {
        let offset = self.offset();
        (offset..offset + self.size()).collect()
    }

    fn offset_for(&self, descendant: &Node) -> Option<usize> {
        if descendant.ptr_eq(self) {
            return Some(0);
        }
        descendant
            .is_descendant_of(self)
            .then(|| descendant.offset() - self.offset())
    }
}

impl Observable for Node {
    fn observer_id(&self) -> ObserverId {
        self.id()
    }

    fn add_observer(&self, subscriber: ObserverId, priority: i64, callback: Callback<Node>) {
        self.0
            .borrow_mut()
            .observers
            .add(priority, subscriber, callback);
    }

    fn remove_observer(&self, subscriber: ObserverId) {
        self.0.borrow_mut().observers.remove(subscriber);
    }

    fn notify_observers(&self, origin: Option<&Node>, min_priority: Option<i64>) {
        // Callbacks may touch this node again, so nothing stays borrowed
        let callbacks = self.0.borrow().observers.callbacks(min_priority);
        let origin = origin.unwrap_or(self);
        for callback in callbacks {
            callback(origin);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Node")
            .field("name", &inner.name)
            .field("offset", &inner.offset)
            .field("size", &inner.size)
            .field("container", &matches!(inner.kind, NodeKind::Container { .. }))
            .finish()
    }
}

fn join_keys<K: fmt::Display>(keys: &[K]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for Node {
    /// One line per leaf: path, values, constraints and priors.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.parameter_names();
        let width = names.iter().map(String::len).max().unwrap_or(0);

        if self.is_container() {
            writeln!(f, "{}", self.name())?;
        }
        for (leaf, name) in self.flattened_parameters().iter().zip(&names) {
            writeln!(
                f,
                "  {:<width$} | {:?} | {} | {}",
                name,
                leaf.values(),
                join_keys(&leaf.constraints().keys()),
                join_keys(&leaf.priors().keys()),
                width = width
            )?;
        }
        Ok(())
    }
}
