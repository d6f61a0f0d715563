//! Versioned snapshots of parameter trees
//!
//! A [`Snapshot`] records the tree structure, the values and the built-in
//! transforms and priors of a subtree, with registry positions relative to
//! the snapshot root. It can rebuild a fresh tree ([`Node::from_snapshot`])
//! or be written back onto a tree of the same structure ([`Node::restore`]).

use crate::error::{ParamzError, Result};
use crate::parameters::index_registry::RegistryView;
use crate::parameters::node::{Indexable, Named, Node};
use crate::parameters::priors::{Prior, PriorKind};
use crate::parameters::transform::{Transform, TransformKind};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Snapshot format written by this version of the crate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Structure and values of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSnapshot {
    Leaf {
        name: String,
        shape: Vec<usize>,
        values: Vec<f64>,
    },
    Container {
        name: String,
        children: Vec<NodeSnapshot>,
    },
}

impl NodeSnapshot {
    pub fn name(&self) -> &str {
        match self {
            NodeSnapshot::Leaf { name, .. } | NodeSnapshot::Container { name, .. } => name,
        }
    }

    /// Number of scalar entries in this subtree.
    pub fn size(&self) -> usize {
        match self {
            NodeSnapshot::Leaf { values, .. } => values.len(),
            NodeSnapshot::Container { children, .. } => children.iter().map(Self::size).sum(),
        }
    }

    fn collect_values(&self, out: &mut Vec<f64>) {
        match self {
            NodeSnapshot::Leaf { values, .. } => out.extend_from_slice(values),
            NodeSnapshot::Container { children, .. } => {
                for child in children {
                    child.collect_values(out);
                }
            }
        }
    }
}

/// One registry key and the positions it governs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry<K> {
    pub kind: K,
    pub indices: Vec<usize>,
}

/// Serializable state of a parameter subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub tree: NodeSnapshot,
    #[serde(default)]
    pub constraints: Vec<RegistryEntry<TransformKind>>,
    #[serde(default)]
    pub priors: Vec<RegistryEntry<PriorKind>>,
}

impl Snapshot {
    fn check_version(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(ParamzError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(self)?;
        Ok(json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    /// Write the snapshot to a JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Read a snapshot from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }
}

fn snapshot_tree(node: &Node) -> NodeSnapshot {
    if node.is_leaf() {
        NodeSnapshot::Leaf {
            name: node.name(),
            shape: node.shape(),
            values: node.values(),
        }
    } else {
        NodeSnapshot::Container {
            name: node.name(),
            children: node.children().iter().map(snapshot_tree).collect(),
        }
    }
}

fn build_tree(snapshot: &NodeSnapshot) -> Result<Node> {
    match snapshot {
        NodeSnapshot::Leaf {
            name,
            shape,
            values,
        } => Node::param_with_shape(name, values.clone(), shape),
        NodeSnapshot::Container { name, children } => {
            let node = Node::container(name);
            for child in children {
                node.add_parameter(&build_tree(child)?, None)?;
            }
            Ok(node)
        }
    }
}

fn check_structure(node: &Node, snapshot: &NodeSnapshot) -> Result<()> {
    let mismatch = || ParamzError::ShapeMismatch {
        name: node.hierarchy_name(),
        expected: node.size(),
        actual: snapshot.size(),
    };

    if node.name() != snapshot.name() {
        return Err(ParamzError::ParameterNotFound(format!(
            "{} (snapshot has '{}')",
            node.hierarchy_name(),
            snapshot.name()
        )));
    }
    match snapshot {
        NodeSnapshot::Leaf { values, .. } => {
            if !node.is_leaf() || node.size() != values.len() {
                return Err(mismatch());
            }
        }
        NodeSnapshot::Container { children, .. } => {
            let own = node.children();
            if !node.is_container() || own.len() != children.len() {
                return Err(mismatch());
            }
            for (child, child_snapshot) in own.iter().zip(children) {
                check_structure(child, child_snapshot)?;
            }
        }
    }
    Ok(())
}

fn clear_view<K: Clone + PartialEq>(view: &RegistryView<K>) {
    for (key, indices) in view.entries() {
        view.remove(&key, indices);
    }
}

impl Node {
    /// Capture structure, values, transforms and priors of this subtree.
    ///
    /// Custom transforms and priors without a serializable kind are skipped.
    pub fn snapshot(&self) -> Snapshot {
        let mut constraints = Vec::new();
        for (transform, indices) in self.constraints().entries() {
            match transform.kind() {
                Some(kind) => constraints.push(RegistryEntry { kind, indices }),
                None => warn!(
                    "transform {} on '{}' cannot be serialized and is skipped",
                    transform,
                    self.hierarchy_name()
                ),
            }
        }

        let mut priors = Vec::new();
        for (prior, indices) in self.priors().entries() {
            match prior.kind() {
                Some(kind) => priors.push(RegistryEntry { kind, indices }),
                None => warn!(
                    "prior {} on '{}' cannot be serialized and is skipped",
                    prior,
                    self.hierarchy_name()
                ),
            }
        }

        Snapshot {
            version: SNAPSHOT_VERSION,
            tree: snapshot_tree(self),
            constraints,
            priors,
        }
    }

    /// Build a new standalone tree from a snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Node> {
        snapshot.check_version()?;
        let node = build_tree(&snapshot.tree)?;
        node.apply_registries(snapshot)?;
        Ok(node)
    }

    /// Overwrite values, transforms, priors and fixes of this subtree.
    ///
    /// Names and sizes must match the snapshot. Observers are notified once.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        snapshot.check_version()?;
        check_structure(self, &snapshot.tree)?;

        let mut values = Vec::with_capacity(self.size());
        snapshot.tree.collect_values(&mut values);

        clear_view(&self.constraints());
        clear_view(&self.priors());
        self.apply_registries(snapshot)?;

        self.write_values(&values);
        self.trigger_params_changed(true);
        Ok(())
    }

    fn apply_registries(&self, snapshot: &Snapshot) -> Result<()> {
        let constraints = self.constraints();
        for entry in &snapshot.constraints {
            constraints.add(Transform::from_kind(&entry.kind)?, entry.indices.iter().copied());
        }
        let priors = self.priors();
        for entry in &snapshot.priors {
            priors.add(Prior::from_kind(&entry.kind)?, entry.indices.iter().copied());
        }
        self.root().rebuild_fixes();
        Ok(())
    }
}
