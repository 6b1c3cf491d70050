use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tracing::{debug, info};
use uuid::Uuid;

use crate::kernel::error::{ObservationError, ObservationResult};
use crate::kernel::lock;

use super::descriptor::{ChangeKind, Locator, NativeChange, NodeId, SubscriptionDescriptor, TypeName};
use super::source::{ChangeSink, SubscriptionId, UpstreamSource};

const ROOT_TYPE: &str = "rep:root";

#[derive(Debug, Clone)]
struct Node {
    id: NodeId,
    node_type: TypeName,
    properties: BTreeMap<String, String>,
}

struct RepositoryState {
    nodes: BTreeMap<Locator, Node>,
    staged: Vec<NativeChange>,
    subscriptions: HashMap<SubscriptionId, (SubscriptionDescriptor, ChangeSink)>,
    user: Option<String>,
}

/// Thread-safe in-memory content tree with JCR-style change notification.
///
/// Mutations are staged; `save` publishes them, one ordered batch per
/// matching subscription, on the calling thread.
pub struct InMemoryRepository {
    state: Mutex<RepositoryState>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            Locator::root(),
            Node {
                id: NodeId("root".to_string()),
                node_type: TypeName(ROOT_TYPE.to_string()),
                properties: BTreeMap::new(),
            },
        );
        Self {
            state: Mutex::new(RepositoryState {
                nodes,
                staged: Vec::new(),
                subscriptions: HashMap::new(),
                user: None,
            }),
        }
    }

    /// User id attached to subsequently staged changes
    pub fn set_user(&self, user: Option<String>) {
        lock(&self.state).user = user;
    }

    pub fn exists(&self, path: &str) -> bool {
        Locator::parse(path).is_ok_and(|p| lock(&self.state).nodes.contains_key(&p))
    }

    pub fn node_id(&self, path: &str) -> Option<NodeId> {
        let path = Locator::parse(path).ok()?;
        lock(&self.state).nodes.get(&path).map(|n| n.id.clone())
    }

    pub fn property(&self, path: &str, name: &str) -> Option<String> {
        let path = Locator::parse(path).ok()?;
        lock(&self.state)
            .nodes
            .get(&path)
            .and_then(|n| n.properties.get(name).cloned())
    }

    pub fn node_count(&self) -> usize {
        lock(&self.state).nodes.len()
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.state).subscriptions.len()
    }

    pub fn staged_count(&self) -> usize {
        lock(&self.state).staged.len()
    }

    pub fn add_node(&self, path: &str, node_type: &str) -> ObservationResult<NodeId> {
        let path = Locator::parse(path)?;
        let parent = path
            .parent()
            .ok_or_else(|| ObservationError::ItemExists(path.to_string()))?;

        let mut state = lock(&self.state);
        if !state.nodes.contains_key(&parent) {
            return Err(ObservationError::NotFound(parent.to_string()));
        }
        if state.nodes.contains_key(&path) {
            return Err(ObservationError::ItemExists(path.to_string()));
        }

        let node = Node {
            id: NodeId(Uuid::new_v4().to_string()),
            node_type: TypeName(node_type.to_string()),
            properties: BTreeMap::new(),
        };
        let id = node.id.clone();
        let change = stage_change(&state, ChangeKind::NodeAdded, path.clone(), &node);
        state.nodes.insert(path, node);
        state.staged.push(change);
        Ok(id)
    }

    /// Remove a node and its subtree; one `NodeRemoved` per removed node,
    /// deepest first.
    pub fn remove_node(&self, path: &str) -> ObservationResult<()> {
        let path = Locator::parse(path)?;
        if path.is_root() {
            return Err(ObservationError::InvalidLocator("cannot remove the root".into()));
        }

        let mut state = lock(&self.state);
        if !state.nodes.contains_key(&path) {
            return Err(ObservationError::NotFound(path.to_string()));
        }

        let mut doomed: Vec<Locator> = state
            .nodes
            .keys()
            .filter(|p| **p == path || path.is_ancestor_of(p))
            .cloned()
            .collect();
        doomed.sort_by_key(|p| std::cmp::Reverse(p.as_str().matches('/').count()));

        for victim in doomed {
            if let Some(node) = state.nodes.remove(&victim) {
                let change = stage_change(&state, ChangeKind::NodeRemoved, victim, &node);
                state.staged.push(change);
            }
        }
        Ok(())
    }

    pub fn set_property(&self, path: &str, name: &str, value: &str) -> ObservationResult<()> {
        let path = Locator::parse(path)?;
        let property_path = child_property(&path, name)?;

        let mut state = lock(&self.state);
        let user = state.user.clone();
        let node = state
            .nodes
            .get_mut(&path)
            .ok_or_else(|| ObservationError::NotFound(path.to_string()))?;

        let kind = match node.properties.insert(name.to_string(), value.to_string()) {
            Some(previous) if previous == value => return Ok(()),
            Some(_) => ChangeKind::PropertyChanged,
            None => ChangeKind::PropertyAdded,
        };
        let change = NativeChange {
            kind,
            path: property_path,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            user,
        };
        state.staged.push(change);
        Ok(())
    }

    pub fn remove_property(&self, path: &str, name: &str) -> ObservationResult<()> {
        let path = Locator::parse(path)?;
        let property_path = child_property(&path, name)?;

        let mut state = lock(&self.state);
        let user = state.user.clone();
        let node = state
            .nodes
            .get_mut(&path)
            .ok_or_else(|| ObservationError::NotFound(path.to_string()))?;
        if node.properties.remove(name).is_none() {
            return Err(ObservationError::NotFound(property_path.to_string()));
        }
        let change = NativeChange {
            kind: ChangeKind::PropertyRemoved,
            path: property_path,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            user,
        };
        state.staged.push(change);
        Ok(())
    }

    /// Drop staged changes without publishing them.
    pub fn discard(&self) -> usize {
        let mut state = lock(&self.state);
        let count = state.staged.len();
        state.staged.clear();
        count
    }

    /// Publish staged changes. Sinks run after the repository lock is
    /// released. Returns the number of changes saved.
    pub fn save(&self) -> usize {
        let (saved, batches) = {
            let mut state = lock(&self.state);
            let staged = std::mem::take(&mut state.staged);
            let batches: Vec<(ChangeSink, Vec<NativeChange>)> = state
                .subscriptions
                .values()
                .filter_map(|(descriptor, sink)| {
                    let batch: Vec<NativeChange> = staged
                        .iter()
                        .filter(|c| descriptor.matches(c))
                        .cloned()
                        .collect();
                    (!batch.is_empty()).then(|| (sink.clone(), batch))
                })
                .collect();
            (staged.len(), batches)
        };

        debug!(changes = saved, listeners = batches.len(), "repository save");
        for (sink, batch) in batches {
            sink(batch);
        }
        saved
    }
}

/// Path of property `name` on `node`. The name must be a single segment.
fn child_property(node: &Locator, name: &str) -> ObservationResult<Locator> {
    if name.is_empty() || name.contains('/') {
        return Err(ObservationError::InvalidLocator(format!(
            "invalid property name {name:?} on {node}"
        )));
    }
    node.join(name)
}

fn stage_change(state: &RepositoryState, kind: ChangeKind, path: Locator, node: &Node) -> NativeChange {
    NativeChange {
        kind,
        path,
        node_id: node.id.clone(),
        node_type: node.node_type.clone(),
        user: state.user.clone(),
    }
}

impl UpstreamSource for InMemoryRepository {
    fn subscribe(
        &self,
        descriptor: &SubscriptionDescriptor,
        sink: ChangeSink,
    ) -> ObservationResult<SubscriptionId> {
        let mut state = lock(&self.state);
        if !state.nodes.contains_key(&descriptor.root) {
            return Err(ObservationError::NotFound(descriptor.root.to_string()));
        }
        let id = SubscriptionId::new();
        state.subscriptions.insert(id, (descriptor.clone(), sink));
        info!(subscription = %id, root = %descriptor.root, deep = descriptor.deep, "listener added");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> ObservationResult<()> {
        if lock(&self.state).subscriptions.remove(&id).is_some() {
            info!(subscription = %id, "listener removed");
        } else {
            debug!(subscription = %id, "listener already removed");
        }
        Ok(())
    }
}
