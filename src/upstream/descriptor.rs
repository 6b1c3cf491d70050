use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kernel::error::{ObservationError, ObservationResult};
use crate::kernel::key::ObservableKey;

/// Kind of repository change. Bit values follow the JCR event constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    NodeAdded,
    NodeRemoved,
    PropertyAdded,
    PropertyRemoved,
    PropertyChanged,
    NodeMoved,
    Persist,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 7] = [
        ChangeKind::NodeAdded,
        ChangeKind::NodeRemoved,
        ChangeKind::PropertyAdded,
        ChangeKind::PropertyRemoved,
        ChangeKind::PropertyChanged,
        ChangeKind::NodeMoved,
        ChangeKind::Persist,
    ];

    pub fn bit(self) -> u32 {
        match self {
            ChangeKind::NodeAdded => 0x1,
            ChangeKind::NodeRemoved => 0x2,
            ChangeKind::PropertyAdded => 0x4,
            ChangeKind::PropertyRemoved => 0x8,
            ChangeKind::PropertyChanged => 0x10,
            ChangeKind::NodeMoved => 0x20,
            ChangeKind::Persist => 0x40,
        }
    }

    pub fn is_property(self) -> bool {
        matches!(
            self,
            ChangeKind::PropertyAdded | ChangeKind::PropertyRemoved | ChangeKind::PropertyChanged
        )
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::NodeAdded => "NODE_ADDED",
            ChangeKind::NodeRemoved => "NODE_REMOVED",
            ChangeKind::PropertyAdded => "PROPERTY_ADDED",
            ChangeKind::PropertyRemoved => "PROPERTY_REMOVED",
            ChangeKind::PropertyChanged => "PROPERTY_CHANGED",
            ChangeKind::NodeMoved => "NODE_MOVED",
            ChangeKind::Persist => "PERSIST",
        };
        f.write_str(name)
    }
}

/// Set of change kinds, stored as the JCR event-type bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeKinds(u32);

impl ChangeKinds {
    pub const NONE: ChangeKinds = ChangeKinds(0);

    pub fn all() -> Self {
        Self::ALL_BITS
    }

    const ALL_BITS: ChangeKinds = ChangeKinds(0x7f);

    pub fn of(kinds: &[ChangeKind]) -> Self {
        kinds.iter().copied().collect()
    }

    pub fn with(self, kind: ChangeKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn contains(self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn iter(self) -> impl Iterator<Item = ChangeKind> {
        ChangeKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<ChangeKind> for ChangeKinds {
    fn from_iter<I: IntoIterator<Item = ChangeKind>>(iter: I) -> Self {
        iter.into_iter().fold(ChangeKinds::NONE, ChangeKinds::with)
    }
}

/// Normalized absolute repository path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse an absolute path. Repeated and trailing slashes are collapsed;
    /// relative paths and `.`/`..` segments are rejected.
    pub fn parse(raw: &str) -> ObservationResult<Self> {
        let raw = raw.trim();
        if !raw.starts_with('/') {
            return Err(ObservationError::InvalidLocator(format!("not absolute: {raw:?}")));
        }
        let mut segments = Vec::new();
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(ObservationError::InvalidLocator(format!(
                    "relative segment in {raw:?}"
                )));
            }
            segments.push(segment);
        }
        Ok(Self(format!("/{}", segments.join("/"))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn parent(&self) -> Option<Locator> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    pub fn join(&self, name: &str) -> ObservationResult<Locator> {
        Self::parse(&format!("{}/{}", self.0, name))
    }

    /// Strict ancestor test
    pub fn is_ancestor_of(&self, other: &Locator) -> bool {
        if self == other {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other
            .0
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl TryFrom<String> for Locator {
    type Error = ObservationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Locator::parse(&raw)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeName(pub String);

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A change as reported by the upstream source.
///
/// `path` is the changed item; for property changes that is the property
/// path, and `node_id`/`node_type` describe the owning node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeChange {
    pub kind: ChangeKind,
    pub path: Locator,
    pub node_id: NodeId,
    pub node_type: TypeName,
    pub user: Option<String>,
}

impl NativeChange {
    /// Path of the node the change is reported against: the parent of an
    /// added/removed/moved node, the owner of a property.
    pub fn associated_path(&self) -> Locator {
        self.path.parent().unwrap_or_else(Locator::root)
    }
}

/// What an upstream subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    pub change_types: ChangeKinds,
    pub root: Locator,
    /// Whole subtree (true) or only changes reported against `root` itself
    pub deep: bool,
    /// Empty = any node
    #[serde(default)]
    pub id_filter: Vec<NodeId>,
    /// Empty = any type
    #[serde(default)]
    pub type_filter: Vec<TypeName>,
}

impl SubscriptionDescriptor {
    /// All change kinds, whole subtree, no filters
    pub fn new(root: Locator) -> Self {
        Self {
            change_types: ChangeKinds::all(),
            root,
            deep: true,
            id_filter: Vec::new(),
            type_filter: Vec::new(),
        }
    }

    pub fn with_change_types(mut self, change_types: ChangeKinds) -> Self {
        self.change_types = change_types;
        self
    }

    pub fn shallow(mut self) -> Self {
        self.deep = false;
        self
    }

    pub fn with_ids(mut self, ids: Vec<NodeId>) -> Self {
        self.id_filter = ids;
        self
    }

    pub fn with_types(mut self, types: Vec<TypeName>) -> Self {
        self.type_filter = types;
        self
    }

    pub fn matches(&self, change: &NativeChange) -> bool {
        if !self.change_types.contains(change.kind) {
            return false;
        }

        let associated = change.associated_path();
        let in_scope = if self.deep {
            associated == self.root || self.root.is_ancestor_of(&associated)
        } else {
            associated == self.root
        };
        if !in_scope {
            return false;
        }

        if !self.id_filter.is_empty() && !self.id_filter.contains(&change.node_id) {
            return false;
        }
        if !self.type_filter.is_empty() && !self.type_filter.contains(&change.node_type) {
            return false;
        }
        true
    }

    /// Dedup key: equal descriptors (filters compared as sets) share a key.
    pub fn key(&self) -> ObservableKey {
        let mut ids: Vec<&str> = self.id_filter.iter().map(|id| id.0.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let mut types: Vec<&str> = self.type_filter.iter().map(|t| t.0.as_str()).collect();
        types.sort_unstable();
        types.dedup();

        ObservableKey::new(
            "jcr",
            &format!(
                "{}|{:#x}|{}|{}|{}",
                self.root,
                self.change_types.bits(),
                if self.deep { "deep" } else { "shallow" },
                ids.join(","),
                types.join(",")
            ),
        )
    }
}
