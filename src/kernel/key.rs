use std::fmt;

use serde::{Deserialize, Serialize};

/// Value-equality identity of an observable.
///
/// Two observables with the same key share one observation lifecycle no
/// matter how many instances exist. Keys are normalized `namespace:id`
/// strings: the namespace is trimmed and lowercased, the id is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObservableKey(String);

impl ObservableKey {
    pub fn new(namespace: &str, id: &str) -> Self {
        Self(format!("{}:{}", namespace.trim().to_ascii_lowercase(), id.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part (everything before the first `:`)
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map(|(ns, _)| ns).unwrap_or("")
    }
}

impl From<&str> for ObservableKey {
    fn from(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((ns, id)) => Self::new(ns, id),
            None => Self::new("", raw),
        }
    }
}

impl fmt::Display for ObservableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
