use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a namespace's persistent graph is stored
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphLocation {
    bucket: String,
    key: String,
}

impl GraphLocation {
    /// `persistent_graphs/<namespace>/<key>.json` in `bucket`.
    ///
    /// The `.json` suffix is appended unless `key` already has it.
    pub fn new(bucket: impl Into<String>, namespace: &str, key: &str) -> Self {
        let file = if key.ends_with(".json") {
            key.to_string()
        } else {
            format!("{key}.json")
        };
        Self {
            bucket: bucket.into(),
            key: format!("persistent_graphs/{namespace}/{file}"),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for GraphLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let location = GraphLocation::new("deploy-state", "dev", "main");
        assert_eq!(location.bucket(), "deploy-state");
        assert_eq!(location.key(), "persistent_graphs/dev/main.json");
        assert_eq!(location.to_string(), "deploy-state/persistent_graphs/dev/main.json");
    }

    #[test]
    fn test_json_suffix_not_doubled() {
        let location = GraphLocation::new("b", "prod", "main.json");
        assert_eq!(location.key(), "persistent_graphs/prod/main.json");
    }
}
