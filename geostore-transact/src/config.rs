//! Data store configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Configuration for [`MemoryDataStore`](crate::MemoryDataStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    /// Namespace applied to feature type names that have none.
    pub namespace: Option<String>,

    /// Keep caller-supplied feature ids on insert instead of generating
    /// `<type><separator><n>` ids.
    /// Default: false
    pub use_provided_fid: bool,

    /// Separator between type name and sequence number in generated ids.
    /// Default: "."
    pub fid_separator: String,

    /// Diffs smaller than this are scanned linearly for spatial queries
    /// instead of building an envelope index.
    /// Default: 32
    pub spatial_index_min_size: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            use_provided_fid: false,
            fid_separator: ".".to_string(),
            spatial_index_min_size: 32,
        }
    }
}

impl MemoryStoreConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_use_provided_fid(mut self, use_provided_fid: bool) -> Self {
        self.use_provided_fid = use_provided_fid;
        self
    }

    pub fn with_fid_separator(mut self, separator: impl Into<String>) -> Self {
        self.fid_separator = separator.into();
        self
    }

    pub fn with_spatial_index_min_size(mut self, size: usize) -> Self {
        self.spatial_index_min_size = size;
        self
    }
}
