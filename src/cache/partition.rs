//! Partition naming and generations.
//!
//! Partition names embed the generation identifier. Exactly one generation is
//! current; a partition whose name is not one of the two current names is
//! superseded and only ever deleted.

/// Which of the two current partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    /// Build-time manifest resources.
    Static,
    /// Resources discovered at runtime.
    Dynamic,
}

impl PartitionKind {
    /// The other current partition.
    pub fn other(&self) -> PartitionKind {
        match self {
            PartitionKind::Static => PartitionKind::Dynamic,
            PartitionKind::Dynamic => PartitionKind::Static,
        }
    }
}

impl std::fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionKind::Static => write!(f, "static"),
            PartitionKind::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// The current generation's partition names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    version: String,
    static_name: String,
    dynamic_name: String,
}

impl PartitionNames {
    pub fn new(static_prefix: &str, dynamic_prefix: &str, version: &str) -> Self {
        Self {
            version: version.to_string(),
            static_name: format!("{static_prefix}-{version}"),
            dynamic_name: format!("{dynamic_prefix}-{version}"),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn static_name(&self) -> &str {
        &self.static_name
    }

    pub fn dynamic_name(&self) -> &str {
        &self.dynamic_name
    }

    pub fn name(&self, kind: PartitionKind) -> &str {
        match kind {
            PartitionKind::Static => &self.static_name,
            PartitionKind::Dynamic => &self.dynamic_name,
        }
    }

    /// Whether `name` belongs to the current generation.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }
}
