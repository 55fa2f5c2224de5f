//! Model configuration.

/// Behaviour switches for a [`Model`](super::Model).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Reject writes of required foreign keys that do not resolve.
    pub check_references: bool,
    /// Drop clean rows missing from a reload of a clean entity.
    pub evict_on_reload: bool,
    /// Check every outgoing change against the catalog before saving.
    pub validate_changes: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            check_references: true,
            evict_on_reload: true,
            validate_changes: true,
        }
    }
}

impl ModelConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set check_references flag.
    pub fn check_references(mut self, value: bool) -> Self {
        self.check_references = value;
        self
    }

    /// Set evict_on_reload flag.
    pub fn evict_on_reload(mut self, value: bool) -> Self {
        self.evict_on_reload = value;
        self
    }

    /// Set validate_changes flag.
    pub fn validate_changes(mut self, value: bool) -> Self {
        self.validate_changes = value;
        self
    }
}
