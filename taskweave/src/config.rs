//! Engine configuration.
//!
//! Plain values passed into graph construction; there is no process-wide
//! mutable configuration. Per-node settings (iteration cap, generation
//! override) take precedence over these defaults.

/// Default maximum number of tool round trips per node.
pub const DEFAULT_ITERATION_CAP: u32 = 20;

/// Default number of schema-repair attempts after the first validation
/// failure. Finite on purpose: unbounded re-prompting risks runaway cost.
pub const DEFAULT_REPAIR_ATTEMPTS: u32 = 1;

/// Default template for the tool-error turn fed back to the model.
/// Placeholders: `{tool_name}`, `{error}`.
pub const DEFAULT_TOOL_ERROR_TEMPLATE: &str =
    "Error executing tool '{tool_name}': {error}\nPlease fix the error and try again.";

/// Engine-wide defaults for a graph run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum tool round trips for nodes that do not set their own cap.
    pub default_iteration_cap: u32,
    /// Schema-repair attempts after the first validation failure.
    pub repair_attempts: u32,
    /// Buffer size of the streaming-chunk channel per generation call.
    pub chunk_buffer: usize,
    /// Template for tool-error turns; `{tool_name}` and `{error}` are
    /// substituted.
    pub tool_error_template: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_iteration_cap: DEFAULT_ITERATION_CAP,
            repair_attempts: DEFAULT_REPAIR_ATTEMPTS,
            chunk_buffer: 128,
            tool_error_template: DEFAULT_TOOL_ERROR_TEMPLATE.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_default_iteration_cap(mut self, cap: u32) -> Self {
        self.default_iteration_cap = cap;
        self
    }

    pub fn with_repair_attempts(mut self, attempts: u32) -> Self {
        self.repair_attempts = attempts;
        self
    }

    pub fn with_tool_error_template(mut self, template: impl Into<String>) -> Self {
        self.tool_error_template = template.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: defaults match the documented constants.
    #[test]
    fn default_config_carries_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.default_iteration_cap, DEFAULT_ITERATION_CAP);
        assert_eq!(config.repair_attempts, DEFAULT_REPAIR_ATTEMPTS);
        assert_eq!(config.tool_error_template, DEFAULT_TOOL_ERROR_TEMPLATE);
        assert!(config.chunk_buffer > 0);
    }

    /// **Scenario**: builder methods override individual fields.
    #[test]
    fn builder_overrides() {
        let config = EngineConfig::default()
            .with_default_iteration_cap(3)
            .with_repair_attempts(0)
            .with_tool_error_template("{tool_name} broke: {error}");
        assert_eq!(config.default_iteration_cap, 3);
        assert_eq!(config.repair_attempts, 0);
        assert_eq!(config.tool_error_template, "{tool_name} broke: {error}");
    }
}
