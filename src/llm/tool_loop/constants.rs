//! Tool loop constants

/// Default cap on generation rounds per generate call
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Error recorded when the model asks for a tool outside the supplied set
pub const MISSING_TOOL_PREFIX: &str = "Tool not available";
