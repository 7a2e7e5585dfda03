//! Command abstractions.

/// Trait that all commands implement.
///
/// A command is persisted alongside the events it produced, so every
/// event row can be traced back to its originating command.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for persistence and routing).
    fn command_type(&self) -> &'static str;

    /// Serializes the command payload to JSON for the audit trail.
    fn payload(&self) -> serde_json::Value;
}
