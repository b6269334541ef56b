// ABOUTME: Diagnostics accumulator for non-fatal warnings during deploy and rollback.
// ABOUTME: Collects problems that shouldn't fail the operation but belong in its report.

use serde::Serialize;

/// Collects non-fatal warnings during one deployment or rollback.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Failed to release a stack lock (lock file may remain).
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    /// A snapshot could not be written.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Snapshot, message)
    }

    /// The rollback report could not be written.
    pub fn report(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Report, message)
    }

    /// A resource could not be deleted after all retries.
    pub fn deletion(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Deletion, message)
    }

    /// A rollback mode could not run as requested and was widened.
    pub fn mode_fallback(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ModeFallback, message)
    }

    /// Inline cleanup of a sibling resource failed during provisioning.
    pub fn inline_cleanup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::InlineCleanup, message)
    }

    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Categories of warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    LockRelease,
    Snapshot,
    Report,
    Deletion,
    ModeFallback,
    InlineCleanup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::lock_release("failed to remove lock file"));
        diag.warn(Warning::deletion("sg-123 still in use"));

        assert!(diag.has_warnings());
        assert_eq!(diag.warnings().len(), 2);
    }

    #[test]
    fn warning_constructors_set_correct_kind() {
        assert_eq!(Warning::lock_release("x").kind, WarningKind::LockRelease);
        assert_eq!(Warning::snapshot("x").kind, WarningKind::Snapshot);
        assert_eq!(Warning::mode_fallback("x").kind, WarningKind::ModeFallback);
    }

    #[test]
    fn warnings_serialize_with_snake_case_kind() {
        let json = serde_json::to_value(Warning::inline_cleanup("vpc-1 left behind")).unwrap();
        assert_eq!(json["kind"], "inline_cleanup");
    }
}
