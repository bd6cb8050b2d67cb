//! The structured failure report crossing into the reporting layer.

use serde::Serialize;

use crate::config::HarnessConfig;
use crate::inspect;
use crate::trace::{Frame, SiteRef};

/// The sole data structure handed to downstream reporting. Constructed
/// once per failure; immutable after construction; its serialized shape
/// is stable for any consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    /// Normalized human-facing reason. Assertion failures read as the
    /// matcher authored them; anything else carries an `Unhandled:`
    /// marker.
    pub reason: String,
    pub source_file: String,
    pub line_number: u32,
    /// Local bindings visible at the attribution point, in declaration
    /// order, rendered as text.
    pub locals: Vec<(String, String)>,
    /// Opaque handle of the execution context that failed.
    pub context_id: u64,
}

impl FailureReport {
    /// Builds a report from a failed context: locates the attribution
    /// frame and normalizes the raw error into the reason.
    pub(crate) fn assemble(
        frames: &[Frame],
        definition_site: SiteRef,
        raw_error: &str,
        context_id: u64,
        config: &HarnessConfig,
    ) -> FailureReport {
        let attribution = inspect::locate(frames, definition_site, raw_error, config);
        FailureReport {
            reason: inspect::normalize_reason(raw_error),
            source_file: attribution.frame.source_file,
            line_number: attribution.frame.line,
            locals: attribution.frame.locals,
            context_id,
        }
    }
}
