//! Stack inspection and error-message normalization.
//!
//! Given the frames recorded by a failed execution context, `locate`
//! finds the first frame that belongs to test/user code — skipping
//! frames with no usable line information and frames from the harness's
//! own modules — and `normalize_reason` turns the raw error string into
//! the human-facing reason carried by a failure report.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::HarnessConfig;
use crate::trace::{Frame, SiteRef};

/// The marker a matcher puts at the head of its message; its presence
/// distinguishes a deliberate assertion failure from a runtime error.
pub const EXPECTATION_MARKER: &str = "Expectation Failed";

/// The marker inserted for errors no matcher raised.
pub const UNHANDLED_MARKER: &str = "Unhandled";

static LINE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(\d+):").expect("line token pattern is valid"));

static LOCATION_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+:\d+: ").expect("location head pattern is valid"));

/// The attribution the inspector settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub frame: Frame,
    /// True when no user-code frame existed and the function's static
    /// definition site was used instead.
    pub degraded: bool,
}

/// Locates the attribution point for a failure.
///
/// Frames are scanned innermost-first; harness-internal frames are
/// skipped. When no frame survives — the erroring call was a tail call,
/// so nothing of the user's stack remains — the test function's
/// definition site is reported with an empty locals set. When the
/// surviving frame has no line, the line is recovered from the
/// `source:line:` token conventionally embedded at the head of the raw
/// error.
pub fn locate(
    frames: &[Frame],
    definition_site: SiteRef,
    raw_error: &str,
    config: &HarnessConfig,
) -> Attribution {
    for frame in frames.iter().rev() {
        if config.is_internal_source(&frame.source_file) {
            continue;
        }
        let mut frame = frame.clone();
        if frame.line == 0 {
            frame.line = recover_line(raw_error);
        }
        return Attribution {
            frame,
            degraded: false,
        };
    }

    tracing::debug!(
        file = definition_site.file,
        line = definition_site.line,
        "no user frame on the stack; attributing failure to the definition site"
    );
    Attribution {
        frame: Frame {
            source_file: definition_site.file.to_string(),
            line: definition_site.line,
            locals: Vec::new(),
        },
        degraded: true,
    }
}

/// Pulls the first `:<digits>:` token out of a raw error message.
/// Returns 0 when no such token exists.
fn recover_line(raw_error: &str) -> u32 {
    LINE_TOKEN
        .captures(raw_error)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// True when the message already starts with a `source:line: ` head.
pub fn has_location_prefix(raw_error: &str) -> bool {
    LOCATION_HEAD.is_match(raw_error)
}

/// Strips a `source:line: ` head, if present.
pub fn strip_location_prefix(raw_error: &str) -> &str {
    match LOCATION_HEAD.find(raw_error) {
        Some(m) => &raw_error[m.end()..],
        None => raw_error,
    }
}

/// Normalizes a raw error into the reported reason.
///
/// The raw error is split on `": "`. If the second segment is the
/// expectation marker it is removed — what remains is the message the
/// matcher authored. Otherwise the unhandled marker is inserted as the
/// second segment, so reporting can tell intent from bug. Everything
/// from the second segment onward, rejoined, is the reason. Empty raw
/// errors must never reach this function; the execution runner swallows
/// them first.
pub fn normalize_reason(raw_error: &str) -> String {
    debug_assert!(!raw_error.is_empty());
    match raw_error.split_once(": ") {
        Some((_head, rest)) => match rest.split_once(": ") {
            Some((marker, tail)) if marker == EXPECTATION_MARKER => tail.to_string(),
            _ => format!("{}: {}", UNHANDLED_MARKER, rest),
        },
        None => format!("{}: {}", UNHANDLED_MARKER, raw_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(file: &str, line: u32) -> Frame {
        Frame {
            source_file: file.to_string(),
            line,
            locals: vec![("x".to_string(), "nil".to_string())],
        }
    }

    fn site() -> SiteRef {
        SiteRef {
            file: "tests/sample.rs",
            line: 5,
        }
    }

    #[test]
    fn innermost_user_frame_wins() {
        let frames = vec![
            frame("tests/sample.rs", 10),
            frame("src/expect.rs", 99),
            frame("tests/sample.rs", 20),
        ];
        let att = locate(&frames, site(), "tests/sample.rs:20: boom", &HarnessConfig::default());
        assert!(!att.degraded);
        assert_eq!(att.frame.line, 20);
    }

    #[test]
    fn all_internal_frames_degrade_to_definition_site() {
        let frames = vec![frame("src/expect.rs", 99), frame("src/trace.rs", 12)];
        let att = locate(&frames, site(), "src/expect.rs:99: boom", &HarnessConfig::default());
        assert!(att.degraded);
        assert_eq!(att.frame.source_file, "tests/sample.rs");
        assert_eq!(att.frame.line, 5);
        assert!(att.frame.locals.is_empty());
    }

    #[test]
    fn unknown_line_is_recovered_from_the_message() {
        let frames = vec![frame("tests/sample.rs", 0)];
        let att = locate(
            &frames,
            site(),
            "tests/sample.rs:42: attempt to call a Nil value",
            &HarnessConfig::default(),
        );
        assert_eq!(att.frame.line, 42);
    }

    #[test]
    fn unknown_line_without_token_stays_unknown() {
        let frames = vec![frame("tests/sample.rs", 0)];
        let att = locate(&frames, site(), "no token here", &HarnessConfig::default());
        assert_eq!(att.frame.line, 0);
    }

    #[test]
    fn expectation_marker_is_removed() {
        assert_eq!(
            normalize_reason("tests/sample.rs:10: Expectation Failed: Expected 1 to equal '2'"),
            "Expected 1 to equal '2'"
        );
    }

    #[test]
    fn runtime_errors_gain_the_unhandled_marker() {
        assert_eq!(
            normalize_reason("tests/sample.rs:10: attempt to call a Nil value"),
            "Unhandled: attempt to call a Nil value"
        );
    }

    #[test]
    fn reason_keeps_interior_separators() {
        assert_eq!(
            normalize_reason("t.rs:1: Expectation Failed: Expected a to fail with 'x: y'"),
            "Expected a to fail with 'x: y'"
        );
    }

    #[test]
    fn location_prefix_round_trip() {
        let raw = "tests/sample.rs:10: boom";
        assert!(has_location_prefix(raw));
        assert_eq!(strip_location_prefix(raw), "boom");
        assert!(!has_location_prefix("boom"));
        assert_eq!(strip_location_prefix("boom"), "boom");
    }
}
