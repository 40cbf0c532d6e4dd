//! `ActivityDetector` (C5): stateless classifier over captured pane output.
//!
//! Grounded in `application/branch_completion_detector.rs`'s shape: a pure
//! function from a content snapshot to a decision value, no internal
//! mutable state. The supervisor is responsible for supplying the previous
//! tick's content and previous status; this module never stores anything
//! between calls.

use crate::domain::models::InstanceStatus;

/// Confirmation-prompt substrings the detector treats as a pending prompt.
///
/// A closed, fixed list: not user-extensible.
pub const PROMPT_PATTERNS: &[&str] = &[
    "continue? [y/N]",
    "continue? (y/n)",
    "Do you want to",
    "Do you want to proceed?",
    "Overwrite?",
    "[y/N]",
    "(y/n)",
    "Press Enter to continue",
];

/// Per-tail "session is idle and waiting for input" patterns, checked against
/// the final non-blank line only, once the tail has been stable for
/// `READY_STABLE_TICKS` consecutive polls.
pub const READY_PATTERNS: &[&str] = &["$", ">", "❯", "Human:", "you:"];

/// Number of consecutive stable ticks required before a session is eligible
/// to be classified `Ready`.
pub const READY_STABLE_TICKS: u32 = 2;

/// Maximum rune count for an extracted `LastActivity` descriptor.
const LAST_ACTIVITY_MAX_CHARS: usize = 80;

/// Result of one `ActivityDetector::classify` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The instance's new lifecycle status.
    pub status: InstanceStatus,
    /// Whether a known confirmation prompt is visible in `new_content`.
    pub prompt_detected: bool,
    /// A short descriptor extracted from the most recent non-blank line.
    pub last_activity: Option<String>,
}

/// Stateless pane-content classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityDetector;

impl ActivityDetector {
    /// Construct the (stateless, zero-sized) detector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classify a tick's captured content.
    ///
    /// `stable_ticks` is the number of consecutive prior ticks the tail has
    /// been unchanged (whitespace-insensitively), including this one if it
    /// is also unchanged; the caller (the polling loop, which owns
    /// per-instance counters) is responsible for incrementing/resetting it.
    #[must_use]
    pub fn classify(
        self,
        previous_content: &str,
        new_content: &str,
        previous_status: InstanceStatus,
        stable_ticks: u32,
    ) -> Classification {
        let changed = !tails_equal_ignoring_whitespace(previous_content, new_content);
        let prompt_detected = contains_prompt_pattern(new_content);

        let status = if changed {
            InstanceStatus::Running
        } else if stable_ticks >= READY_STABLE_TICKS && last_line_matches_ready_pattern(new_content) {
            InstanceStatus::Ready
        } else {
            match previous_status {
                InstanceStatus::Loading => InstanceStatus::Loading,
                InstanceStatus::Paused => InstanceStatus::Paused,
                InstanceStatus::Running | InstanceStatus::Ready => InstanceStatus::Running,
            }
        };

        Classification {
            status,
            prompt_detected,
            last_activity: extract_last_activity(new_content),
        }
    }
}

fn tails_equal_ignoring_whitespace(previous: &str, new: &str) -> bool {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>();
    normalize(previous) == normalize(new)
}

fn contains_prompt_pattern(content: &str) -> bool {
    PROMPT_PATTERNS.iter().any(|pat| content.contains(pat))
}

fn last_non_blank_line(content: &str) -> Option<&str> {
    content.lines().rev().find(|line| !line.trim().is_empty())
}

fn last_line_matches_ready_pattern(content: &str) -> bool {
    last_non_blank_line(content).is_some_and(|line| {
        let trimmed = line.trim_end();
        READY_PATTERNS.iter().any(|pat| trimmed.ends_with(pat))
    })
}

fn extract_last_activity(content: &str) -> Option<String> {
    let line = last_non_blank_line(content)?.trim();
    if line.is_empty() {
        return None;
    }
    let truncated: String = line.chars().take(LAST_ACTIVITY_MAX_CHARS).collect();
    Some(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_tail_is_running() {
        let det = ActivityDetector::new();
        let c = det.classify("abc\n", "abc\ndef\n", InstanceStatus::Loading, 0);
        assert_eq!(c.status, InstanceStatus::Running);
    }

    #[test]
    fn whitespace_only_diff_is_not_a_change() {
        let det = ActivityDetector::new();
        let c = det.classify("abc  def\n", "abc def\n", InstanceStatus::Running, READY_STABLE_TICKS);
        assert_ne!(c.status, InstanceStatus::Running);
    }

    #[test]
    fn stable_tail_with_prompt_char_is_ready() {
        let det = ActivityDetector::new();
        let content = "some output\n$ ";
        let c = det.classify(content, content, InstanceStatus::Running, READY_STABLE_TICKS);
        assert_eq!(c.status, InstanceStatus::Ready);
    }

    #[test]
    fn stable_tail_below_threshold_stays_running() {
        let det = ActivityDetector::new();
        let content = "some output\n$ ";
        let c = det.classify(content, content, InstanceStatus::Running, 1);
        assert_eq!(c.status, InstanceStatus::Running);
    }

    #[test]
    fn prompt_pattern_is_detected() {
        let det = ActivityDetector::new();
        let c = det.classify("", "Overwrite existing file? [y/N]", InstanceStatus::Running, 0);
        assert!(c.prompt_detected);
    }

    #[test]
    fn no_prompt_pattern_is_not_detected() {
        let det = ActivityDetector::new();
        let c = det.classify("", "compiling crate kasmos", InstanceStatus::Running, 0);
        assert!(!c.prompt_detected);
    }

    #[test]
    fn last_activity_is_truncated() {
        let det = ActivityDetector::new();
        let long_line = "x".repeat(200);
        let c = det.classify("", &long_line, InstanceStatus::Running, 0);
        assert_eq!(c.last_activity.unwrap().chars().count(), LAST_ACTIVITY_MAX_CHARS);
    }

    #[test]
    fn blank_content_has_no_last_activity() {
        let det = ActivityDetector::new();
        let c = det.classify("", "\n\n   \n", InstanceStatus::Running, 0);
        assert_eq!(c.last_activity, None);
    }

    #[test]
    fn loading_persists_while_unstable_and_unchanged() {
        let det = ActivityDetector::new();
        let content = "starting up...";
        let c = det.classify(content, content, InstanceStatus::Loading, 0);
        assert_eq!(c.status, InstanceStatus::Loading);
    }
}
