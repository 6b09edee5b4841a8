//! Eligibility decision functions for the Bundle program.
//!
//! Each evaluator is a pure function: no I/O, no clock reads, no database
//! access. The batch driver feeds them a previously stored metrics record
//! plus a freshly fetched snapshot and writes the results back. Because the
//! functions are total over their inputs, re-running a pass with the same
//! snapshot and reference time reproduces the same outputs.

use chrono::{DateTime, Duration, Utc};

use crate::db::EditorRecord;
use crate::snapshot::MergedAccount;

/// Lifetime edit count required for validity.
pub const MINIMUM_EDITS: i64 = 500;

/// Edits within the rolling window required to count as recently active.
pub const RECENT_EDITS_THRESHOLD: i64 = 10;

/// Length of the rolling window used to measure recent activity.
pub const RECENT_WINDOW_DAYS: i64 = 30;

/// Updated rolling-window bookkeeping produced by [`recent_edits`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentActivity {
    /// Start of the rolling window after this evaluation.
    pub baseline_updated: DateTime<Utc>,
    /// Cumulative edit count at the start of the window.
    pub baseline_editcount: i64,
    /// Edits accumulated within the window (never negative).
    pub recent_editcount: i64,
    pub enough_recent_edits: bool,
}

/// Roll the recent-activity window forward and measure edits inside it.
///
/// The window is a two-state machine:
/// - **expired** (no baseline yet, or the baseline is older than
///   `window_days` relative to `reference_time`): the baseline moves to the
///   *previous update point* (`old_updated`, `old_editcount`). Anchoring to
///   the last update rather than to the reference time keeps the window a
///   fixed length even when updates are infrequent.
/// - **fresh**: the baseline is carried forward unchanged.
///
/// Edit counts from the source are supposed to be non-decreasing; a fetched
/// count below the baseline is a data anomaly and the delta is clamped to 0.
pub fn recent_edits(
    new_editcount: i64,
    old_editcount: i64,
    old_updated: DateTime<Utc>,
    baseline_updated: Option<DateTime<Utc>>,
    baseline_editcount: i64,
    reference_time: DateTime<Utc>,
    window_days: i64,
) -> RecentActivity {
    let window = Duration::days(window_days);
    let expired = match baseline_updated {
        // First evaluation: the record's last update stamp anchors the window.
        None => true,
        Some(prev) => reference_time - prev > window,
    };

    let (new_baseline_updated, new_baseline_editcount) = if expired {
        (old_updated, old_editcount)
    } else {
        // An absent baseline always takes the expired branch, so the
        // fallback here is unreachable in practice.
        (baseline_updated.unwrap_or(old_updated), baseline_editcount)
    };

    let recent_editcount = (new_editcount - new_baseline_editcount).max(0);

    RecentActivity {
        baseline_updated: new_baseline_updated,
        baseline_editcount: new_baseline_editcount,
        recent_editcount,
        enough_recent_edits: recent_editcount >= RECENT_EDITS_THRESHOLD,
    }
}

/// Whether a cumulative edit count meets the lifetime threshold.
pub fn enough_edits(editcount: i64) -> bool {
    editcount >= MINIMUM_EDITS
}

/// Whether the editor is unblocked on every merged wiki account.
///
/// An empty merged list means the upstream account data is unusable, so the
/// editor is treated as blocked rather than silently passed.
pub fn not_blocked(merged: &[MergedAccount]) -> bool {
    !merged.is_empty() && merged.iter().all(|account| account.blocked.is_none())
}

/// Conjunction of the validity signals.
///
/// `ignore_blocks` is the staff override: when set, a block on some wiki does
/// not invalidate the editor.
pub fn editor_valid(
    enough_edits: bool,
    account_old_enough: bool,
    not_blocked: bool,
    ignore_blocks: bool,
) -> bool {
    enough_edits && account_old_enough && (not_blocked || ignore_blocks)
}

/// Final Bundle eligibility decision.
///
/// Eligibility is never sticky: it is recomputed fully from the current
/// record every pass, so an editor who regains activity regains eligibility
/// on the next run without manual intervention. A manual revocation
/// (`bundle_access_revoked`) always wins.
pub fn bundle_eligible(editor: &EditorRecord) -> bool {
    editor.wp_valid && editor.wp_enough_recent_edits && !editor.bundle_access_revoked
}
