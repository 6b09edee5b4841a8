//! Batch eligibility update pass.
//!
//! Selects editors whose cached metrics are older than the staleness window,
//! fetches a fresh activity snapshot for each, runs the eligibility
//! evaluators, and persists the updated record plus its Bundle authorization.
//! Records are processed strictly one at a time: each one is read, evaluated
//! entirely in memory, and written in a single persistence call before the
//! next is touched, so a crash mid-pass leaves saved records saved and
//! unprocessed records merely stale for the next run.

use chrono::{DateTime, Duration, Utc};

use crate::db::EditorDb;
use crate::eligibility;
use crate::error::UpdateError;
use crate::snapshot::SnapshotProvider;

/// Options for one update pass.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Reference time: decides staleness-window expiry and becomes the new
    /// `wp_editcount_updated` stamp. Overridable for backdated runs.
    pub reference_time: DateTime<Utc>,
    /// Age in days beyond which cached metrics are considered stale.
    pub staleness_days: i64,
    /// Narrow the pass to a single editor.
    pub wp_username: Option<String>,
}

impl UpdateOptions {
    pub fn new(reference_time: DateTime<Utc>) -> Self {
        Self {
            reference_time,
            staleness_days: 30,
            wp_username: None,
        }
    }
}

/// Counts from one update pass. The caller is responsible for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Editors matched by the staleness selection.
    pub selected: usize,
    /// Editors evaluated, persisted, and authorization-refreshed.
    pub updated: usize,
    /// Editors skipped because no snapshot was obtainable.
    pub skipped: usize,
}

/// Run one eligibility update pass.
///
/// Per-record snapshot failures are recoverable: the record is skipped with
/// no mutation and the pass continues. Persistence failures are not masked;
/// they abort the remainder of the pass and already-saved records stay saved.
/// Re-running with the same snapshot and reference time reproduces the same
/// outputs, so the retry mechanism is simply running the pass again.
pub fn run_update(
    db: &EditorDb,
    provider: &dyn SnapshotProvider,
    opts: &UpdateOptions,
) -> Result<UpdateReport, UpdateError> {
    let cutoff = opts.reference_time - Duration::days(opts.staleness_days);
    let editors = db.get_stale_editors(cutoff, opts.wp_username.as_deref())?;

    let mut report = UpdateReport {
        selected: editors.len(),
        ..Default::default()
    };

    for mut editor in editors {
        let info = match provider.fetch(&editor.wp_username, editor.wp_sub) {
            Ok(Some(info)) => info,
            Ok(None) => {
                log::debug!(
                    "No snapshot for '{}'; leaving record untouched",
                    editor.wp_username
                );
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                log::warn!("Snapshot fetch failed for '{}': {}", editor.wp_username, e);
                report.skipped += 1;
                continue;
            }
        };

        // Roll the recent-activity window forward.
        let recent = eligibility::recent_edits(
            info.editcount,
            editor.wp_editcount,
            editor.wp_editcount_updated,
            editor.wp_editcount_prev_updated,
            editor.wp_editcount_prev,
            opts.reference_time,
            eligibility::RECENT_WINDOW_DAYS,
        );
        editor.wp_editcount_prev_updated = Some(recent.baseline_updated);
        editor.wp_editcount_prev = recent.baseline_editcount;
        editor.wp_editcount_recent = recent.recent_editcount;
        editor.wp_enough_recent_edits = recent.enough_recent_edits;

        // Stamp the fresh totals.
        editor.wp_editcount = info.editcount;
        editor.wp_editcount_updated = opts.reference_time;

        // Validity. `wp_account_old_enough` is a fixed input set elsewhere.
        editor.wp_enough_edits = eligibility::enough_edits(editor.wp_editcount);
        editor.wp_not_blocked = eligibility::not_blocked(&info.merged);
        editor.wp_valid = eligibility::editor_valid(
            editor.wp_enough_edits,
            editor.wp_account_old_enough,
            editor.wp_not_blocked,
            editor.ignore_wp_blocks,
        );

        editor.wp_bundle_eligible = eligibility::bundle_eligible(&editor);

        db.save_editor(&editor)?;
        db.update_bundle_authorization(&editor, opts.reference_time)?;
        report.updated += 1;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    use crate::db::EditorRecord;
    use crate::snapshot::{FetchError, FixedSnapshotProvider, GlobalUserInfo, MergedAccount};

    /// Provider that never finds an account.
    struct MissingProvider;

    impl SnapshotProvider for MissingProvider {
        fn fetch(&self, _: &str, _: i64) -> Result<Option<GlobalUserInfo>, FetchError> {
            Ok(None)
        }
    }

    fn ts(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 12, 0, 0).unwrap()
    }

    fn open_test_db(dir: &TempDir) -> EditorDb {
        EditorDb::open_at(dir.path().join("editors.db")).unwrap()
    }

    fn snapshot(editcount: i64) -> GlobalUserInfo {
        GlobalUserInfo {
            id: 0,
            name: String::new(),
            editcount,
            merged: vec![MergedAccount {
                wiki: "enwiki".into(),
                editcount,
                blocked: None,
            }],
        }
    }

    /// Forty-days-stale editor, no prior baseline, stored count 100.
    fn stale_editor(now: DateTime<Utc>) -> EditorRecord {
        let mut editor = EditorRecord::new("alice", 1, now - Duration::days(40));
        editor.wp_editcount = 100;
        editor.wp_account_old_enough = true;
        editor
    }

    #[test]
    fn test_stale_editor_window_rolls_and_eligibility_is_set() {
        let dir = TempDir::new().unwrap();
        let db = open_test_db(&dir);
        let now = ts(2026, 8, 30);

        let editor = stale_editor(now);
        let old_updated = editor.wp_editcount_updated;
        db.save_editor(&editor).unwrap();

        let provider = FixedSnapshotProvider::new(snapshot(620));
        let report = run_update(&db, &provider, &UpdateOptions::new(now)).unwrap();
        assert_eq!(report, UpdateReport { selected: 1, updated: 1, skipped: 0 });

        let updated = db.get_editor("alice").unwrap().unwrap();
        // Window expired: baseline anchors to the old update point and count.
        assert_eq!(updated.wp_editcount_prev_updated, Some(old_updated));
        assert_eq!(updated.wp_editcount_prev, 100);
        assert_eq!(updated.wp_editcount_recent, 520);
        assert!(updated.wp_enough_recent_edits);
        assert_eq!(updated.wp_editcount, 620);
        assert_eq!(updated.wp_editcount_updated, now);
        assert!(updated.wp_enough_edits);
        assert!(updated.wp_not_blocked);
        assert!(updated.wp_valid);
        assert!(updated.wp_bundle_eligible);

        // Downstream authorization was refreshed.
        let auths = db.get_authorizations("alice").unwrap();
        assert_eq!(auths.len(), 1);
        assert!(auths[0].date_expired.is_none());
    }

    #[test]
    fn test_pass_is_idempotent_under_fixed_snapshot_and_time() {
        let dir = TempDir::new().unwrap();
        let db = open_test_db(&dir);
        let now = ts(2026, 8, 30);

        db.save_editor(&stale_editor(now)).unwrap();
        let provider = FixedSnapshotProvider::new(snapshot(620));
        let opts = UpdateOptions::new(now);

        run_update(&db, &provider, &opts).unwrap();
        let first = db.get_editor("alice").unwrap().unwrap();

        // Second run: the record is no longer stale, so nothing is selected
        // and no field drifts.
        let report = run_update(&db, &provider, &opts).unwrap();
        assert_eq!(report.selected, 0);
        let second = db.get_editor("alice").unwrap().unwrap();
        assert_eq!(second, first);
        assert_eq!(db.get_authorizations("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_editcount_updated_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let db = open_test_db(&dir);
        let now = ts(2026, 8, 30);

        let editor = stale_editor(now);
        let before = editor.wp_editcount_updated;
        db.save_editor(&editor).unwrap();

        let provider = FixedSnapshotProvider::new(snapshot(100));
        run_update(&db, &provider, &UpdateOptions::new(now)).unwrap();

        let after = db.get_editor("alice").unwrap().unwrap();
        assert!(after.wp_editcount_updated >= before);
    }

    #[test]
    fn test_username_filter_updates_only_that_editor() {
        let dir = TempDir::new().unwrap();
        let db = open_test_db(&dir);
        let now = ts(2026, 8, 30);

        let alice = stale_editor(now);
        let mut bob = EditorRecord::new("bob", 2, now - Duration::days(45));
        bob.wp_editcount = 50;
        db.save_editor(&alice).unwrap();
        db.save_editor(&bob).unwrap();

        let provider = FixedSnapshotProvider::new(snapshot(620));
        let mut opts = UpdateOptions::new(now);
        opts.wp_username = Some("alice".to_string());

        let report = run_update(&db, &provider, &opts).unwrap();
        assert_eq!(report.selected, 1);
        assert_eq!(report.updated, 1);

        // Bob was never touched.
        let bob_after = db.get_editor("bob").unwrap().unwrap();
        assert_eq!(bob_after, bob);
        assert!(db.get_authorizations("bob").unwrap().is_empty());
    }

    #[test]
    fn test_unfetchable_snapshot_leaves_record_untouched() {
        let dir = TempDir::new().unwrap();
        let db = open_test_db(&dir);
        let now = ts(2026, 8, 30);

        let editor = stale_editor(now);
        db.save_editor(&editor).unwrap();

        let report = run_update(&db, &MissingProvider, &UpdateOptions::new(now)).unwrap();
        assert_eq!(report, UpdateReport { selected: 1, updated: 0, skipped: 1 });

        let after = db.get_editor("alice").unwrap().unwrap();
        assert_eq!(after, editor);
        assert!(db.get_authorizations("alice").unwrap().is_empty());
    }

    #[test]
    fn test_blocked_editor_is_invalid_unless_override_set() {
        let dir = TempDir::new().unwrap();
        let db = open_test_db(&dir);
        let now = ts(2026, 8, 30);

        let mut blocked_snapshot = snapshot(620);
        blocked_snapshot.merged[0].blocked = Some(crate::snapshot::BlockInfo {
            expiry: "infinity".into(),
            reason: "abuse".into(),
        });

        db.save_editor(&stale_editor(now)).unwrap();
        let provider = FixedSnapshotProvider::new(blocked_snapshot);
        run_update(&db, &provider, &UpdateOptions::new(now)).unwrap();

        let after = db.get_editor("alice").unwrap().unwrap();
        assert!(!after.wp_not_blocked);
        assert!(!after.wp_valid);
        assert!(!after.wp_bundle_eligible);

        // Same data with the staff override: blocks are ignored.
        let mut overridden = stale_editor(now);
        overridden.wp_username = "dana".to_string();
        overridden.wp_sub = 4;
        overridden.ignore_wp_blocks = true;
        db.save_editor(&overridden).unwrap();

        let mut provider_snapshot = snapshot(620);
        provider_snapshot.merged[0].blocked = Some(crate::snapshot::BlockInfo {
            expiry: "infinity".into(),
            reason: "abuse".into(),
        });
        let provider = FixedSnapshotProvider::new(provider_snapshot);
        run_update(&db, &provider, &UpdateOptions::new(now)).unwrap();

        let dana = db.get_editor("dana").unwrap().unwrap();
        assert!(!dana.wp_not_blocked);
        assert!(dana.wp_valid);
    }

    #[test]
    fn test_lost_eligibility_expires_the_authorization() {
        let dir = TempDir::new().unwrap();
        let db = open_test_db(&dir);
        let first_run = ts(2026, 8, 30);

        db.save_editor(&stale_editor(first_run)).unwrap();
        let provider = FixedSnapshotProvider::new(snapshot(620));
        run_update(&db, &provider, &UpdateOptions::new(first_run)).unwrap();
        assert!(db.get_editor("alice").unwrap().unwrap().wp_bundle_eligible);

        // Next pass, 40 days later, no new edits: window expires, recent
        // activity drops to zero, eligibility is lost.
        let second_run = first_run + Duration::days(40);
        run_update(&db, &provider, &UpdateOptions::new(second_run)).unwrap();

        let after = db.get_editor("alice").unwrap().unwrap();
        assert_eq!(after.wp_editcount_recent, 0);
        assert!(!after.wp_bundle_eligible);

        let auths = db.get_authorizations("alice").unwrap();
        assert_eq!(auths.len(), 1);
        assert_eq!(auths[0].date_expired, Some(second_run));
    }
}
