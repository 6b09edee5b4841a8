//! editorsync — keeps editor activity metrics fresh and recomputes Bundle
//! eligibility.
//!
//! One pass selects editors whose cached metrics are older than the staleness
//! window, fetches each one's global activity snapshot, rolls the
//! recent-activity window forward, recomputes validity and eligibility, and
//! persists the result plus its Bundle authorization. The decision functions
//! live in [`eligibility`]; the pass itself in [`updater`].

pub mod db;
pub mod eligibility;
pub mod error;
pub mod snapshot;
pub mod types;
pub mod updater;
