//! Global activity snapshots for editor accounts.
//!
//! The live source is the MediaWiki `globaluserinfo` API on the meta wiki:
//! one GET per editor returning the cumulative edit count plus the per-wiki
//! merged accounts (each of which may carry a block entry). A fixed provider
//! substitutes a canned payload so batch runs can be replayed
//! deterministically in tests.

use serde::{Deserialize, Serialize};
use url::Url;

/// Errors raised while fetching or decoding a snapshot.
///
/// These are per-record conditions for the batch driver: a failed fetch
/// skips that editor and the pass continues.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Malformed API response: {0}")]
    Malformed(String),
}

/// A point-in-time read of an account's global activity metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalUserInfo {
    /// Global user id. Zero in override payloads that skip identity checks.
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub editcount: i64,
    #[serde(default)]
    pub merged: Vec<MergedAccount>,
}

/// One per-wiki account merged into the global account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedAccount {
    #[serde(default)]
    pub wiki: String,
    #[serde(default)]
    pub editcount: i64,
    /// Present only while the account is blocked on this wiki.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<BlockInfo>,
}

/// Block details attached to a merged account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInfo {
    #[serde(default)]
    pub expiry: String,
    #[serde(default)]
    pub reason: String,
}

/// Source of activity snapshots, swappable for deterministic runs.
///
/// `Ok(None)` signals an unfetchable account (deleted or renamed upstream,
/// or an identity mismatch); the driver treats that as a per-record skip.
pub trait SnapshotProvider {
    fn fetch(&self, wp_username: &str, wp_sub: i64) -> Result<Option<GlobalUserInfo>, FetchError>;
}

// ===========================================================================
// Live provider
// ===========================================================================

/// Wire envelope for `action=query&meta=globaluserinfo`.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    query: Option<QueryBlock>,
}

#[derive(Debug, Deserialize)]
struct QueryBlock {
    #[serde(default)]
    globaluserinfo: Option<RawUserInfo>,
}

#[derive(Debug, Deserialize)]
struct RawUserInfo {
    /// Set when the requested account does not exist.
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    editcount: i64,
    #[serde(default)]
    merged: Vec<MergedAccount>,
}

/// Fetches snapshots from the live `globaluserinfo` endpoint.
pub struct LiveSnapshotProvider {
    client: reqwest::blocking::Client,
    endpoint: Url,
}

impl LiveSnapshotProvider {
    pub fn new(api_url: &str) -> Result<Self, FetchError> {
        Ok(Self {
            client: reqwest::blocking::Client::new(),
            endpoint: Url::parse(api_url)?,
        })
    }
}

impl SnapshotProvider for LiveSnapshotProvider {
    fn fetch(&self, wp_username: &str, wp_sub: i64) -> Result<Option<GlobalUserInfo>, FetchError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("meta", "globaluserinfo")
            .append_pair("guiuser", wp_username)
            .append_pair("guiprops", "editcount|merged")
            .append_pair("format", "json")
            .append_pair("formatversion", "2");

        let response: ApiResponse = self.client.get(url).send()?.error_for_status()?.json()?;

        let info = response
            .query
            .and_then(|q| q.globaluserinfo)
            .ok_or_else(|| FetchError::Malformed("no globaluserinfo in response".into()))?;

        if info.missing {
            return Ok(None);
        }

        // The stored global id must match the fetched one; a mismatch means
        // the username now belongs to a different account (rename/usurp).
        if info.id != wp_sub {
            log::warn!(
                "Global user id mismatch for '{}': stored {}, fetched {}",
                wp_username,
                wp_sub,
                info.id
            );
            return Ok(None);
        }

        Ok(Some(GlobalUserInfo {
            id: info.id,
            name: info.name,
            editcount: info.editcount,
            merged: info.merged,
        }))
    }
}

// ===========================================================================
// Fixed provider
// ===========================================================================

/// Returns the same payload for every account. Bypasses identity checks;
/// intended for backdated or faked runs.
pub struct FixedSnapshotProvider {
    payload: GlobalUserInfo,
}

impl FixedSnapshotProvider {
    pub fn new(payload: GlobalUserInfo) -> Self {
        Self { payload }
    }

    /// Parse an override payload from CLI-supplied JSON.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            payload: serde_json::from_str(raw)?,
        })
    }
}

impl SnapshotProvider for FixedSnapshotProvider {
    fn fetch(&self, _wp_username: &str, _wp_sub: i64) -> Result<Option<GlobalUserInfo>, FetchError> {
        Ok(Some(self.payload.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_present_account() {
        let raw = r#"{
            "batchcomplete": true,
            "query": {
                "globaluserinfo": {
                    "home": "enwiki",
                    "id": 5000,
                    "name": "Alice",
                    "editcount": 120,
                    "merged": [
                        {"wiki": "enwiki", "editcount": 100},
                        {"wiki": "frwiki", "editcount": 20,
                         "blocked": {"expiry": "infinity", "reason": "spam"}}
                    ]
                }
            }
        }"#;

        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        let info = parsed.query.unwrap().globaluserinfo.unwrap();
        assert!(!info.missing);
        assert_eq!(info.id, 5000);
        assert_eq!(info.editcount, 120);
        assert_eq!(info.merged.len(), 2);
        assert!(info.merged[0].blocked.is_none());
        assert!(info.merged[1].blocked.is_some());
    }

    #[test]
    fn test_deserialize_missing_account() {
        let raw = r#"{"query": {"globaluserinfo": {"missing": true, "name": "Ghost"}}}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.query.unwrap().globaluserinfo.unwrap().missing);
    }

    #[test]
    fn test_fixed_provider_returns_payload_for_any_account() {
        let provider = FixedSnapshotProvider::from_json(r#"{"editcount": 42, "merged": []}"#)
            .unwrap();

        let a = provider.fetch("alice", 1).unwrap().unwrap();
        let b = provider.fetch("bob", 2).unwrap().unwrap();
        assert_eq!(a.editcount, 42);
        assert_eq!(b.editcount, 42);
    }
}
