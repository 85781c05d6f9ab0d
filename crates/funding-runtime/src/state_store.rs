//! State Store - durable single-slot record of the bridge in flight
//!
//! The record lives in one JSON file:
//!
//! ```json
//! { "version": 1,
//!   "bridge": { "baselineBalance": "500", "amount": "2000",
//!               "claimSecretHash": "0x..", "messageHash": "0x..",
//!               "messageLeafIndex": "7", "submittedAtMs": 1700000000000 } }
//! ```
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the target, so readers see either the old record or the new one.

use l1_integration::{parse_uint, BridgeSubmission, ClaimMaterial, Hash32};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Schema version written to and accepted from disk
pub const STATE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("malformed bridge state in {}: {reason}", .path.display())]
    MalformedState { path: PathBuf, reason: String },

    #[error("bridge state I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode bridge state: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PersistedStateFile {
    version: u32,
    bridge: PersistedBridge,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PersistedBridge {
    baseline_balance: String,
    amount: String,
    claim_secret_hash: String,
    message_hash: String,
    message_leaf_index: String,
    submitted_at_ms: u64,
}

impl From<&BridgeSubmission> for PersistedStateFile {
    fn from(submission: &BridgeSubmission) -> Self {
        Self {
            version: STATE_VERSION,
            bridge: PersistedBridge {
                baseline_balance: submission.baseline_balance.to_string(),
                amount: submission.amount.to_string(),
                claim_secret_hash: submission.claim.claim_secret_hash.to_string(),
                message_hash: submission.claim.message_hash.to_string(),
                message_leaf_index: submission.claim.message_leaf_index.to_string(),
                submitted_at_ms: submission.submitted_at_ms,
            },
        }
    }
}

impl PersistedStateFile {
    /// Validate every field; the first violation is reported
    fn into_submission(self) -> Result<BridgeSubmission, String> {
        if self.version != STATE_VERSION {
            return Err(format!(
                "unsupported version {} (expected {STATE_VERSION})",
                self.version
            ));
        }
        let b = self.bridge;

        let baseline_balance =
            parse_uint(&b.baseline_balance).map_err(|e| format!("baselineBalance: {e}"))?;
        let amount = parse_uint(&b.amount).map_err(|e| format!("amount: {e}"))?;
        if amount == 0 {
            return Err("amount: must be greater than zero".to_string());
        }
        let claim_secret_hash = b
            .claim_secret_hash
            .parse::<Hash32>()
            .map_err(|e| format!("claimSecretHash: {e}"))?;
        let message_hash = b
            .message_hash
            .parse::<Hash32>()
            .map_err(|e| format!("messageHash: {e}"))?;
        let message_leaf_index = parse_uint(&b.message_leaf_index)
            .map_err(|e| format!("messageLeafIndex: {e}"))
            .and_then(|v| u64::try_from(v).map_err(|_| "messageLeafIndex: out of range".to_string()))?;

        Ok(BridgeSubmission {
            baseline_balance,
            amount,
            claim: ClaimMaterial {
                claim_secret_hash,
                message_hash,
                message_leaf_index,
            },
            submitted_at_ms: b.submitted_at_ms,
        })
    }
}

/// Single-slot, crash-safe persistence of the in-flight bridge
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bridge-state".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn io_err(&self, path: &Path, source: io::Error) -> StateError {
        StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Load the persisted submission; `None` when there is no file
    pub fn read(&self) -> Result<Option<BridgeSubmission>, StateError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(&self.path, e)),
        };

        let malformed = |reason: String| StateError::MalformedState {
            path: self.path.clone(),
            reason,
        };

        let file: PersistedStateFile =
            serde_json::from_slice(&bytes).map_err(|e| malformed(e.to_string()))?;
        file.into_submission().map(Some).map_err(malformed)
    }

    /// Atomically replace the persisted submission
    pub fn write(&self, submission: &BridgeSubmission) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(&PersistedStateFile::from(submission))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_err(dir, e))?;
        }

        let tmp = self.tmp_path();
        self.write_tmp(&tmp, &bytes)
            .map_err(|e| self.io_err(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(&self.path, e))?;
        self.sync_dir();

        tracing::debug!(path = %self.path.display(), "Persisted bridge state");
        Ok(())
    }

    /// Remove the persisted submission. A missing file is not an error.
    pub fn clear(&self) -> Result<(), StateError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                self.sync_dir();
                tracing::debug!(path = %self.path.display(), "Cleared bridge state");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(&self.path, e)),
        }
    }

    fn write_tmp(&self, tmp: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    /// Make the rename or unlink durable. Best effort.
    fn sync_dir(&self) {
        #[cfg(unix)]
        {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
                    tracing::warn!(dir = %dir.display(), "Failed to sync state directory: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HASH_A: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
    const HASH_B: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

    fn submission(amount: u128) -> BridgeSubmission {
        BridgeSubmission {
            baseline_balance: 500,
            amount,
            claim: ClaimMaterial {
                claim_secret_hash: HASH_A.parse().unwrap(),
                message_hash: HASH_B.parse().unwrap(),
                message_leaf_index: 42,
            },
            submitted_at_ms: 1_700_000_000_000,
        }
    }

    fn raw_file(amount: &str, version: u32) -> String {
        format!(
            r#"{{"version":{version},"bridge":{{"baselineBalance":"500","amount":"{amount}","claimSecretHash":"{HASH_A}","messageHash":"{HASH_B}","messageLeafIndex":"42","submittedAtMs":1}}}}"#
        )
    }

    #[test]
    fn test_missing_file_reads_none() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.json"));

        store.write(&submission(2000)).unwrap();
        assert_eq!(store.read().unwrap(), Some(submission(2000)));
    }

    #[test]
    fn test_file_layout() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.write(&submission(2000)).unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["bridge"]["baselineBalance"], "500");
        assert_eq!(json["bridge"]["amount"], "2000");
        assert_eq!(json["bridge"]["messageHash"], HASH_B);
        assert_eq!(json["bridge"]["messageLeafIndex"], "42");
        assert_eq!(json["bridge"]["submittedAtMs"], 1_700_000_000_000u64);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.write(&submission(2000)).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.write(&submission(2000)).unwrap();

        store.clear().unwrap();
        assert!(store.read().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_zero_amount_is_malformed() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        fs::write(store.path(), raw_file("0", 1)).unwrap();

        match store.read() {
            Err(StateError::MalformedState { reason, .. }) => assert!(reason.contains("amount")),
            other => panic!("expected MalformedState, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_violations_are_malformed() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        let cases = [
            raw_file("2000", 2),
            raw_file("12abc", 1),
            raw_file("-5", 1),
            raw_file("2000", 1).replace(HASH_B, "0x1234"),
            raw_file("2000", 1).replace(HASH_A, &HASH_A[2..]),
            raw_file("2000", 1).replace("\"42\"", "\"x\""),
            raw_file("2000", 1).replace("\"submittedAtMs\":1", "\"submittedAtMs\":-1"),
            "{\"version\":1}".to_string(),
            "{not json".to_string(),
        ];

        for case in cases {
            fs::write(store.path(), &case).unwrap();
            assert!(
                matches!(store.read(), Err(StateError::MalformedState { .. })),
                "accepted malformed state: {case}"
            );
        }
    }

    #[test]
    fn test_interrupted_write_leaves_previous_state() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.write(&submission(2000)).unwrap();

        // A crash after the temp file is written but before the rename.
        fs::write(store.tmp_path(), b"{\"version\":1,\"bri").unwrap();
        assert_eq!(store.read().unwrap(), Some(submission(2000)));

        // The next successful write replaces both.
        store.write(&submission(3000)).unwrap();
        assert_eq!(store.read().unwrap(), Some(submission(3000)));
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_interrupted_first_write_reads_none() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        fs::write(store.tmp_path(), b"garbage").unwrap();
        assert!(store.read().unwrap().is_none());
    }
}
