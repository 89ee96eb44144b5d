/*
 * keyceremony: key-splitting ceremony engine and shell
 * Copyright (C) 2024-2026 keyceremony authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! The session journal and its provenance seal.
//!
//! Every ceremony operation appends to an in-memory journal. Sealing
//! serializes the journal to canonical JSON once, hashes it with SHA-256 and
//! signs it with HMAC-SHA256 under the administrator's session key. A third
//! party holding the admin password can re-derive the key (fixed salt, same
//! PBKDF2 parameters) and re-verify both values byte-for-byte; any bit flip
//! in the stored `SessionData` breaks the pair.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{output::OrganizationInfo, sealed::SealedBytes};

type HmacSha256 = Hmac<Sha256>;

/// Journal/audit event type tags.
pub mod event_types {
    pub const SESSION_START: &str = "SESSION_START";
    pub const SESSION_END: &str = "SESSION_END";
    pub const ADMIN_KEY_BOUND: &str = "ADMIN_KEY_BOUND";
    pub const ORGANIZATION_SET: &str = "ORGANIZATION_SET";
    pub const PARAMETERS_SET: &str = "PARAMETERS_SET";
    pub const SECRET_GENERATED: &str = "SECRET_GENERATED";
    pub const SECRET_PROVIDED: &str = "SECRET_PROVIDED";
    pub const SHARES_SPLIT: &str = "SHARES_SPLIT";
    pub const KEEPER_ENROLLED: &str = "KEEPER_ENROLLED";
    pub const SELFTEST_STARTED: &str = "SELFTEST_STARTED";
    pub const SELFTEST_PASSED: &str = "SELFTEST_PASSED";
    pub const SELFTEST_FAILED: &str = "SELFTEST_FAILED";
    pub const SHARES_FILE_WRITTEN: &str = "SHARES_FILE_WRITTEN";
    pub const CREATE_ABANDONED: &str = "CREATE_ABANDONED";
    pub const RECOVERY_STARTED: &str = "RECOVERY_STARTED";
    pub const RECOVERY_SHARE_ACCEPTED: &str = "RECOVERY_SHARE_ACCEPTED";
    pub const RECOVERY_DECRYPT_FAILED: &str = "RECOVERY_DECRYPT_FAILED";
    pub const RECOVERY_SUCCEEDED: &str = "RECOVERY_SUCCEEDED";
    pub const RECOVERY_FAILED: &str = "RECOVERY_FAILED";
    pub const OPERATION_FAILED: &str = "OPERATION_FAILED";
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JournalEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub description: String,
}

/// Appended to the journal when a shares file is emitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShareCreationRecord {
    pub timestamp: DateTime<Utc>,
    pub output_file: String,
    pub total_shares: u8,
    pub threshold_required: u8,
    pub master_secret_hash: String,
    pub keeper_names: Vec<String>,
}

/// Appended for every reconstruction attempt, successful or not.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecoveryRecord {
    pub timestamp: DateTime<Utc>,
    pub source_file: String,
    pub success: bool,
    pub shares_used: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionSummary {
    pub total_shares_created: u32,
    pub total_share_sets: u32,
    pub total_recovery_attempts: u32,
    pub successful_recoveries: u32,
    pub failed_recoveries: u32,
    pub total_events: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionJournal {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub machine_name: String,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationInfo>,
    pub events: Vec<JournalEvent>,
    pub shares_created: Vec<ShareCreationRecord>,
    pub shares_recovered: Vec<RecoveryRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,
}

impl SessionJournal {
    pub fn new(session_id: String) -> Self {
        let mut journal = Self {
            session_id,
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: None,
            machine_name: machine_name(),
            user_name: user_name(),
            organization: None,
            events: Vec::new(),
            shares_created: Vec::new(),
            shares_recovered: Vec::new(),
            summary: None,
        };
        journal.record(event_types::SESSION_START, "ceremony session opened");
        journal
    }

    pub fn record(&mut self, event_type: &str, description: impl Into<String>) {
        self.events.push(JournalEvent {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            description: description.into(),
        });
    }

    pub fn is_sealed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Stamp the end of the session and compute the terminal summary. Called
    /// exactly once, by `finalize_session`.
    pub fn close(&mut self) {
        let end = Utc::now();
        self.record(event_types::SESSION_END, "ceremony session closed");
        self.end_time = Some(end);
        self.duration_seconds = Some((end - self.start_time).num_seconds());
        self.summary = Some(SessionSummary {
            total_shares_created: self
                .shares_created
                .iter()
                .map(|r| r.total_shares as u32)
                .sum(),
            total_share_sets: self.shares_created.len() as u32,
            total_recovery_attempts: self.shares_recovered.len() as u32,
            successful_recoveries: self.shares_recovered.iter().filter(|r| r.success).count()
                as u32,
            failed_recoveries: self.shares_recovered.iter().filter(|r| !r.success).count() as u32,
            total_events: self.events.len() as u32,
        });
    }
}

/// The sealed wrapper persisted as `session_complete_<ts>.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionOutput {
    pub session_data: SessionJournal,
    pub session_data_hash: String,
    pub admin_session_hmac: String,
    pub hmac_algorithm: String,
    pub signature_timestamp: DateTime<Utc>,
    pub signature_note: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("journal serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("hmac keying failed: {0}")]
    Hmac(String),
}

/// Hash and sign a closed journal under the admin session key.
pub fn seal_journal(
    journal: &SessionJournal,
    admin_key: &SealedBytes,
) -> Result<SessionOutput, SealError> {
    let canonical = serde_json::to_vec(journal)?;

    let digest = Sha256::digest(&canonical);

    let mut mac = HmacSha256::new_from_slice(admin_key.expose())
        .map_err(|err| SealError::Hmac(err.to_string()))?;
    mac.update(&canonical);
    let signature = mac.finalize().into_bytes();

    Ok(SessionOutput {
        session_data: journal.clone(),
        session_data_hash: BASE64.encode(digest),
        admin_session_hmac: BASE64.encode(signature),
        hmac_algorithm: "HMAC-SHA256".to_string(),
        signature_timestamp: Utc::now(),
        signature_note:
            "HMAC computed over the canonical JSON of SessionData with the administrator session key"
                .to_string(),
    })
}

/// Third-party verification: recompute hash and HMAC over the stored
/// `SessionData` and compare both in constant time.
pub fn verify_session_output(output: &SessionOutput, admin_key: &SealedBytes) -> bool {
    let canonical = match serde_json::to_vec(&output.session_data) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let digest = Sha256::digest(&canonical);
    let hash_ok = match BASE64.decode(&output.session_data_hash) {
        Ok(stored) => bool::from(digest.as_slice().ct_eq(&stored)),
        Err(_) => false,
    };

    let mut mac = match HmacSha256::new_from_slice(admin_key.expose()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(&canonical);
    let hmac_ok = match BASE64.decode(&output.admin_session_hmac) {
        Ok(stored) => mac.verify_slice(&stored).is_ok(),
        Err(_) => false,
    };

    hash_ok && hmac_ok
}

fn machine_name() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    fn admin_key() -> SealedBytes {
        SealedBytes::new(vec![7u8; 32], 1)
    }

    fn sample_journal() -> SessionJournal {
        let mut journal = SessionJournal::new("test-session".to_string());
        journal.record(event_types::PARAMETERS_SET, "threshold 2 of 3");
        journal.shares_created.push(ShareCreationRecord {
            timestamp: Utc::now(),
            output_file: "secret_shares_20260101_000000.json".to_string(),
            total_shares: 3,
            threshold_required: 2,
            master_secret_hash: "hash".to_string(),
            keeper_names: vec!["Ada".to_string(), "Grace".to_string(), "Edsger".to_string()],
        });
        journal.shares_recovered.push(RecoveryRecord {
            timestamp: Utc::now(),
            source_file: "secret_shares_20260101_000000.json".to_string(),
            success: true,
            shares_used: 2,
            failure_reason: None,
        });
        journal.close();
        journal
    }

    #[test]
    fn close_computes_summary() {
        let journal = sample_journal();
        let summary = journal.summary.as_ref().unwrap();
        assert_eq!(summary.total_shares_created, 3);
        assert_eq!(summary.total_share_sets, 1);
        assert_eq!(summary.total_recovery_attempts, 1);
        assert_eq!(summary.successful_recoveries, 1);
        assert_eq!(summary.failed_recoveries, 0);
        assert_eq!(summary.total_events as usize, journal.events.len());
        assert_eq!(
            journal.events.last().unwrap().event_type,
            event_types::SESSION_END
        );
        assert!(journal.duration_seconds.is_some());
    }

    #[test]
    fn seal_then_verify() {
        let key = admin_key();
        let output = seal_journal(&sample_journal(), &key).unwrap();
        assert_eq!(output.hmac_algorithm, "HMAC-SHA256");
        assert!(verify_session_output(&output, &key));
    }

    #[test]
    fn verification_fails_under_wrong_key() {
        let output = seal_journal(&sample_journal(), &admin_key()).unwrap();
        let wrong = SealedBytes::new(vec![8u8; 32], 1);
        assert!(!verify_session_output(&output, &wrong));
    }

    #[test]
    fn any_mutation_breaks_the_seal() {
        let key = admin_key();
        let mut output = seal_journal(&sample_journal(), &key).unwrap();
        output.session_data.user_name.push('x');
        assert!(!verify_session_output(&output, &key));
    }

    #[test]
    fn seal_survives_json_roundtrip() {
        let key = admin_key();
        let output = seal_journal(&sample_journal(), &key).unwrap();
        let json = serde_json::to_string_pretty(&output).unwrap();
        let parsed: SessionOutput = serde_json::from_str(&json).unwrap();
        assert!(verify_session_output(&parsed, &key));
    }

    #[test]
    fn journal_json_uses_pascal_case() {
        let json = serde_json::to_string(&sample_journal()).unwrap();
        assert!(json.contains("\"SessionId\""));
        assert!(json.contains("\"MachineName\""));
        assert!(json.contains("\"SharesCreated\""));
        assert!(!json.contains("\"session_id\""));
    }
}
