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

//! The emitted ceremony artifact: `secret_shares_<ts>.json`.
//!
//! Field names are PascalCase and pretty-printed; absent optional fields are
//! omitted rather than serialized as null. `KdfIterations` recorded here is
//! authoritative for reconstructing this file -- reconstruction must never
//! substitute the live configuration's value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::SealedShare;

pub const OUTPUT_VERSION: &str = "1.0";
pub const ALGORITHM: &str = "Shamir-GF256";
pub const ENCRYPTION_ALGORITHM: &str = "AES-256-GCM";
pub const KDF_ALGORITHM: &str = "PBKDF2-SHA256";

pub const MIN_THRESHOLD: u8 = 2;
pub const MAX_TOTAL_SHARES: u8 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrganizationInfo {
    pub name: String,
    pub contact_phone: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShareConfiguration {
    pub total_shares: u8,
    pub threshold_required: u8,
    pub algorithm: String,
    pub encryption_algorithm: String,
    pub kdf_algorithm: String,
    pub kdf_iterations: u32,
}

impl ShareConfiguration {
    pub fn new(total_shares: u8, threshold_required: u8, kdf_iterations: u32) -> Self {
        Self {
            total_shares,
            threshold_required,
            algorithm: ALGORITHM.to_string(),
            encryption_algorithm: ENCRYPTION_ALGORITHM.to_string(),
            kdf_algorithm: KDF_ALGORITHM.to_string(),
            kdf_iterations,
        }
    }
}

/// One keeper's encrypted share plus their contact attribution.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretKeeperRecord {
    pub id: String,
    pub share_number: u8,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub encrypted_share: String,
    pub hmac: String,
    pub salt: String,
    pub iv: String,
    pub created_at: DateTime<Utc>,
    pub session_id: String,
}

impl SecretKeeperRecord {
    /// The envelope fields, as the decryption layer wants them.
    pub fn sealed_share(&self) -> SealedShare {
        SealedShare {
            encrypted_share: self.encrypted_share.clone(),
            hmac: self.hmac.clone(),
            salt: self.salt.clone(),
            iv: self.iv.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShamirSecretOutput {
    pub version: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub organization: OrganizationInfo,
    pub configuration: ShareConfiguration,
    /// base64(SHA-256(plaintext secret)) -- the reconstruction target.
    pub master_secret_hash: String,
    pub keepers: Vec<SecretKeeperRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("threshold {threshold} and share count {total} are outside 2 <= k <= n <= 100")]
    BadParameters { threshold: u8, total: u8 },

    #[error("output declares {declared} keepers but carries {actual}")]
    KeeperCountMismatch { declared: u8, actual: usize },

    #[error("share number {x} appears on more than one keeper")]
    DuplicateShareNumber { x: u8 },
}

impl ShamirSecretOutput {
    /// Structural invariants every emitted (and every loaded) output must
    /// satisfy.
    pub fn validate(&self) -> Result<(), OutputError> {
        let threshold = self.configuration.threshold_required;
        let total = self.configuration.total_shares;
        if threshold < MIN_THRESHOLD || total < threshold || total > MAX_TOTAL_SHARES {
            return Err(OutputError::BadParameters { threshold, total });
        }
        if self.keepers.len() != total as usize {
            return Err(OutputError::KeeperCountMismatch {
                declared: total,
                actual: self.keepers.len(),
            });
        }
        let mut seen = std::collections::HashSet::with_capacity(self.keepers.len());
        for keeper in &self.keepers {
            if !seen.insert(keeper.share_number) {
                return Err(OutputError::DuplicateShareNumber {
                    x: keeper.share_number,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn keeper(share_number: u8) -> SecretKeeperRecord {
        SecretKeeperRecord {
            id: format!("keeper-{}", share_number),
            share_number,
            name: "Ada Lovelace".to_string(),
            phone: "555 0101".to_string(),
            email: "ada@example.com".to_string(),
            encrypted_share: "YmxvYg==".to_string(),
            hmac: "bWFj".to_string(),
            salt: "c2FsdA==".to_string(),
            iv: "bm9uY2U=".to_string(),
            created_at: Utc::now(),
            session_id: "sess".to_string(),
        }
    }

    fn output(threshold: u8, total: u8, keepers: Vec<SecretKeeperRecord>) -> ShamirSecretOutput {
        ShamirSecretOutput {
            version: OUTPUT_VERSION.to_string(),
            session_id: "sess".to_string(),
            created_at: Utc::now(),
            organization: OrganizationInfo {
                name: "Example Holdings".to_string(),
                contact_phone: "+1 555 0100".to_string(),
            },
            configuration: ShareConfiguration::new(total, threshold, 100_000),
            master_secret_hash: "aGFzaA==".to_string(),
            keepers,
        }
    }

    #[test]
    fn valid_output_passes() {
        let out = output(2, 3, vec![keeper(1), keeper(2), keeper(3)]);
        assert!(out.validate().is_ok());
    }

    #[test]
    fn duplicate_share_numbers_fail() {
        let out = output(2, 3, vec![keeper(1), keeper(2), keeper(2)]);
        assert!(matches!(
            out.validate(),
            Err(OutputError::DuplicateShareNumber { x: 2 })
        ));
    }

    #[test]
    fn keeper_count_mismatch_fails() {
        let out = output(2, 3, vec![keeper(1), keeper(2)]);
        assert!(matches!(
            out.validate(),
            Err(OutputError::KeeperCountMismatch {
                declared: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn out_of_range_parameters_fail() {
        let out = output(1, 3, vec![keeper(1), keeper(2), keeper(3)]);
        assert!(matches!(out.validate(), Err(OutputError::BadParameters { .. })));

        let too_many = (1..=101).map(keeper).collect::<Vec<_>>();
        let out = output(2, 101, too_many);
        assert!(matches!(out.validate(), Err(OutputError::BadParameters { .. })));
    }

    #[test]
    fn json_uses_pascal_case_and_constants() {
        let out = output(2, 2, vec![keeper(1), keeper(2)]);
        let json = serde_json::to_string_pretty(&out).unwrap();
        assert!(json.contains("\"Version\""));
        assert!(json.contains("\"SessionId\""));
        assert!(json.contains("\"MasterSecretHash\""));
        assert!(json.contains("\"ShareNumber\""));
        assert!(json.contains("\"Shamir-GF256\""));
        assert!(json.contains("\"AES-256-GCM\""));
        assert!(json.contains("\"PBKDF2-SHA256\""));

        let parsed: ShamirSecretOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.keepers.len(), 2);
        assert_eq!(parsed.configuration.kdf_iterations, 100_000);
    }

    #[test]
    fn keeper_round_trips_to_sealed_share() {
        let record = keeper(1);
        let sealed = record.sealed_share();
        assert_eq!(sealed.encrypted_share, record.encrypted_share);
        assert_eq!(sealed.iv, record.iv);
    }
}
