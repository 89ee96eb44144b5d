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

//! The reconstruct state machine:
//!
//! ```text
//! INIT -> ADMIN_BIND -> LOAD_FILE -> GATHER_SHARES -> COMBINE -> VERIFY -> DONE
//! ```
//!
//! Shares are gathered keeper by keeper until the file's threshold is met or
//! ten cumulative decrypt failures exhaust the budget. Decryption always uses
//! the iteration count recorded in the file, never the live configuration.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::{
    envelope,
    journal::{event_types, RecoveryRecord},
    output::ShamirSecretOutput,
    sealed::SealedBytes,
    shamir::{self, Share},
};

use super::{
    events::{OperationType, ShellPort},
    hash_b64, CeremonyEngine, CeremonyError, CeremonyResult, RECOVERY_FAILURE_BUDGET,
};

impl<S: ShellPort> CeremonyEngine<S> {
    /// Recover a secret from a shares file. When `file` is `None` the path
    /// is requested through the shell.
    pub fn reconstruct_secret(&mut self, file: Option<&Path>) -> CeremonyResult {
        if self.finalized {
            return CeremonyResult::failed("session is already finalized");
        }
        let mut source_file = String::new();
        let mut shares_used = 0u8;
        match self.run_reconstruct(file, &mut source_file, &mut shares_used) {
            Ok(secret) => {
                self.journal.shares_recovered.push(RecoveryRecord {
                    timestamp: Utc::now(),
                    source_file,
                    success: true,
                    shares_used,
                    failure_reason: None,
                });
                let message = "secret reconstructed and verified".to_string();
                self.record(event_types::RECOVERY_SUCCEEDED, &message);
                self.completed(OperationType::ReconstructSecret, true, &message);
                let mut result = CeremonyResult::succeeded(message);
                result.reconstructed_secret = Some(secret);
                result
            }
            Err(err) => {
                let message = err.to_string();
                self.journal.shares_recovered.push(RecoveryRecord {
                    timestamp: Utc::now(),
                    source_file,
                    success: false,
                    shares_used,
                    failure_reason: Some(message.clone()),
                });
                self.record(event_types::RECOVERY_FAILED, &message);
                self.completed(OperationType::ReconstructSecret, false, &message);
                CeremonyResult::failed(message)
            }
        }
    }

    fn run_reconstruct(
        &mut self,
        file: Option<&Path>,
        source_file: &mut String,
        shares_used: &mut u8,
    ) -> Result<SealedBytes, CeremonyError> {
        self.bind_admin_key()?;

        let path = match file {
            Some(path) => path.to_path_buf(),
            None => self.ask_file_path("Path to the shares file", "json")?,
        };
        *source_file = path.display().to_string();

        let text = fs::read_to_string(&path)?;
        let output: ShamirSecretOutput = serde_json::from_str(&text)
            .map_err(|err| CeremonyError::BadFormat(format!("shares file: {}", err)))?;
        output.validate()?;

        self.record(
            event_types::RECOVERY_STARTED,
            &format!(
                "reconstruction from {} (threshold {} of {})",
                path.display(),
                output.configuration.threshold_required,
                output.configuration.total_shares
            ),
        );

        let threshold = output.configuration.threshold_required as usize;
        // The file's iteration count is authoritative for its own envelopes.
        let iterations = output.configuration.kdf_iterations;

        let mut used: HashSet<usize> = HashSet::new();
        let mut collected: Vec<Share> = Vec::with_capacity(threshold);
        let mut failures = 0u32;

        while collected.len() < threshold {
            self.present_remaining_keepers(&output, &used, collected.len(), threshold);

            let choice = self.ask_integer(
                "Keeper number to decrypt (0 cancels)",
                "keeper selection",
                0,
                output.keepers.len() as i64,
                "enter one of the listed keeper numbers, or 0 to cancel",
            )?;
            if choice == 0 {
                return Err(CeremonyError::Cancelled);
            }
            let index = (choice - 1) as usize;
            if used.contains(&index) {
                self.validation(
                    false,
                    format!("keeper {} has already provided their share", choice),
                    "keeper selection",
                );
                continue;
            }

            let keeper = &output.keepers[index];
            let keeper_name = keeper.name.clone();
            let sealed = keeper.sealed_share();
            let password = self.ask_secret(format!("Password for {}", keeper_name))?;

            match envelope::decrypt_share(&sealed, &password, iterations) {
                Ok(share) => {
                    used.insert(index);
                    self.validation(
                        true,
                        format!("share {} accepted from {}", share.x(), keeper_name),
                        "share decryption",
                    );
                    self.record(
                        event_types::RECOVERY_SHARE_ACCEPTED,
                        &format!("keeper \"{}\" supplied share {}", keeper_name, share.x()),
                    );
                    collected.push(share);
                }
                Err(err) => {
                    failures += 1;
                    self.validation(
                        false,
                        format!("decryption failed for {}: {}", keeper_name, err),
                        "share decryption",
                    );
                    self.record(
                        event_types::RECOVERY_DECRYPT_FAILED,
                        &format!(
                            "keeper \"{}\" decrypt failure {} of {}",
                            keeper_name, failures, RECOVERY_FAILURE_BUDGET
                        ),
                    );
                    if failures >= RECOVERY_FAILURE_BUDGET {
                        return Err(CeremonyError::TooManyAttempts(failures));
                    }
                }
            }
        }

        *shares_used = collected.len() as u8;
        let reconstructed = SealedBytes::new(
            shamir::combine(&collected, threshold)?,
            self.config.security.secure_delete_passes,
        );

        let digest = hash_b64(reconstructed.expose());
        let matches = bool::from(
            digest
                .as_bytes()
                .ct_eq(output.master_secret_hash.as_bytes()),
        );
        if !matches {
            // `reconstructed` wipes on drop.
            return Err(CeremonyError::Integrity(
                "reconstructed secret hash doesn't match the recorded master secret hash"
                    .to_string(),
            ));
        }

        Ok(reconstructed)
    }

    fn present_remaining_keepers(
        &mut self,
        output: &ShamirSecretOutput,
        used: &HashSet<usize>,
        collected: usize,
        threshold: usize,
    ) {
        let listing = output
            .keepers
            .iter()
            .enumerate()
            .filter(|(index, _)| !used.contains(index))
            .map(|(index, keeper)| format!("  {}. {} <{}>", index + 1, keeper.name, keeper.email))
            .collect::<Vec<_>>()
            .join("\n");
        self.progress(
            event_types::RECOVERY_STARTED,
            format!(
                "{} of {} shares collected; remaining keepers:\n{}",
                collected, threshold, listing
            ),
            Some(((collected * 100) / threshold.max(1)) as u8),
        );
    }
}
