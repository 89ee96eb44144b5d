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

//! The create-shares state machine:
//!
//! ```text
//! INIT -> ADMIN_BIND -> ORG_INFO -> PARAMS -> SECRET_ACQUIRE -> SPLIT
//!   -> COLLECT_KEEPERS -> [CONFIRM -> SELFTEST] -> EMIT -> DONE
//! ```
//!
//! Any failure -- including a failed self-test -- abandons the ceremony
//! before EMIT, so no shares file ever exists for a set of envelopes that
//! did not prove reconstructable.

use std::fs;

use chrono::Utc;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    envelope,
    journal::{event_types, ShareCreationRecord},
    output::{
        OrganizationInfo, SecretKeeperRecord, ShamirSecretOutput, ShareConfiguration,
        MAX_TOTAL_SHARES, MIN_THRESHOLD, OUTPUT_VERSION,
    },
    sealed::SealedBytes,
    shamir::{self, Dealer, Share},
    validate,
};

use super::{
    events::{OperationType, ShellPort, TextRule},
    file_stamp, hash_b64, CeremonyEngine, CeremonyError, CeremonyResult, SELFTEST_ATTEMPTS,
};

const RANDOM_SECRET_LEN: usize = 32;

impl<S: ShellPort> CeremonyEngine<S> {
    /// Run a full create-shares ceremony.
    pub fn create_shares(&mut self) -> CeremonyResult {
        if self.finalized {
            return CeremonyResult::failed("session is already finalized");
        }
        match self.run_create() {
            Ok(result) => {
                self.completed(OperationType::CreateShares, true, &result.message);
                result
            }
            Err(err) => {
                let message = err.to_string();
                self.record(event_types::CREATE_ABANDONED, &message);
                self.completed(OperationType::CreateShares, false, &message);
                CeremonyResult::failed(message)
            }
        }
    }

    fn run_create(&mut self) -> Result<CeremonyResult, CeremonyError> {
        self.bind_admin_key()?;

        let organization = self.collect_org_info()?;
        self.journal.organization = Some(organization.clone());
        let (threshold, total) = self.collect_parameters()?;
        let secret = self.acquire_secret()?;
        let master_secret_hash = hash_b64(secret.expose());

        self.progress(
            event_types::SHARES_SPLIT,
            format!("splitting secret into {} shares (threshold {})", total, threshold),
            Some(40),
        );
        let dealer = Dealer::new(secret.expose(), threshold, &mut OsRng)?;
        let shares = dealer.deal(total)?;
        self.record(
            event_types::SHARES_SPLIT,
            &format!("secret split into {} shares at threshold {}", total, threshold),
        );

        let keepers = self.collect_keepers(shares)?;

        if self.config.security.confirmation_required {
            self.run_selftest(&keepers, threshold, &secret)?;
        }

        let output = ShamirSecretOutput {
            version: OUTPUT_VERSION.to_string(),
            session_id: self.session_id.clone(),
            created_at: Utc::now(),
            organization,
            configuration: ShareConfiguration::new(
                total,
                threshold,
                self.config.security.kdf_iterations,
            ),
            master_secret_hash: master_secret_hash.clone(),
            keepers,
        };
        output.validate()?;

        let path = self.emit_shares_file(&output)?;
        self.journal.shares_created.push(ShareCreationRecord {
            timestamp: Utc::now(),
            output_file: path.display().to_string(),
            total_shares: total,
            threshold_required: threshold,
            master_secret_hash,
            keeper_names: output.keepers.iter().map(|k| k.name.clone()).collect(),
        });
        self.record(
            event_types::SHARES_FILE_WRITTEN,
            &format!("shares file written to {}", path.display()),
        );
        self.progress(event_types::SHARES_FILE_WRITTEN, "ceremony complete", Some(100));

        // `secret` drops here and is wiped.
        let mut result = CeremonyResult::succeeded(format!(
            "created {} shares at threshold {}",
            total, threshold
        ));
        result.output_file = Some(path);
        result.shares_data = Some(output);
        Ok(result)
    }

    fn collect_org_info(&mut self) -> Result<OrganizationInfo, CeremonyError> {
        if let (Some(name), Some(phone)) = (
            self.config.organization.name.clone(),
            self.config.organization.contact_phone.clone(),
        ) {
            let reuse = self.ask_yes_no(format!("Use configured organization \"{}\"?", name))?;
            if reuse {
                self.record(
                    event_types::ORGANIZATION_SET,
                    &format!("organization \"{}\" (from configuration)", name),
                );
                return Ok(OrganizationInfo {
                    name,
                    contact_phone: phone,
                });
            }
        }

        let name = self.ask_text_validated(
            "Organization name",
            "organization name",
            TextRule::Name,
            validate::MAX_NAME_LEN,
            "name must be non-empty letters, spaces, hyphens or apostrophes (max 100)",
        )?;
        let contact_phone = self.ask_text_validated(
            "Organization contact phone",
            "organization phone",
            TextRule::Phone,
            validate::MAX_PHONE_LEN,
            "phone may contain digits, spaces, +, -, parentheses and needs 3 consecutive digits",
        )?;
        self.record(
            event_types::ORGANIZATION_SET,
            &format!("organization \"{}\"", name),
        );
        Ok(OrganizationInfo {
            name,
            contact_phone,
        })
    }

    /// Threshold is requested before total; the ordering is observable and
    /// part of the shell contract.
    fn collect_parameters(&mut self) -> Result<(u8, u8), CeremonyError> {
        let threshold = self.ask_integer(
            "Number of shares required to reconstruct (threshold)",
            "threshold",
            MIN_THRESHOLD as i64,
            MAX_TOTAL_SHARES as i64,
            "threshold must be between 2 and 100",
        )? as u8;
        let total = self.ask_integer(
            "Total number of shares to create",
            "total shares",
            threshold as i64,
            MAX_TOTAL_SHARES as i64,
            "total shares must be between the threshold and 100",
        )? as u8;
        self.record(
            event_types::PARAMETERS_SET,
            &format!("threshold {} of {} shares", threshold, total),
        );
        Ok((threshold, total))
    }

    fn acquire_secret(&mut self) -> Result<SealedBytes, CeremonyError> {
        let passes = self.config.security.secure_delete_passes;
        let generate = self.ask_yes_no("Generate a random 256-bit master secret?")?;
        if generate {
            self.record(event_types::SECRET_GENERATED, "random 32-byte secret generated");
            return Ok(SealedBytes::new_random(RANDOM_SECRET_LEN, passes));
        }

        let supplied = self.ask_secret("Master secret")?;
        if supplied.is_empty() {
            self.validation(
                false,
                "empty secret supplied; substituting a random 32-byte secret",
                "master secret",
            );
            self.record(
                event_types::SECRET_GENERATED,
                "empty input replaced with a random 32-byte secret",
            );
            return Ok(SealedBytes::new_random(RANDOM_SECRET_LEN, passes));
        }
        self.record(event_types::SECRET_PROVIDED, "operator-supplied secret accepted");
        Ok(supplied)
    }

    /// Pair every share with a keeper: configured default keepers first (in
    /// preferred order, each offered once), then manual entry for whatever
    /// remains. Share `i` in dealing order goes to keeper `i` in enrollment
    /// order.
    fn collect_keepers(
        &mut self,
        shares: Vec<Share>,
    ) -> Result<Vec<SecretKeeperRecord>, CeremonyError> {
        let total = shares.len();
        let mut shares = shares.into_iter();
        let mut keepers: Vec<SecretKeeperRecord> = Vec::with_capacity(total);

        let defaults = self
            .config
            .keepers_in_preferred_order()
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();

        for default in defaults {
            if keepers.len() == total {
                break;
            }
            let use_default = self.ask_yes_no(format!(
                "Enroll default keeper {} <{}>?",
                default.name, default.email
            ))?;
            if !use_default {
                continue;
            }
            let share = shares.next().expect("keepers never outnumber shares");
            let record = self.enroll_keeper(
                share,
                default.name.clone(),
                default.phone.clone(),
                default.email.clone(),
            )?;
            keepers.push(record);
        }

        while keepers.len() < total {
            let ordinal = keepers.len() + 1;
            self.progress(
                event_types::KEEPER_ENROLLED,
                format!("collecting keeper {} of {}", ordinal, total),
                None,
            );
            let name = self.ask_text_validated(
                &format!("Keeper {} name", ordinal),
                "keeper name",
                TextRule::Name,
                validate::MAX_NAME_LEN,
                "name must be non-empty letters, spaces, hyphens or apostrophes (max 100)",
            )?;
            let phone = self.ask_text_validated(
                &format!("Keeper {} phone", ordinal),
                "keeper phone",
                TextRule::Phone,
                validate::MAX_PHONE_LEN,
                "phone may contain digits, spaces, +, -, parentheses and needs 3 consecutive digits",
            )?;
            let email = self.ask_text_validated(
                &format!("Keeper {} email", ordinal),
                "keeper email",
                TextRule::Email,
                validate::MAX_EMAIL_LEN,
                "email must look like name@example.com (max 254)",
            )?;
            let share = shares.next().expect("keepers never outnumber shares");
            let record = self.enroll_keeper(share, name, phone, email)?;
            keepers.push(record);
        }

        Ok(keepers)
    }

    /// Ask for the keeper's password and wrap their share in the envelope.
    fn enroll_keeper(
        &mut self,
        share: Share,
        name: String,
        phone: String,
        email: String,
    ) -> Result<SecretKeeperRecord, CeremonyError> {
        let password = self.ask_keeper_password(&name)?;
        let sealed = envelope::encrypt_share(
            &share,
            &password,
            self.config.security.kdf_iterations,
            &mut OsRng,
        )?;
        let share_number = share.x();
        // Share and password drop here; both wipe their buffers.
        drop(share);
        drop(password);

        self.record(
            event_types::KEEPER_ENROLLED,
            &format!("keeper \"{}\" holds share {}", name, share_number),
        );
        Ok(SecretKeeperRecord {
            id: Uuid::new_v4().to_string(),
            share_number,
            name,
            phone,
            email,
            encrypted_share: sealed.encrypted_share,
            hmac: sealed.hmac,
            salt: sealed.salt,
            iv: sealed.iv,
            created_at: Utc::now(),
            session_id: self.session_id.clone(),
        })
    }

    /// The mandatory reconstruction proof: the first `threshold` keepers
    /// re-enter their passwords, their shares are decrypted and recombined,
    /// and the result must be byte-identical to the original secret. Any
    /// failure abandons the ceremony before a shares file exists.
    fn run_selftest(
        &mut self,
        keepers: &[SecretKeeperRecord],
        threshold: u8,
        secret: &SealedBytes,
    ) -> Result<(), CeremonyError> {
        self.record(
            event_types::SELFTEST_STARTED,
            &format!("reconstruction self-test over {} keepers", threshold),
        );

        let iterations = self.config.security.kdf_iterations;
        let mut collected: Vec<Share> = Vec::with_capacity(threshold as usize);

        for keeper in keepers.iter().take(threshold as usize) {
            let sealed = keeper.sealed_share();
            let mut decrypted = None;
            for attempt in 1..=SELFTEST_ATTEMPTS {
                let password =
                    self.ask_secret(format!("Self-test: password for {}", keeper.name))?;
                match envelope::decrypt_share(&sealed, &password, iterations) {
                    Ok(share) => {
                        self.validation(true, "share decrypted", "self-test");
                        decrypted = Some(share);
                        break;
                    }
                    Err(err) => {
                        self.validation(
                            false,
                            format!(
                                "decrypt failed for {} (attempt {} of {}): {}",
                                keeper.name, attempt, SELFTEST_ATTEMPTS, err
                            ),
                            "self-test",
                        );
                    }
                }
            }
            match decrypted {
                Some(share) => collected.push(share),
                None => {
                    self.record(
                        event_types::SELFTEST_FAILED,
                        &format!(
                            "keeper \"{}\" could not decrypt their share in {} attempts",
                            keeper.name, SELFTEST_ATTEMPTS
                        ),
                    );
                    return Err(CeremonyError::Integrity(format!(
                        "self-test failed: share for {} could not be decrypted",
                        keeper.name
                    )));
                }
            }
        }

        let reconstructed = shamir::combine(&collected, threshold as usize)?;
        let matches = bool::from(reconstructed.as_slice().ct_eq(secret.expose()));
        // Wipe the self-test copy regardless of outcome.
        drop(SealedBytes::new(
            reconstructed,
            self.config.security.secure_delete_passes,
        ));
        if !matches {
            self.record(
                event_types::SELFTEST_FAILED,
                "reconstructed secret does not match the original",
            );
            return Err(CeremonyError::Integrity(
                "self-test failed: reconstructed secret does not match".to_string(),
            ));
        }

        self.record(event_types::SELFTEST_PASSED, "reconstruction self-test passed");
        Ok(())
    }

    /// Write the shares file. A write failure here is fatal to the
    /// operation, unlike journal/audit writes.
    fn emit_shares_file(
        &mut self,
        output: &ShamirSecretOutput,
    ) -> Result<std::path::PathBuf, CeremonyError> {
        let path = self
            .session_folder
            .join(format!("secret_shares_{}.json", file_stamp()));
        let json = serde_json::to_string_pretty(output)
            .map_err(|err| CeremonyError::CryptoInternal(err.to_string()))?;
        fs::write(&path, json)?;
        Ok(path)
    }
}
