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

//! The ceremony orchestrator.
//!
//! One [`CeremonyEngine`] value owns one session: a journal, an audit trail,
//! a session folder, and (once bound) the administrator session key. The
//! three public operations -- [`CeremonyEngine::create_shares`],
//! [`CeremonyEngine::reconstruct_secret`] and
//! [`CeremonyEngine::finalize_session`] -- catch every error at their
//! boundary, record it, emit `OperationCompleted`, and return a structured
//! [`CeremonyResult`]; they never panic across the port and never leave a
//! partial shares file behind.

pub mod events;

mod create;
mod reconstruct;

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    audit::AuditLog,
    config::CeremonyConfig,
    envelope,
    journal::{event_types, seal_journal, SessionJournal},
    output::ShamirSecretOutput,
    sealed::SealedBytes,
    shamir,
    validate,
};

use events::{
    CeremonyEvent, InputError, InputKind, InputRequest, InputValue, OperationType, ShellPort,
};

/// Fixed PBKDF2 salt for the administrator session key. This is a provenance
/// key, not a confidentiality key; the constant salt is what lets a third
/// party re-derive it from the admin password when verifying a sealed
/// session.
pub const ADMIN_KEY_SALT: &[u8] = b"ShamirCeremonyAdminSession";

/// Re-prompt budget for text, integer and file-path input.
const INPUT_ATTEMPTS: u32 = 3;

/// Per-keeper password budget during the self-test.
const SELFTEST_ATTEMPTS: u32 = 3;

/// Cumulative decrypt-failure budget during reconstruction.
const RECOVERY_FAILURE_BUDGET: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum CeremonyError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("malformed data: {0}")]
    BadFormat(String),

    #[error("too many failed decryption attempts ({0})")]
    TooManyAttempts(u32),

    #[error("cryptographic failure: {0}")]
    CryptoInternal(String),

    #[error(transparent)]
    Shamir(#[from] shamir::Error),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<envelope::Error> for CeremonyError {
    fn from(err: envelope::Error) -> Self {
        match err {
            envelope::Error::BadFormat(msg) => CeremonyError::BadFormat(msg),
            envelope::Error::Integrity => {
                CeremonyError::Integrity("envelope integrity check failed".to_string())
            }
            envelope::Error::Kdf(msg) | envelope::Error::Crypto(msg) => {
                CeremonyError::CryptoInternal(msg)
            }
        }
    }
}

impl From<InputError> for CeremonyError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::Cancelled => CeremonyError::Cancelled,
            InputError::Failed(msg) => CeremonyError::Validation(msg),
        }
    }
}

impl From<crate::journal::SealError> for CeremonyError {
    fn from(err: crate::journal::SealError) -> Self {
        CeremonyError::CryptoInternal(err.to_string())
    }
}

impl From<crate::output::OutputError> for CeremonyError {
    fn from(err: crate::output::OutputError) -> Self {
        CeremonyError::BadFormat(err.to_string())
    }
}

/// The structured outcome of one public operation.
#[derive(Debug)]
pub struct CeremonyResult {
    pub success: bool,
    pub message: String,
    pub output_file: Option<PathBuf>,
    pub shares_data: Option<ShamirSecretOutput>,
    pub reconstructed_secret: Option<SealedBytes>,
}

impl CeremonyResult {
    fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            output_file: None,
            shares_data: None,
            reconstructed_secret: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            output_file: None,
            shares_data: None,
            reconstructed_secret: None,
        }
    }
}

/// Derive the 32-byte administrator session key from the admin password.
///
/// Exposed so that external verifiers of a sealed session file can re-derive
/// the key with nothing but the password and the published parameters.
pub fn derive_admin_key(password: &SealedBytes, iterations: u32, passes: u32) -> SealedBytes {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(password.expose(), ADMIN_KEY_SALT, iterations, &mut key[..]);
    SealedBytes::new(key.to_vec(), passes)
}

pub struct CeremonyEngine<S: ShellPort> {
    config: CeremonyConfig,
    shell: S,
    session_id: String,
    session_folder: PathBuf,
    journal: SessionJournal,
    audit: AuditLog,
    admin_key: Option<SealedBytes>,
    next_request_id: u64,
    finalized: bool,
}

impl<S: ShellPort> CeremonyEngine<S> {
    /// Open a new ceremony session: validate the configuration, create the
    /// exclusive session folder, start the journal and audit trail.
    pub fn new(config: &CeremonyConfig, shell: S) -> Result<Self, CeremonyError> {
        config
            .validate()
            .map_err(|problems| CeremonyError::Validation(problems.join("; ")))?;

        let session_id = Uuid::new_v4().to_string();
        let session_folder = config
            .file_system
            .output_folder
            .join(format!("session_{}", session_id));
        fs::create_dir_all(&session_folder)?;

        let journal = SessionJournal::new(session_id.clone());
        let mut audit = AuditLog::new(
            config.security.audit_log_enabled,
            &session_folder,
            &session_id,
            &journal.user_name,
            &journal.machine_name,
            &file_stamp(),
        );
        audit.record(event_types::SESSION_START, "ceremony session opened");

        Ok(Self {
            config: config.clone(),
            shell,
            session_id,
            session_folder,
            journal,
            audit,
            admin_key: None,
            next_request_id: 0,
            finalized: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_folder(&self) -> &Path {
        &self.session_folder
    }

    pub fn journal(&self) -> &SessionJournal {
        &self.journal
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut S {
        &mut self.shell
    }

    /// Seal the journal and persist the session artifacts. Journal, audit
    /// detail and README write failures are logged and swallowed -- the
    /// ceremony outcome is preserved either way.
    pub fn finalize_session(&mut self) -> CeremonyResult {
        if self.finalized {
            return CeremonyResult::failed("session is already finalized");
        }
        match self.run_finalize() {
            Ok(result) => {
                self.completed(OperationType::FinalizeSession, true, &result.message);
                result
            }
            Err(err) => {
                let message = err.to_string();
                self.record(event_types::OPERATION_FAILED, &message);
                self.completed(OperationType::FinalizeSession, false, &message);
                CeremonyResult::failed(message)
            }
        }
    }

    fn run_finalize(&mut self) -> Result<CeremonyResult, CeremonyError> {
        self.bind_admin_key()?;
        self.journal.close();

        let admin_key = self
            .admin_key
            .take()
            .expect("admin key bound immediately above");
        let sealed = seal_journal(&self.journal, &admin_key)?;
        // Dropping the key wipes it.
        drop(admin_key);

        let stamp = file_stamp();
        let session_path = self
            .session_folder
            .join(format!("session_complete_{}.json", stamp));
        let mut message = "session sealed".to_string();

        match serde_json::to_string_pretty(&sealed) {
            Ok(json) => {
                if let Err(err) = fs::write(&session_path, json) {
                    warn!(path = %session_path.display(), error = %err,
                        "session file could not be written");
                    message = format!("session sealed, but writing the session file failed: {}", err);
                }
            }
            Err(err) => {
                return Err(CeremonyError::CryptoInternal(format!(
                    "sealed session could not be serialized: {}",
                    err
                )))
            }
        }

        if let Err(err) = self.audit.write_detail(&self.session_folder, &stamp) {
            warn!(error = %err, "audit detail file could not be written");
        }
        if let Err(err) = self.write_readme(&stamp) {
            warn!(error = %err, "session README could not be written");
        }

        self.finalized = true;
        let mut result = CeremonyResult::succeeded(message);
        result.output_file = Some(session_path);
        Ok(result)
    }

    fn write_readme(&self, stamp: &str) -> std::io::Result<()> {
        let summary = self.journal.summary.clone().unwrap_or_default();
        let body = format!(
            "keyceremony session {id}\n\
             =========================\n\n\
             Started:  {start}\n\
             Machine:  {machine}\n\
             Operator: {user}\n\n\
             Contents of this folder:\n\
             - secret_shares_<ts>.json   encrypted shares, one per keeper ({sets} set(s))\n\
             - session_complete_{stamp}.json   sealed session journal (hash + admin HMAC)\n\
             - audit_<ts>.log            line-delimited audit trail\n\
             - audit_detail_{stamp}.json structured audit entries\n\n\
             Shares created: {shares}, recovery attempts: {recoveries}\n\n\
             To verify the session seal, recompute SHA-256 over the canonical\n\
             JSON of SessionData and re-derive the admin session key with\n\
             PBKDF2-HMAC-SHA256 over the admin password and the salt\n\
             \"ShamirCeremonyAdminSession\".\n",
            id = self.session_id,
            start = self.journal.start_time.to_rfc3339(),
            machine = self.journal.machine_name,
            user = self.journal.user_name,
            sets = summary.total_share_sets,
            stamp = stamp,
            shares = summary.total_shares_created,
            recoveries = summary.total_recovery_attempts,
        );
        fs::write(self.session_folder.join("README.txt"), body)
    }

    // ---- shared state-machine plumbing ----

    /// Record an event in both the journal and the audit trail.
    fn record(&mut self, event_type: &str, message: &str) {
        self.journal.record(event_type, message);
        self.audit.record(event_type, message);
    }

    fn notify(&mut self, event: CeremonyEvent) {
        self.shell.notify(event);
    }

    fn progress(&mut self, event_type: &str, message: impl Into<String>, percent: Option<u8>) {
        let message = message.into();
        self.notify(CeremonyEvent::Progress {
            message,
            percent,
            event_type: event_type.to_string(),
        });
    }

    fn validation(&mut self, is_valid: bool, message: impl Into<String>, target: &str) {
        self.notify(CeremonyEvent::ValidationResult {
            is_valid,
            message: message.into(),
            target: target.to_string(),
        });
    }

    fn completed(&mut self, operation: OperationType, success: bool, message: &str) {
        self.notify(CeremonyEvent::OperationCompleted {
            success,
            message: message.to_string(),
            operation,
        });
    }

    fn ask(&mut self, prompt: impl Into<String>, kind: InputKind) -> Result<InputValue, CeremonyError> {
        self.next_request_id += 1;
        let request = InputRequest {
            request_id: self.next_request_id,
            prompt: prompt.into(),
            kind,
        };
        Ok(self.shell.fulfil(request)?)
    }

    fn ask_yes_no(&mut self, prompt: impl Into<String>) -> Result<bool, CeremonyError> {
        match self.ask(prompt, InputKind::YesNo)? {
            InputValue::YesNo(answer) => Ok(answer),
            other => Err(shell_kind_mismatch("YesNo", &other)),
        }
    }

    fn ask_secret(&mut self, prompt: impl Into<String>) -> Result<SealedBytes, CeremonyError> {
        match self.ask(prompt, InputKind::SecretText)? {
            InputValue::Secret(secret) => Ok(secret),
            other => Err(shell_kind_mismatch("SecretText", &other)),
        }
    }

    /// Prompt for text governed by a validation rule, re-prompting up to the
    /// attempt budget before giving up on the operation.
    fn ask_text_validated(
        &mut self,
        prompt: &str,
        target: &str,
        rule: events::TextRule,
        max_length: usize,
        error_message: &str,
    ) -> Result<String, CeremonyError> {
        for _ in 0..INPUT_ATTEMPTS {
            let value = match self.ask(
                prompt,
                InputKind::Text {
                    rule,
                    max_length,
                    error_message: error_message.to_string(),
                },
            )? {
                InputValue::Text(text) => text,
                other => return Err(shell_kind_mismatch("Text", &other)),
            };
            let trimmed = value.trim().to_string();
            if trimmed.len() <= max_length && rule.check(&trimmed) {
                self.validation(true, format!("{} accepted", target), target);
                return Ok(trimmed);
            }
            self.validation(false, error_message.to_string(), target);
        }
        Err(CeremonyError::Validation(format!(
            "no valid {} after {} attempts",
            target, INPUT_ATTEMPTS
        )))
    }

    fn ask_integer(
        &mut self,
        prompt: &str,
        target: &str,
        min_value: i64,
        max_value: i64,
        error_message: &str,
    ) -> Result<i64, CeremonyError> {
        for _ in 0..INPUT_ATTEMPTS {
            let value = match self.ask(
                prompt,
                InputKind::Integer {
                    min_value,
                    max_value,
                    error_message: error_message.to_string(),
                },
            )? {
                InputValue::Integer(n) => n,
                other => return Err(shell_kind_mismatch("Integer", &other)),
            };
            if (min_value..=max_value).contains(&value) {
                return Ok(value);
            }
            self.validation(false, error_message.to_string(), target);
        }
        Err(CeremonyError::Validation(format!(
            "no valid {} after {} attempts",
            target, INPUT_ATTEMPTS
        )))
    }

    fn ask_file_path(&mut self, prompt: &str, extension: &str) -> Result<PathBuf, CeremonyError> {
        for _ in 0..INPUT_ATTEMPTS {
            let path = match self.ask(
                prompt,
                InputKind::FilePath {
                    expected_extension: extension.to_string(),
                },
            )? {
                InputValue::FilePath(path) => path,
                other => return Err(shell_kind_mismatch("FilePath", &other)),
            };
            let extension_ok = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            if path.is_file() && extension_ok {
                return Ok(path);
            }
            self.validation(
                false,
                format!(
                    "{} does not exist or is not a .{} file",
                    path.display(),
                    extension
                ),
                "shares file path",
            );
        }
        Err(CeremonyError::Validation(format!(
            "no usable shares file path after {} attempts",
            INPUT_ATTEMPTS
        )))
    }

    /// Request the administrator session password and derive the session
    /// HMAC key from it. Idempotent: later operations in the same session
    /// reuse the bound key.
    fn bind_admin_key(&mut self) -> Result<(), CeremonyError> {
        if self.admin_key.is_some() {
            return Ok(());
        }
        let password = self.ask_secret("Administrator session password")?;
        let key = derive_admin_key(
            &password,
            self.config.security.kdf_iterations,
            self.config.security.secure_delete_passes,
        );
        // The password wipes here; only the derived key survives.
        drop(password);
        self.admin_key = Some(key);
        self.record(
            event_types::ADMIN_KEY_BOUND,
            "administrator session key derived",
        );
        Ok(())
    }

    /// Prompt for a keeper password until it satisfies the complexity
    /// policy.
    fn ask_keeper_password(&mut self, keeper_name: &str) -> Result<SealedBytes, CeremonyError> {
        for _ in 0..INPUT_ATTEMPTS {
            let password = self.ask_secret(format!("Share password for {}", keeper_name))?;
            match validate::check_password(&password, &self.config.security) {
                Ok(()) => {
                    self.validation(true, "password accepted", "keeper password");
                    return Ok(password);
                }
                Err(problem) => self.validation(false, problem, "keeper password"),
            }
        }
        Err(CeremonyError::Validation(format!(
            "no policy-compliant password for {} after {} attempts",
            keeper_name, INPUT_ATTEMPTS
        )))
    }
}

fn shell_kind_mismatch(expected: &str, got: &InputValue) -> CeremonyError {
    let got = match got {
        InputValue::Text(_) => "Text",
        InputValue::Secret(_) => "SecretText",
        InputValue::Integer(_) => "Integer",
        InputValue::FilePath(_) => "FilePath",
        InputValue::YesNo(_) => "YesNo",
    };
    CeremonyError::Validation(format!(
        "shell answered a {} request with {}",
        expected, got
    ))
}

/// Compact UTC timestamp used in emitted file names.
fn file_stamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// base64(SHA-256(bytes)) -- the form every stored hash uses.
fn hash_b64(bytes: &[u8]) -> String {
    BASE64.encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod test;
