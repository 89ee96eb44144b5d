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

//! Full-ceremony tests driven by a scripted in-memory shell.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::*;
use crate::journal::{verify_session_output, SessionOutput};
use crate::output::ShamirSecretOutput;

/// A shell that replays a prepared answer script and records everything the
/// engine emitted.
struct ScriptedShell {
    answers: VecDeque<InputValue>,
    events: Vec<CeremonyEvent>,
    prompts: Vec<String>,
}

impl ScriptedShell {
    fn new(answers: Vec<InputValue>) -> Self {
        Self {
            answers: answers.into(),
            events: Vec::new(),
            prompts: Vec::new(),
        }
    }

    fn completions(&self) -> Vec<(bool, OperationType)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                CeremonyEvent::OperationCompleted {
                    success, operation, ..
                } => Some((*success, *operation)),
                _ => None,
            })
            .collect()
    }

    fn validation_failures(&self, target: &str) -> usize {
        self.events
            .iter()
            .filter(|event| {
                matches!(event, CeremonyEvent::ValidationResult { is_valid: false, target: t, .. }
                    if t == target)
            })
            .count()
    }
}

impl ShellPort for ScriptedShell {
    fn notify(&mut self, event: CeremonyEvent) {
        self.events.push(event);
    }

    fn fulfil(&mut self, request: InputRequest) -> Result<InputValue, InputError> {
        self.prompts.push(request.prompt);
        self.answers
            .pop_front()
            .ok_or_else(|| InputError::Failed("answer script exhausted".to_string()))
    }
}

fn text(value: &str) -> InputValue {
    InputValue::Text(value.to_string())
}

fn secret(value: &str) -> InputValue {
    InputValue::Secret(SealedBytes::from_string(value.to_string(), 1))
}

fn integer(value: i64) -> InputValue {
    InputValue::Integer(value)
}

fn yes() -> InputValue {
    InputValue::YesNo(true)
}

fn no() -> InputValue {
    InputValue::YesNo(false)
}

fn test_config(dir: &Path, confirmation: bool) -> CeremonyConfig {
    let mut config = CeremonyConfig::default();
    config.security.kdf_iterations = envelope::MIN_KDF_ITERATIONS;
    config.security.secure_delete_passes = 1;
    config.security.min_password_length = 8;
    config.security.require_uppercase = false;
    config.security.require_digit = false;
    config.security.require_special_character = false;
    config.security.confirmation_required = confirmation;
    config.organization.name = Some("Example Holdings".to_string());
    config.organization.contact_phone = Some("+1 555 0100".to_string());
    config.file_system.output_folder = dir.to_path_buf();
    config
}

/// Answers shared by every create ceremony: admin bind, org reuse,
/// parameters, operator-supplied secret.
fn create_preamble(threshold: i64, total: i64, secret_text: &str) -> Vec<InputValue> {
    vec![
        secret("admin-session-pw"),
        yes(),
        integer(threshold),
        integer(total),
        no(),
        secret(secret_text),
    ]
}

fn manual_keeper(ordinal: usize, password: &str) -> Vec<InputValue> {
    vec![
        text(&format!("Keeper Number-{}", "One Two Three Four Five".split(' ').nth(ordinal - 1).unwrap())),
        text("555 0101"),
        text(&format!("keeper{}@example.com", ordinal)),
        secret(password),
    ]
}

fn shares_file_in(folder: &Path) -> Option<PathBuf> {
    std::fs::read_dir(folder).ok()?.find_map(|entry| {
        let path = entry.ok()?.path();
        let name = path.file_name()?.to_str()?.to_string();
        name.starts_with("secret_shares_").then_some(path)
    })
}

fn parse_shares_file(path: &Path) -> ShamirSecretOutput {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn create_with_selftest_emits_valid_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(2, 2, "the master secret");
    answers.extend(manual_keeper(1, "password123"));
    answers.extend(manual_keeper(2, "password456"));
    // Self-test re-entry for the first `threshold` keepers.
    answers.push(secret("password123"));
    answers.push(secret("password456"));

    let config = test_config(dir.path(), true);
    let mut engine = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = engine.create_shares();

    assert!(result.success, "{}", result.message);
    let path = result.output_file.expect("shares file path");
    assert!(path.is_file());

    let output = parse_shares_file(&path);
    output.validate().unwrap();
    assert_eq!(output.configuration.threshold_required, 2);
    assert_eq!(output.configuration.total_shares, 2);
    assert_eq!(output.configuration.kdf_iterations, envelope::MIN_KDF_ITERATIONS);
    assert_eq!(output.master_secret_hash, hash_b64(b"the master secret"));
    assert_eq!(
        output.keepers.iter().map(|k| k.share_number).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(output.session_id, engine.session_id());

    assert_eq!(
        engine.shell().completions(),
        vec![(true, OperationType::CreateShares)]
    );
    assert!(engine
        .journal()
        .events
        .iter()
        .any(|e| e.event_type == event_types::SELFTEST_PASSED));
}

#[test]
fn threshold_is_requested_before_total() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(2, 2, "ordering");
    answers.extend(manual_keeper(1, "password123"));
    answers.extend(manual_keeper(2, "password456"));

    let config = test_config(dir.path(), false);
    let mut engine = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    assert!(engine.create_shares().success);

    let prompts = &engine.shell().prompts;
    let threshold_at = prompts.iter().position(|p| p.contains("threshold")).unwrap();
    let total_at = prompts.iter().position(|p| p.contains("Total number")).unwrap();
    assert!(threshold_at < total_at);
}

#[test]
fn failed_selftest_abandons_without_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(2, 2, "abandoned secret");
    answers.extend(manual_keeper(1, "password123"));
    answers.extend(manual_keeper(2, "password456"));
    // Three wrong self-test attempts for keeper one.
    answers.push(secret("wrong"));
    answers.push(secret("wrong"));
    answers.push(secret("wrong"));

    let config = test_config(dir.path(), true);
    let mut engine = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = engine.create_shares();

    assert!(!result.success);
    assert!(result.output_file.is_none());
    assert!(shares_file_in(engine.session_folder()).is_none());
    assert!(engine
        .journal()
        .events
        .iter()
        .any(|e| e.event_type == event_types::SELFTEST_FAILED));
    assert_eq!(
        engine.shell().completions(),
        vec![(false, OperationType::CreateShares)]
    );
}

#[test]
fn empty_secret_is_replaced_with_random() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = vec![
        secret("admin-session-pw"),
        yes(),
        integer(2),
        integer(2),
        no(),
        secret(""),
    ];
    answers.extend(manual_keeper(1, "password123"));
    answers.extend(manual_keeper(2, "password456"));

    let config = test_config(dir.path(), false);
    let mut engine = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = engine.create_shares();

    assert!(result.success, "{}", result.message);
    assert_eq!(engine.shell().validation_failures("master secret"), 1);
    // The hash cannot be of the empty string.
    let output = result.shares_data.unwrap();
    assert_ne!(output.master_secret_hash, hash_b64(b""));
}

#[test]
fn reconstruct_roundtrip_from_emitted_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(2, 3, "roundtrip secret");
    answers.extend(manual_keeper(1, "password-one"));
    answers.extend(manual_keeper(2, "password-two"));
    answers.extend(manual_keeper(3, "password-three"));

    let config = test_config(dir.path(), false);
    let mut creator = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let created = creator.create_shares();
    assert!(created.success, "{}", created.message);
    let shares_path = created.output_file.unwrap();

    // Recover with keepers 1 and 3.
    let answers = vec![
        secret("admin-session-pw"),
        integer(1),
        secret("password-one"),
        integer(3),
        secret("password-three"),
    ];
    let mut recoverer = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = recoverer.reconstruct_secret(Some(&shares_path));

    assert!(result.success, "{}", result.message);
    let recovered = result.reconstructed_secret.unwrap();
    assert_eq!(recovered.expose(), b"roundtrip secret");

    let record = &recoverer.journal().shares_recovered[0];
    assert!(record.success);
    assert_eq!(record.shares_used, 2);
}

#[test]
fn reused_keeper_index_is_reprompted_without_penalty() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(2, 2, "reuse guard");
    answers.extend(manual_keeper(1, "password123"));
    answers.extend(manual_keeper(2, "password456"));

    let config = test_config(dir.path(), false);
    let mut creator = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let shares_path = creator.create_shares().output_file.unwrap();

    let answers = vec![
        secret("admin-session-pw"),
        integer(1),
        secret("password123"),
        // Keeper 1 again: rejected and re-prompted, not counted as failure.
        integer(1),
        integer(2),
        secret("password456"),
    ];
    let mut recoverer = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = recoverer.reconstruct_secret(Some(&shares_path));

    assert!(result.success, "{}", result.message);
    assert_eq!(recoverer.shell().validation_failures("keeper selection"), 1);
    assert_eq!(
        recoverer
            .journal()
            .events
            .iter()
            .filter(|e| e.event_type == event_types::RECOVERY_DECRYPT_FAILED)
            .count(),
        0
    );
}

#[test]
fn ten_decrypt_failures_exhaust_the_budget() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(3, 5, "budget secret");
    for (i, pw) in ["pw-one", "pw-two", "pw-three", "pw-four", "pw-five"]
        .iter()
        .enumerate()
    {
        answers.extend(manual_keeper(i + 1, pw));
    }

    let config = test_config(dir.path(), false);
    let mut creator = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let shares_path = creator.create_shares().output_file.unwrap();

    // Two good shares, then ten wrong passwords for keeper three.
    let mut answers = vec![
        secret("admin-session-pw"),
        integer(1),
        secret("pw-one"),
        integer(2),
        secret("pw-two"),
    ];
    for _ in 0..10 {
        answers.push(integer(3));
        answers.push(secret("not-the-password"));
    }

    let mut recoverer = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = recoverer.reconstruct_secret(Some(&shares_path));

    assert!(!result.success);
    assert!(result.message.contains("10"));
    assert_eq!(
        recoverer
            .journal()
            .events
            .iter()
            .filter(|e| e.event_type == event_types::RECOVERY_DECRYPT_FAILED)
            .count(),
        10
    );
    let record = &recoverer.journal().shares_recovered[0];
    assert!(!record.success);
    assert!(record.failure_reason.is_some());
}

#[test]
fn zero_choice_cancels_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(2, 2, "cancel me");
    answers.extend(manual_keeper(1, "password123"));
    answers.extend(manual_keeper(2, "password456"));

    let config = test_config(dir.path(), false);
    let mut creator = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let shares_path = creator.create_shares().output_file.unwrap();

    let answers = vec![secret("admin-session-pw"), integer(0)];
    let mut recoverer = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = recoverer.reconstruct_secret(Some(&shares_path));

    assert!(!result.success);
    assert!(result.message.contains("cancelled"));
    assert_eq!(
        recoverer.shell().completions(),
        vec![(false, OperationType::ReconstructSecret)]
    );
}

#[test]
fn malformed_shares_file_fails_with_bad_format() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.json");
    std::fs::write(&bogus, "{ not json").unwrap();

    let config = test_config(dir.path(), false);
    let answers = vec![secret("admin-session-pw")];
    let mut engine = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = engine.reconstruct_secret(Some(&bogus));

    assert!(!result.success);
    assert!(result.message.contains("malformed"));
}

#[test]
fn finalize_seals_a_verifiable_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(2, 2, "sealed secret");
    answers.extend(manual_keeper(1, "password123"));
    answers.extend(manual_keeper(2, "password456"));
    // One recovery in the same session (admin key is already bound).
    answers.push(integer(1));
    answers.push(secret("password123"));
    answers.push(integer(2));
    answers.push(secret("password456"));

    let config = test_config(dir.path(), false);
    let mut engine = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let created = engine.create_shares();
    assert!(created.success, "{}", created.message);
    let shares_path = created.output_file.unwrap();
    let recovered = engine.reconstruct_secret(Some(&shares_path));
    assert!(recovered.success, "{}", recovered.message);

    let finalized = engine.finalize_session();
    assert!(finalized.success, "{}", finalized.message);
    let session_path = finalized.output_file.unwrap();
    assert!(session_path.is_file());

    let sealed: SessionOutput =
        serde_json::from_str(&std::fs::read_to_string(&session_path).unwrap()).unwrap();
    assert_eq!(sealed.session_data.session_id, engine.session_id());
    let summary = sealed.session_data.summary.as_ref().unwrap();
    assert_eq!(summary.total_share_sets, 1);
    assert_eq!(summary.successful_recoveries, 1);
    assert_eq!(summary.failed_recoveries, 0);

    // A third party re-derives the admin key from the known password and the
    // fixed salt, then verifies hash and HMAC.
    let admin_key = derive_admin_key(
        &SealedBytes::from_string("admin-session-pw".to_string(), 1),
        config.security.kdf_iterations,
        1,
    );
    assert!(verify_session_output(&sealed, &admin_key));

    let mut tampered = sealed.clone();
    tampered.session_data.machine_name.push('!');
    assert!(!verify_session_output(&tampered, &admin_key));

    // The session folder carries the full paper trail.
    assert!(engine.session_folder().join("README.txt").is_file());
    let has_detail = std::fs::read_dir(engine.session_folder())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().starts_with("audit_detail_"));
    assert!(has_detail);
}

#[test]
fn finalize_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), false);
    let answers = vec![secret("admin-session-pw")];
    let mut engine = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();

    assert!(engine.finalize_session().success);
    let second = engine.finalize_session();
    assert!(!second.success);
    assert!(second.message.contains("already finalized"));
}

#[test]
fn invalid_contact_entries_exhaust_the_attempt_budget() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(2, 2, "attempt budget");
    // Three invalid keeper names in a row abort the operation.
    answers.push(text("123"));
    answers.push(text(""));
    answers.push(text("!!!"));

    let config = test_config(dir.path(), false);
    let mut engine = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = engine.create_shares();

    assert!(!result.success);
    assert!(shares_file_in(engine.session_folder()).is_none());
    assert_eq!(engine.shell().validation_failures("keeper name"), 3);
}

#[test]
fn default_keepers_are_offered_in_preferred_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), false);
    config.default_keepers = vec![
        crate::config::DefaultKeeper {
            name: "Second Keeper".to_string(),
            phone: "555 0202".to_string(),
            email: "second@example.com".to_string(),
            preferred_order: 2,
            ..Default::default()
        },
        crate::config::DefaultKeeper {
            name: "First Keeper".to_string(),
            phone: "555 0201".to_string(),
            email: "first@example.com".to_string(),
            preferred_order: 1,
            ..Default::default()
        },
    ];

    let mut answers = create_preamble(2, 2, "default keepers");
    // Accept the first-preferred, decline the second-preferred, then one
    // manual keeper fills the remaining slot.
    answers.push(yes());
    answers.push(secret("password123"));
    answers.push(no());
    answers.extend(manual_keeper(1, "password456"));

    let mut engine = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let result = engine.create_shares();
    assert!(result.success, "{}", result.message);

    let output = result.shares_data.unwrap();
    assert_eq!(output.keepers[0].name, "First Keeper");
    assert_eq!(output.keepers[0].share_number, 1);
    assert_eq!(output.keepers[1].share_number, 2);

    let prompts = &engine.shell().prompts;
    let first_at = prompts.iter().position(|p| p.contains("First Keeper")).unwrap();
    let second_at = prompts.iter().position(|p| p.contains("Second Keeper")).unwrap();
    assert!(first_at < second_at);
}

#[test]
fn reconstruction_uses_the_file_iteration_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut answers = create_preamble(2, 2, "iteration pinning");
    answers.extend(manual_keeper(1, "password123"));
    answers.extend(manual_keeper(2, "password456"));

    let config = test_config(dir.path(), false);
    let mut creator = CeremonyEngine::new(&config, ScriptedShell::new(answers)).unwrap();
    let shares_path = creator.create_shares().output_file.unwrap();

    // Recovery runs under a configuration with a different iteration count;
    // the file's recorded count must win or no envelope would ever open.
    let mut recovery_config = config.clone();
    recovery_config.security.kdf_iterations = envelope::MIN_KDF_ITERATIONS * 2;

    let answers = vec![
        secret("admin-session-pw"),
        integer(1),
        secret("password123"),
        integer(2),
        secret("password456"),
    ];
    let mut recoverer =
        CeremonyEngine::new(&recovery_config, ScriptedShell::new(answers)).unwrap();
    let result = recoverer.reconstruct_secret(Some(&shares_path));

    assert!(result.success, "{}", result.message);
    assert_eq!(
        result.reconstructed_secret.unwrap().expose(),
        b"iteration pinning"
    );
}
