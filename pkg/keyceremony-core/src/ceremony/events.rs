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

//! The engine's event surface.
//!
//! The engine never touches a terminal: it emits [`CeremonyEvent`]s and asks
//! for operator input through [`ShellPort::fulfil`]. Whatever drives the
//! engine -- a console shell, a test harness, a web bridge -- implements
//! [`ShellPort`]. Each ceremony operation is single-threaded and cooperative,
//! so the port is a plain synchronous trait: `fulfil` blocks the operation
//! until the shell answers or fails the request, and events arrive in strict
//! issue order.

use std::path::PathBuf;

use crate::sealed::SealedBytes;

/// Which public engine operation an event belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperationType {
    CreateShares,
    ReconstructSecret,
    FinalizeSession,
}

/// Fire-and-forget notifications. The engine never waits on these.
#[derive(Clone, Debug)]
pub enum CeremonyEvent {
    /// Advisory progress; `percent` is monotone within one operation when
    /// present.
    Progress {
        message: String,
        percent: Option<u8>,
        event_type: String,
    },
    /// Outcome of validating some operator-supplied value.
    ValidationResult {
        is_valid: bool,
        message: String,
        target: String,
    },
    /// Emitted exactly once per public operation call.
    OperationCompleted {
        success: bool,
        message: String,
        operation: OperationType,
    },
}

/// Which contact-validation contract a text request is checked against.
/// The engine re-validates every answer; shells may use the rule to
/// pre-validate locally.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextRule {
    /// Any non-empty text within the length limit.
    Any,
    Name,
    Phone,
    Email,
}

impl TextRule {
    pub fn check(self, value: &str) -> bool {
        match self {
            TextRule::Any => !value.trim().is_empty(),
            TextRule::Name => crate::validate::valid_name(value),
            TextRule::Phone => crate::validate::valid_phone(value),
            TextRule::Email => crate::validate::valid_email(value),
        }
    }
}

/// What kind of answer an input request expects, plus its constraints.
#[derive(Clone, Debug)]
pub enum InputKind {
    Text {
        rule: TextRule,
        max_length: usize,
        error_message: String,
    },
    /// Sensitive text; shells should suppress echo and must hand the bytes
    /// back sealed.
    SecretText,
    Integer {
        min_value: i64,
        max_value: i64,
        error_message: String,
    },
    FilePath {
        expected_extension: String,
    },
    YesNo,
}

/// A single prompt for the shell to satisfy. Request ids are unique within a
/// session and strictly increasing.
#[derive(Clone, Debug)]
pub struct InputRequest {
    pub request_id: u64,
    pub prompt: String,
    pub kind: InputKind,
}

/// A typed answer to an [`InputRequest`]. The variant must match the
/// request's [`InputKind`]; anything else is treated as a shell bug.
#[derive(Debug)]
pub enum InputValue {
    Text(String),
    Secret(SealedBytes),
    Integer(i64),
    FilePath(PathBuf),
    YesNo(bool),
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The operator backed out; the engine unwinds the operation cleanly.
    #[error("input cancelled by operator")]
    Cancelled,

    /// The shell could not satisfy the request at all.
    #[error("input request failed: {0}")]
    Failed(String),
}

/// The driving side of a ceremony.
pub trait ShellPort {
    /// Deliver a fire-and-forget event.
    fn notify(&mut self, event: CeremonyEvent);

    /// Answer an input request. Blocking here suspends the ceremony;
    /// timeouts, retries at the UI level, and cancellation are the shell's
    /// concern.
    fn fulfil(&mut self, request: InputRequest) -> Result<InputValue, InputError>;
}
