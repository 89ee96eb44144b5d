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

//! The interactive terminal shell: prompts on stdout, answers from stdin.

use std::io::{self, Write};
use std::path::PathBuf;

use keyceremony_core::ceremony::events::{
    CeremonyEvent, InputError, InputKind, InputRequest, InputValue, ShellPort,
};
use keyceremony_core::sealed::SealedBytes;

pub struct TerminalShell {
    /// Overwrite passes applied to secrets captured from the operator.
    secure_delete_passes: u32,
}

impl TerminalShell {
    pub fn new(secure_delete_passes: u32) -> Self {
        Self {
            secure_delete_passes,
        }
    }

    fn read_line(&self, prompt: &str) -> Result<String, InputError> {
        print!("{}: ", prompt);
        io::stdout()
            .flush()
            .map_err(|err| InputError::Failed(err.to_string()))?;
        let mut line = String::new();
        let read = io::stdin()
            .read_line(&mut line)
            .map_err(|err| InputError::Failed(err.to_string()))?;
        if read == 0 {
            return Err(InputError::Cancelled);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl ShellPort for TerminalShell {
    fn notify(&mut self, event: CeremonyEvent) {
        match event {
            CeremonyEvent::Progress { message, percent, .. } => match percent {
                Some(percent) => println!("[{:>3}%] {}", percent, message),
                None => println!("      {}", message),
            },
            CeremonyEvent::ValidationResult {
                is_valid, message, ..
            } => {
                if !is_valid {
                    println!("  !! {}", message);
                }
            }
            CeremonyEvent::OperationCompleted {
                success, message, ..
            } => {
                if success {
                    println!("done: {}", message);
                } else {
                    println!("FAILED: {}", message);
                }
            }
        }
    }

    fn fulfil(&mut self, request: InputRequest) -> Result<InputValue, InputError> {
        match request.kind {
            InputKind::Text { .. } => Ok(InputValue::Text(self.read_line(&request.prompt)?)),
            InputKind::SecretText => {
                // Secrets travel the same stdin path; sealing happens
                // immediately so the only plaintext copy dies with the line
                // buffer.
                let line = self.read_line(&request.prompt)?;
                Ok(InputValue::Secret(SealedBytes::from_string(
                    line,
                    self.secure_delete_passes,
                )))
            }
            InputKind::Integer {
                min_value,
                max_value,
                ref error_message,
            } => loop {
                let line = self.read_line(&format!(
                    "{} [{}-{}]",
                    request.prompt, min_value, max_value
                ))?;
                match line.trim().parse::<i64>() {
                    Ok(value) => break Ok(InputValue::Integer(value)),
                    Err(_) => println!("  !! {}", error_message),
                }
            },
            InputKind::FilePath {
                ref expected_extension,
            } => {
                let line = self.read_line(&format!(
                    "{} (.{} file)",
                    request.prompt, expected_extension
                ))?;
                Ok(InputValue::FilePath(PathBuf::from(line)))
            }
            InputKind::YesNo => loop {
                let line = self.read_line(&format!("{} [y/n]", request.prompt))?;
                match line.trim().to_ascii_lowercase().as_str() {
                    "y" | "yes" => break Ok(InputValue::YesNo(true)),
                    "n" | "no" => break Ok(InputValue::YesNo(false)),
                    _ => println!("  !! please answer y or n"),
                }
            },
        }
    }
}
