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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::validate;

/// Ceremony configuration (loaded from keyceremony.toml).
///
/// A plain value handed to the engine constructor by reference -- there is no
/// process-wide configuration singleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CeremonyConfig {
    pub security: SecurityConfig,
    pub file_system: FileSystemConfig,
    pub organization: OrganizationConfig,
    /// Keepers offered by default during share collection, in
    /// `preferred_order` (ascending).
    pub default_keepers: Vec<DefaultKeeper>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Run the reconstruction self-test before any shares file is written.
    pub confirmation_required: bool,
    pub min_password_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special_character: bool,
    /// PBKDF2 iteration count for keeper and admin keys (minimum 10000).
    pub kdf_iterations: u32,
    /// Random-overwrite passes applied to secret buffers on release (1-10).
    pub secure_delete_passes: u32,
    pub audit_log_enabled: bool,
    /// Advisory retention horizon recorded for operators (1-3650 days).
    pub audit_log_retention_days: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            confirmation_required: true,
            min_password_length: 12,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special_character: true,
            kdf_iterations: 100_000,
            secure_delete_passes: 3,
            audit_log_enabled: true,
            audit_log_retention_days: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    /// Base directory under which per-session folders are created.
    pub output_folder: PathBuf,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from("ShamirsSecret"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationConfig {
    pub name: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultKeeper {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub department: Option<String>,
    pub title: Option<String>,
    pub preferred_order: u32,
}

impl Default for DefaultKeeper {
    fn default() -> Self {
        Self {
            name: String::new(),
            phone: String::new(),
            email: String::new(),
            department: None,
            title: None,
            preferred_order: 0,
        }
    }
}

impl CeremonyConfig {
    /// Default keepers sorted ascending by `preferred_order`.
    pub fn keepers_in_preferred_order(&self) -> Vec<&DefaultKeeper> {
        let mut keepers = self.default_keepers.iter().collect::<Vec<_>>();
        keepers.sort_by_key(|k| k.preferred_order);
        keepers
    }

    /// Validate every recognized option, collecting all violations rather
    /// than stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.security.min_password_length < 8 {
            problems.push(format!(
                "security.min_password_length must be at least 8 (found {})",
                self.security.min_password_length
            ));
        }
        if self.security.kdf_iterations < crate::envelope::MIN_KDF_ITERATIONS {
            problems.push(format!(
                "security.kdf_iterations must be at least {} (found {})",
                crate::envelope::MIN_KDF_ITERATIONS,
                self.security.kdf_iterations
            ));
        }
        if !(1..=10).contains(&self.security.secure_delete_passes) {
            problems.push(format!(
                "security.secure_delete_passes must be within 1-10 (found {})",
                self.security.secure_delete_passes
            ));
        }
        if !(1..=3650).contains(&self.security.audit_log_retention_days) {
            problems.push(format!(
                "security.audit_log_retention_days must be within 1-3650 (found {})",
                self.security.audit_log_retention_days
            ));
        }
        if self.file_system.output_folder.as_os_str().is_empty() {
            problems.push("file_system.output_folder must not be empty".to_string());
        }

        if let Some(name) = &self.organization.name {
            if !validate::valid_name(name) {
                problems.push(format!("organization.name {:?} is not a valid name", name));
            }
        }
        if let Some(phone) = &self.organization.contact_phone {
            if !validate::valid_phone(phone) {
                problems.push(format!(
                    "organization.contact_phone {:?} is not a valid phone number",
                    phone
                ));
            }
        }

        for keeper in &self.default_keepers {
            if !validate::valid_name(&keeper.name) {
                problems.push(format!("default keeper name {:?} is invalid", keeper.name));
            }
            if !validate::valid_phone(&keeper.phone) {
                problems.push(format!(
                    "default keeper {:?} has invalid phone {:?}",
                    keeper.name, keeper.phone
                ));
            }
            if !validate::valid_email(&keeper.email) {
                problems.push(format!(
                    "default keeper {:?} has invalid email {:?}",
                    keeper.name, keeper.email
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
