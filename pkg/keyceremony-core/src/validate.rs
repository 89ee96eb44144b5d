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

//! Contact and password validation contracts, shared by the prompting layer
//! and the configuration validator.

use std::sync::OnceLock;

use regex::Regex;

use crate::{config::SecurityConfig, sealed::SealedBytes};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_PHONE_LEN: usize = 20;
pub const MAX_EMAIL_LEN: usize = 254;

const SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+=[{]};:<>|./?,-";

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("static regex")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\d\s\+\-\(\)]+$").expect("static regex"))
}

fn phone_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{3}").expect("static regex"))
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z\s\-']+$").expect("static regex"))
}

pub fn valid_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= MAX_EMAIL_LEN && email_re().is_match(email)
}

/// Phone numbers are free-form but must contain at least three consecutive
/// digits somewhere, so "+--()" noise doesn't pass.
pub fn valid_phone(phone: &str) -> bool {
    !phone.is_empty()
        && phone.len() <= MAX_PHONE_LEN
        && phone_re().is_match(phone)
        && phone_digits_re().is_match(phone)
}

pub fn valid_name(name: &str) -> bool {
    !name.trim().is_empty() && name.len() <= MAX_NAME_LEN && name_re().is_match(name)
}

/// Check a keeper password against the configured complexity policy.
/// Returns every unmet requirement so the operator can fix them all at once.
pub fn check_password(password: &SealedBytes, policy: &SecurityConfig) -> Result<(), String> {
    let text = match std::str::from_utf8(password.expose()) {
        Ok(text) => text,
        Err(_) => return Err("password must be valid UTF-8".to_string()),
    };

    let mut missing = Vec::new();
    if text.chars().count() < policy.min_password_length {
        missing.push(format!(
            "at least {} characters",
            policy.min_password_length
        ));
    }
    if policy.require_uppercase && !text.chars().any(|c| c.is_ascii_uppercase()) {
        missing.push("an uppercase letter".to_string());
    }
    if policy.require_lowercase && !text.chars().any(|c| c.is_ascii_lowercase()) {
        missing.push("a lowercase letter".to_string());
    }
    if policy.require_digit && !text.chars().any(|c| c.is_ascii_digit()) {
        missing.push("a digit".to_string());
    }
    if policy.require_special_character && !text.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        missing.push(format!("a special character ({})", SPECIAL_CHARACTERS));
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("password needs {}", missing.join(", ")))
    }
}
