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

#![forbid(unsafe_code)]

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use]
extern crate quickcheck_macros;

/// Shamir Secret Sharing over GF(2^8).
pub mod shamir;

/// Sealed containers for passwords, keys and plaintext secrets.
pub mod sealed;

/// The PBKDF2 + AES-256-GCM + HMAC share envelope.
pub mod envelope;

/// Ceremony configuration and its validators.
pub mod config;

/// Contact and password validation contracts.
pub mod validate;

/// The ceremony orchestrator and its event surface.
pub mod ceremony;

/// The session journal and provenance seal.
pub mod journal;

/// The session audit trail.
pub mod audit;

/// The emitted shares-file schema.
pub mod output;
