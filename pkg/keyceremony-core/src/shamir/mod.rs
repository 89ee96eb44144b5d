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

//! Shamir Secret Sharing over GF(2^8).
//!
//! Secrets are split byte-wise: each byte position gets its own random
//! polynomial whose constant term is that secret byte, and a share collects
//! one evaluation per position at a common non-zero x. Any `threshold`
//! distinct shares reconstruct the secret by Lagrange interpolation at zero;
//! fewer reveal nothing.

mod dealer;
mod gf;
mod share;

pub use dealer::{combine, Dealer, MAX_SHARES};
pub use gf::{GfElem, GfPoint, GfPolynomial};
pub use share::Share;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("secret must be at least one byte long")]
    EmptySecret,

    #[error("threshold {threshold} is outside the supported range [2, 255]")]
    InvalidThreshold { threshold: u8 },

    #[error("cannot deal {total} shares at threshold {threshold}")]
    InvalidShareCount { total: u8, threshold: u8 },

    #[error("reconstruction needs {needed} shares but only {have} were supplied")]
    InsufficientShares { needed: usize, have: usize },

    #[error("share number {x} appears more than once")]
    DuplicateShares { x: u8 },

    #[error("shares disagree on secret length")]
    InconsistentShareLengths,

    #[error("share numbers must be non-zero")]
    ZeroShareIndex,

    #[error("share serialization failed: {0}")]
    Serialization(String),
}
