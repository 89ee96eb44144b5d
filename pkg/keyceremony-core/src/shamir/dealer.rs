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

use std::collections::HashSet;

use rand::{CryptoRng, RngCore};

use crate::shamir::{
    gf::{self, GfElem, GfPolynomial},
    Error, Share,
};

/// Largest usable threshold and share count -- x values are single non-zero
/// bytes, so at most 255 distinct shares exist.
pub const MAX_SHARES: u8 = 255;

/// The dealer side of the codec: holds one secret polynomial per byte of the
/// secret and evaluates all of them at a given x to mint a [`Share`].
///
/// Every polynomial's constant term is the corresponding secret byte; the
/// `threshold - 1` higher coefficients are fresh cryptographic randomness per
/// byte position, so each share reveals nothing on its own.
pub struct Dealer {
    threshold: u8,
    polynomials: Vec<GfPolynomial>,
}

impl Dealer {
    pub fn new<R: CryptoRng + RngCore + ?Sized>(
        secret: &[u8],
        threshold: u8,
        rng: &mut R,
    ) -> Result<Self, Error> {
        if secret.is_empty() {
            return Err(Error::EmptySecret);
        }
        if threshold < 2 {
            return Err(Error::InvalidThreshold { threshold });
        }
        let polynomials = secret
            .iter()
            .map(|&byte| GfPolynomial::new_rand(GfElem::from_byte(byte), threshold as usize, rng))
            .collect();
        Ok(Self {
            threshold,
            polynomials,
        })
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Evaluate every byte polynomial at `x`.
    pub fn share(&self, x: u8) -> Result<Share, Error> {
        if x == 0 {
            return Err(Error::ZeroShareIndex);
        }
        let x_elem = GfElem::from_byte(x);
        let y = self
            .polynomials
            .iter()
            .map(|poly| poly.evaluate(x_elem).to_byte())
            .collect();
        Share::new(x, y)
    }

    /// Mint the full ordered run of shares at x = 1, 2, ..., total.
    pub fn deal(&self, total: u8) -> Result<Vec<Share>, Error> {
        if total < self.threshold {
            return Err(Error::InvalidShareCount {
                total,
                threshold: self.threshold,
            });
        }
        (1..=total).map(|x| self.share(x)).collect()
    }
}

/// Recombine a secret from at least `threshold` shares.
///
/// Only the first `threshold` shares (in caller order) participate; the
/// Lagrange basis at x = 0 is computed once from their x values and applied
/// across every byte position.
pub fn combine(shares: &[Share], threshold: usize) -> Result<Vec<u8>, Error> {
    if threshold < 2 {
        return Err(Error::InvalidThreshold {
            threshold: threshold.min(u8::MAX as usize) as u8,
        });
    }
    if shares.len() < threshold {
        return Err(Error::InsufficientShares {
            needed: threshold,
            have: shares.len(),
        });
    }
    let shares = &shares[..threshold];

    let mut seen = HashSet::with_capacity(threshold);
    for share in shares {
        if !seen.insert(share.x()) {
            return Err(Error::DuplicateShares { x: share.x() });
        }
    }

    let secret_len = shares[0].y().len();
    if shares.iter().any(|s| s.y().len() != secret_len) {
        return Err(Error::InconsistentShareLengths);
    }

    let xs = shares
        .iter()
        .map(|s| GfElem::from_byte(s.x()))
        .collect::<Vec<_>>();
    let basis = gf::lagrange_zero_basis(&xs);

    Ok((0..secret_len)
        .map(|pos| {
            shares
                .iter()
                .zip(&basis)
                .fold(GfElem::ZERO, |acc, (share, &l)| {
                    acc + GfElem::from_byte(share.y()[pos]) * l
                })
                .to_byte()
        })
        .collect())
}
