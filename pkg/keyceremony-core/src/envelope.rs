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

//! The per-keeper share envelope.
//!
//! One keeper password protects one [`Share`]. PBKDF2-HMAC-SHA256 stretches
//! the password into 64 bytes: the first 32 key AES-256-GCM over the share's
//! canonical JSON, the second 32 key an HMAC-SHA256 over the resulting
//! `ciphertext || tag` blob. On decrypt the HMAC is checked before any AES
//! work, so a wrong password is rejected deterministically and cheaply; the
//! GCM tag then catches anything the HMAC key did not cover.
//!
//! Wire form: every field travels base64 -- the blob, the mac, the 32-byte
//! PBKDF2 salt, and the 12-byte GCM nonce. A nonce of any other length is
//! rejected outright; envelopes written by the retired 16-byte-IV code are
//! intentionally unreadable.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::{sealed::SealedBytes, shamir::Share};

type HmacSha256 = Hmac<Sha256>;

pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

const DERIVED_LEN: usize = 64;
const KEY_LEN: usize = 32;

/// Iteration counts below this are refused outright.
pub const MIN_KDF_ITERATIONS: u32 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed envelope: {0}")]
    BadFormat(String),

    #[error("envelope integrity check failed")]
    Integrity,

    #[error("key derivation refused: {0}")]
    Kdf(String),

    #[error("aead failure: {0}")]
    Crypto(String),
}

/// The four base64 fields of an encrypted share, exactly as they appear in a
/// keeper record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedShare {
    pub encrypted_share: String,
    pub hmac: String,
    pub salt: String,
    pub iv: String,
}

/// Stretch a password into the envelope's encryption and MAC keys.
fn derive_keys(
    password: &SealedBytes,
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; DERIVED_LEN]>, Error> {
    if iterations < MIN_KDF_ITERATIONS {
        return Err(Error::Kdf(format!(
            "iteration count {} is below the floor of {}",
            iterations, MIN_KDF_ITERATIONS
        )));
    }
    let mut derived = Zeroizing::new([0u8; DERIVED_LEN]);
    pbkdf2_hmac::<Sha256>(password.expose(), salt, iterations, &mut derived[..]);
    Ok(derived)
}

/// Encrypt a share under a keeper password.
pub fn encrypt_share<R: CryptoRng + RngCore + ?Sized>(
    share: &Share,
    password: &SealedBytes,
    iterations: u32,
    rng: &mut R,
) -> Result<SealedShare, Error> {
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let derived = derive_keys(password, &salt, iterations)?;
    let (enc_key, hmac_key) = derived.split_at(KEY_LEN);

    let mut plaintext = Zeroizing::new(
        share
            .to_canonical_json()
            .map_err(|err| Error::BadFormat(err.to_string()))?,
    );

    let cipher =
        Aes256Gcm::new_from_slice(enc_key).map_err(|err| Error::Crypto(err.to_string()))?;
    // The aead API appends the 16-byte GCM tag, which is exactly the blob
    // layout the envelope stores and MACs.
    let blob = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|err| Error::Crypto(err.to_string()))?;
    plaintext.zeroize();

    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(hmac_key).map_err(|err| Error::Crypto(err.to_string()))?;
    mac.update(&blob);
    let tag = mac.finalize().into_bytes();

    Ok(SealedShare {
        encrypted_share: BASE64.encode(&blob),
        hmac: BASE64.encode(tag),
        salt: BASE64.encode(salt),
        iv: BASE64.encode(nonce),
    })
}

/// Decrypt a sealed share with the keeper's password and the iteration count
/// recorded alongside it (never the live configuration's count).
pub fn decrypt_share(
    sealed: &SealedShare,
    password: &SealedBytes,
    iterations: u32,
) -> Result<Share, Error> {
    let decode = |label: &str, field: &str| {
        BASE64
            .decode(field)
            .map_err(|err| Error::BadFormat(format!("{} is not valid base64: {}", label, err)))
    };

    let blob = decode("encrypted share", &sealed.encrypted_share)?;
    let stored_mac = decode("hmac", &sealed.hmac)?;
    let salt = decode("salt", &sealed.salt)?;
    let nonce = decode("iv", &sealed.iv)?;

    if nonce.len() != NONCE_LEN {
        return Err(Error::BadFormat(format!(
            "iv must be {} bytes, found {}",
            NONCE_LEN,
            nonce.len()
        )));
    }
    if blob.len() < TAG_LEN {
        return Err(Error::BadFormat(
            "ciphertext is shorter than the GCM tag".to_string(),
        ));
    }

    let derived = derive_keys(password, &salt, iterations)?;
    let (enc_key, hmac_key) = derived.split_at(KEY_LEN);

    // The MAC check comes first: it is what a wrong password trips, in
    // constant time, before any AES work happens.
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(hmac_key).map_err(|err| Error::Crypto(err.to_string()))?;
    mac.update(&blob);
    mac.verify_slice(&stored_mac).map_err(|_| Error::Integrity)?;

    let cipher =
        Aes256Gcm::new_from_slice(enc_key).map_err(|err| Error::Crypto(err.to_string()))?;
    let mut plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce), blob.as_slice())
            .map_err(|_| Error::Integrity)?,
    );

    let share = Share::from_canonical_json(&plaintext)
        .map_err(|err| Error::BadFormat(err.to_string()))?;
    plaintext.zeroize();
    Ok(share)
}
