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

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

/// An owned buffer for secret bytes -- passwords, derived keys, plaintext
/// secrets -- that cannot be cloned and is destroyed on drop by overwriting
/// the memory with several passes of random bytes before the final zeroize.
///
/// Callers reach the contents only through [`SealedBytes::expose`], which
/// keeps the borrow scoped and greppable.
pub struct SealedBytes {
    buf: Vec<u8>,
    passes: u32,
}

impl SealedBytes {
    pub fn new(bytes: Vec<u8>, passes: u32) -> Self {
        Self {
            buf: bytes,
            // A zero-pass wipe still zeroizes, but the configured range is
            // 1..=10 and the config validator enforces it.
            passes: passes.max(1),
        }
    }

    /// Seal a password or other text secret. The source string's buffer is
    /// moved, not copied, so no second plaintext copy lingers.
    pub fn from_string(text: String, passes: u32) -> Self {
        Self::new(text.into_bytes(), passes)
    }

    /// Seal `len` bytes drawn from the system CSPRNG.
    pub fn new_random(len: usize, passes: u32) -> Self {
        let mut buf = vec![0u8; len];
        OsRng.fill_bytes(&mut buf);
        Self::new(buf, passes)
    }

    /// Scoped borrow of the secret contents.
    pub fn expose(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Drop for SealedBytes {
    fn drop(&mut self) {
        for _ in 0..self.passes {
            OsRng.fill_bytes(&mut self.buf);
        }
        self.buf.zeroize();
    }
}

impl fmt::Debug for SealedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedBytes")
            .field("len", &self.buf.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expose_returns_the_sealed_bytes() {
        let sealed = SealedBytes::new(b"hunter2".to_vec(), 3);
        assert_eq!(sealed.expose(), b"hunter2");
        assert_eq!(sealed.len(), 7);
        assert!(!sealed.is_empty());
    }

    #[test]
    fn from_string_preserves_utf8_bytes() {
        let sealed = SealedBytes::from_string("pässword".to_string(), 1);
        assert_eq!(sealed.expose(), "pässword".as_bytes());
    }

    #[test]
    fn random_secrets_differ() {
        let a = SealedBytes::new_random(32, 1);
        let b = SealedBytes::new_random(32, 1);
        assert_eq!(a.len(), 32);
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn debug_redacts_contents() {
        let sealed = SealedBytes::new(b"top secret".to_vec(), 1);
        let rendered = format!("{:?}", sealed);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("top secret"));
    }
}
