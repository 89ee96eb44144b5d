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

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::shamir::Error;

/// One point `(x, y)` on the secret polynomial, produced by [Shamir Secret
/// Sharing][sss]. `x` is a single non-zero byte; `y` carries one evaluated
/// byte per byte of the secret.
///
/// Identity is `x`: two shares with equal `x` came from the same dealing slot
/// and can never be combined. Ordering follows `x` as well.
///
/// The canonical serialization -- the exact bytes the share envelope encrypts
/// -- is compact JSON of the shape `{"X":<int>,"Y":"<base64>"}`.
///
/// [sss]: https://en.wikipedia.org/wiki/Shamir%27s_Secret_Sharing
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Share {
    #[serde(rename = "X")]
    x: u8,
    #[serde(rename = "Y", with = "b64")]
    y: Vec<u8>,
}

impl Share {
    pub fn new(x: u8, y: Vec<u8>) -> Result<Self, Error> {
        if x == 0 {
            return Err(Error::ZeroShareIndex);
        }
        Ok(Self { x, y })
    }

    pub fn x(&self) -> u8 {
        self.x
    }

    pub fn y(&self) -> &[u8] {
        &self.y
    }

    /// Serialize to the canonical JSON form.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|err| Error::Serialization(err.to_string()))
    }

    /// Parse from the canonical JSON form, enforcing the non-zero-x
    /// invariant on the way in.
    pub fn from_canonical_json(bytes: &[u8]) -> Result<Self, Error> {
        let share: Share =
            serde_json::from_slice(bytes).map_err(|err| Error::Serialization(err.to_string()))?;
        if share.x == 0 {
            return Err(Error::ZeroShareIndex);
        }
        Ok(share)
    }
}

impl Ord for Share {
    fn cmp(&self, other: &Self) -> Ordering {
        self.x.cmp(&other.x)
    }
}

impl PartialOrd for Share {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Drop for Share {
    fn drop(&mut self) {
        // The y values are key material fragments.
        self.y.zeroize();
    }
}

/// Serde adapter serializing byte fields as standard base64 strings.
pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        BASE64.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Share {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self {
            x: loop {
                let x = u8::arbitrary(g);
                if x != 0 {
                    break x;
                }
            },
            y: Vec::arbitrary(g),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_x_is_rejected() {
        assert!(matches!(
            Share::new(0, vec![1, 2, 3]),
            Err(Error::ZeroShareIndex)
        ));
    }

    #[test]
    fn canonical_json_shape() {
        let share = Share::new(1, b"test share".to_vec()).unwrap();
        let json = share.to_canonical_json().unwrap();
        assert_eq!(
            String::from_utf8(json).unwrap(),
            r#"{"X":1,"Y":"dGVzdCBzaGFyZQ=="}"#
        );
    }

    #[test]
    fn parse_rejects_zero_x() {
        assert!(Share::from_canonical_json(br#"{"X":0,"Y":"AA=="}"#).is_err());
    }

    #[test]
    fn parse_rejects_bad_base64() {
        assert!(Share::from_canonical_json(br#"{"X":1,"Y":"!!!"}"#).is_err());
    }

    #[test]
    fn ordering_follows_x() {
        let a = Share::new(3, vec![0]).unwrap();
        let b = Share::new(200, vec![0]).unwrap();
        assert!(a < b);
    }

    #[quickcheck]
    fn share_json_roundtrip(share: Share) {
        let json = share.to_canonical_json().unwrap();
        let share2 = Share::from_canonical_json(&json).unwrap();
        assert_eq!(share, share2);
    }
}
