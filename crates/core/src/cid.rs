//! Self-describing content addresses.
//!
//! A [`ContentAddress`] pairs a codec with the SHA-256 digest of a block's
//! bytes. The binary form follows the CIDv1 layout
//! (`version ‖ codec ‖ hash-fn ‖ digest-len ‖ digest`, varint-prefixed) and the
//! string form is multibase base58btc, so addresses look like `zb2rh…`.

use crate::hash::{ContentHash, SHA2_256_CODE, SHA2_256_LEN};
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const CID_VERSION: u64 = 1;
const MULTIBASE_BASE58BTC: char = 'z';

/// Block encoding named by a content address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Codec {
    /// Opaque leaf bytes.
    Raw,
    /// JSON link node (see [`crate::dag::LinkNode`]).
    DagJson,
}

impl Codec {
    /// Multicodec table code.
    pub const fn code(self) -> u64 {
        match self {
            Codec::Raw => 0x55,
            Codec::DagJson => 0x0129,
        }
    }

    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0x55 => Ok(Codec::Raw),
            0x0129 => Ok(Codec::DagJson),
            other => Err(Error::UnsupportedCodec(other)),
        }
    }
}

/// Content address of a single block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress {
    codec: Codec,
    digest: ContentHash,
}

impl ContentAddress {
    pub fn new(codec: Codec, digest: ContentHash) -> Self {
        Self { codec, digest }
    }

    /// Address `data` under the given codec.
    pub fn compute(codec: Codec, data: &[u8]) -> Self {
        Self::new(codec, ContentHash::compute(data))
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn digest(&self) -> &ContentHash {
        &self.digest
    }

    /// True for leaves that carry no links.
    pub fn is_raw(&self) -> bool {
        self.codec == Codec::Raw
    }

    /// Binary CIDv1 encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(36);
        write_varint(&mut out, CID_VERSION);
        write_varint(&mut out, self.codec.code());
        out.push(SHA2_256_CODE);
        out.push(SHA2_256_LEN);
        out.extend_from_slice(self.digest.as_bytes());
        out
    }

    /// Parse the binary CIDv1 encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (version, rest) = read_varint(bytes)?;
        if version != CID_VERSION {
            return Err(Error::InvalidAddress(format!(
                "unsupported version {version}"
            )));
        }
        let (code, rest) = read_varint(rest)?;
        let codec = Codec::from_code(code)?;

        match rest {
            [SHA2_256_CODE, SHA2_256_LEN, digest @ ..] => {
                Ok(Self::new(codec, ContentHash::from_slice(digest)?))
            }
            [hash_fn, ..] => Err(Error::InvalidAddress(format!(
                "unsupported hash function 0x{hash_fn:x}"
            ))),
            [] => Err(Error::InvalidAddress("missing multihash".to_string())),
        }
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(bytes: &[u8]) -> Result<(u64, &[u8])> {
    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate().take(9) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, &bytes[i + 1..]));
        }
    }
    Err(Error::InvalidAddress("truncated varint".to_string()))
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MULTIBASE_BASE58BTC}{}",
            bs58::encode(self.to_bytes()).into_string()
        )
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({self})")
    }
}

impl FromStr for ContentAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some(encoded) = s.strip_prefix(MULTIBASE_BASE58BTC) else {
            return Err(Error::InvalidAddress(format!(
                "expected base58btc multibase prefix: {s}"
            )));
        };
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| Error::InvalidAddress(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
