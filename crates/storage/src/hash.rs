//! Content hashes.
//!
//! Files are identified by what they contain, not where they live: two files
//! with identical bytes always share a [`ContentHash`], whatever their paths.

use std::fmt;
use std::str::FromStr;

/// BLAKE3 digest of a file's raw bytes.
///
/// Displayed (and persisted) as 64 lowercase hex characters.
///
/// ```
/// use tome_storage::ContentHash;
///
/// let a = ContentHash::of(b"same bytes");
/// let b = ContentHash::of(b"same bytes");
/// assert_eq!(a, b);
/// assert_eq!(a.to_string().len(), 64);
/// assert_eq!(a.to_string().parse::<ContentHash>().unwrap(), a);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; blake3::OUT_LEN]);

impl ContentHash {
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; blake3::OUT_LEN] {
        &self.0
    }
}
impl From<blake3::Hash> for ContentHash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}
impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(blake3::Hash::from_bytes(self.0).to_hex().as_str())
    }
}
// Full hex is noise in test failure output; eight characters is plenty to
// tell hashes apart.
impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = blake3::Hash::from_bytes(self.0).to_hex();
        write!(f, "ContentHash({}…)", &hex.as_str()[..8])
    }
}
impl FromStr for ContentHash {
    type Err = blake3::HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        blake3::Hash::from_hex(s).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_content_hashes_identically() {
        assert_eq!(ContentHash::of(b"hello"), ContentHash::of(b"hello"));
        assert_ne!(ContentHash::of(b"hello"), ContentHash::of(b"hello!"));
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = ContentHash::of(b"");
        let hex = hash.to_string();
        assert_eq!(hex, "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262");
        assert_eq!(hex.parse::<ContentHash>().unwrap(), hash);
    }

    #[test]
    fn test_invalid_hex_rejected() {
        assert!("not-a-hash".parse::<ContentHash>().is_err());
        assert!("af13".parse::<ContentHash>().is_err());
    }
}
