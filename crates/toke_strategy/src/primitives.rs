//! Account identities, amounts, and the ABI/Keccak helpers shared by the
//! voucher hashing and the RPC client.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Token amount in base units.
pub type Amount = u128;

/// Epoch index. The system clock counts whole days since the Unix epoch.
pub type Epoch = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("expected 20 bytes, got {0}")]
    Length(usize),
}

/// 20-byte account identity (depositors, contracts, signers).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Decode a `0x`-prefixed 40-digit hex literal at compile time.
    ///
    /// # Panics
    ///
    /// On malformed input. In a `const` item that is a build error.
    pub const fn from_hex_literal(s: &str) -> Self {
        let b = s.as_bytes();
        assert!(
            b.len() == 42 && b[0] == b'0' && (b[1] == b'x' || b[1] == b'X'),
            "address literal must be 0x followed by 40 hex digits"
        );
        let mut out = [0u8; 20];
        let mut i = 0;
        while i < 20 {
            out[i] = (hex_nibble(b[2 + 2 * i]) << 4) | hex_nibble(b[3 + 2 * i]);
            i += 1;
        }
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Left-padded 32-byte ABI word.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    /// Address held in the low 20 bytes of an ABI word.
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Self(bytes)
    }
}

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in address literal"),
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let raw = hex::decode(s).map_err(|e| AddressError::Hex(e.to_string()))?;
        let bytes: [u8; 20] = raw
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::Length(raw.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Keccak-256 digest.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// Big-endian `uint256` ABI word.
pub fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Decode a `uint256` ABI word; `None` if it does not fit in 128 bits.
pub fn word_to_u128(word: &[u8; 32]) -> Option<u128> {
    if word[..16].iter().any(|b| *b != 0) {
        return None;
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Some(u128::from_be_bytes(low))
}

const LOW_64: u128 = u64::MAX as u128;

/// Full 256-bit product of two `u128`s as `(high, low)` halves.
pub fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a_lo, a_hi) = (a & LOW_64, a >> 64);
    let (b_lo, b_hi) = (b & LOW_64, b >> 64);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    // Each term is below 2^64, so the sum cannot overflow.
    let mid = (ll >> 64) + (lh & LOW_64) + (hl & LOW_64);
    let lo = (ll & LOW_64) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// `floor(a * b / denom)` with a 256-bit intermediate. `None` when `denom`
/// is zero or the quotient does not fit in 128 bits.
pub fn mul_div_floor(a: u128, b: u128, denom: u128) -> Option<u128> {
    if denom == 0 {
        return None;
    }
    let (hi, lo) = widening_mul(a, b);
    if hi == 0 {
        return Some(lo / denom);
    }
    if hi >= denom {
        return None;
    }
    // Shift-subtract long division of (hi:lo) by denom; rem < denom throughout.
    let mut rem = hi;
    let mut quot: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quot <<= 1;
        if carry == 1 || rem >= denom {
            rem = rem.wrapping_sub(denom);
            quot |= 1;
        }
    }
    Some(quot)
}

/// First four bytes of the Keccak-256 of a Solidity function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_display() {
        let a: Address = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".parse().unwrap();
        assert_eq!(
            a.to_string(),
            "0x7a250d5630b4cf539739df2c5dacb4c659f2488d"
        );
        let b: Address = "7a250d5630b4cf539739df2c5dacb4c659f2488d".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn address_rejects_bad_input() {
        assert_eq!(
            "0x1234".parse::<Address>(),
            Err(AddressError::Length(2))
        );
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(AddressError::Hex(_))
        ));
    }

    #[test]
    fn hex_literal_matches_parse() {
        const ROUTER: Address = Address::from_hex_literal("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D");
        assert_eq!(
            ROUTER,
            "0x7a250d5630b4cf539739df2c5dacb4c659f2488d".parse().unwrap()
        );
    }

    #[test]
    #[should_panic(expected = "invalid hex digit")]
    fn hex_literal_rejects_bad_digit() {
        Address::from_hex_literal("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488G");
    }

    #[test]
    #[should_panic(expected = "40 hex digits")]
    fn hex_literal_rejects_short_input() {
        Address::from_hex_literal("0x1234");
    }

    #[test]
    fn widening_mul_matches_narrow_products() {
        assert_eq!(widening_mul(0, u128::MAX), (0, 0));
        assert_eq!(widening_mul(3, 5), (0, 15));
        assert_eq!(widening_mul(1 << 64, 1 << 64), (1, 0));
        // (2^128 - 1)^2 = 2^256 - 2^129 + 1
        assert_eq!(widening_mul(u128::MAX, u128::MAX), (u128::MAX - 1, 1));
    }

    #[test]
    fn mul_div_past_u128_product() {
        let e18: u128 = 1_000_000_000_000_000_000;
        // 1e18 * 1e21 overflows u128; the quotient does not.
        assert_eq!(mul_div_floor(e18, 1000 * e18, e18), Some(1000 * e18));
        assert_eq!(mul_div_floor(u128::MAX, u128::MAX, u128::MAX), Some(u128::MAX));
        assert_eq!(mul_div_floor(u128::MAX, 2, 4), Some(u128::MAX / 2));
        // 60/100 of 10 TOKE-sized units, rounded down.
        assert_eq!(
            mul_div_floor(60 * e18, 10_000 * e18 + 7, 100 * e18),
            Some(6_000 * e18 + 4)
        );
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), None);
        assert_eq!(mul_div_floor(1, 1, 0), None);
    }

    #[test]
    fn address_word_roundtrip() {
        let a = Address::new([0xab; 20]);
        let w = a.to_word();
        assert_eq!(&w[..12], &[0u8; 12]);
        assert_eq!(Address::from_word(&w), a);
    }

    #[test]
    fn keccak_empty_vector() {
        assert_eq!(
            hex::encode(keccak256([])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn selector_known_value() {
        // ERC-20 transfer(address,uint256)
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn uint_word_limits() {
        let w = uint_word(13_170_000_000_000_000);
        assert_eq!(word_to_u128(&w), Some(13_170_000_000_000_000));
        let mut big = [0u8; 32];
        big[0] = 1;
        assert_eq!(word_to_u128(&big), None);
    }
}
