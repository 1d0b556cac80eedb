//! Fixed-width bit assignments.
//!
//! A [`Bits`] value assigns a boolean to each of up to [`MAX_PLACES`] wires.
//! Bit `i` is the value of the `i`-th input (or output) of a matrix, so the
//! integer value of an assignment doubles as its row/column index.

use std::fmt;
use std::str::FromStr;

use crate::error::{GbnError, Result};

/// Maximum number of wires a single matrix side may carry.
pub const MAX_PLACES: usize = 64;

/// Bit assignment over at most [`MAX_PLACES`] wires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bits(u64);

impl Bits {
    /// The all-zero assignment.
    pub const ZERO: Bits = Bits(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn get(self, i: usize) -> bool {
        debug_assert!(i < MAX_PLACES);
        (self.0 >> i) & 1 == 1
    }

    pub fn set(&mut self, i: usize, b: bool) {
        debug_assert!(i < MAX_PLACES);
        if b {
            self.0 |= 1 << i;
        } else {
            self.0 &= !(1 << i);
        }
    }

    pub fn flip(&mut self, i: usize) {
        debug_assert!(i < MAX_PLACES);
        self.0 ^= 1 << i;
    }

    pub fn with(mut self, i: usize, b: bool) -> Self {
        self.set(i, b);
        self
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True iff the lowest `k` bits are all set (vacuously true for `k == 0`).
    pub fn is_all_ones(self, k: usize) -> bool {
        let mask = low_mask(k);
        self.0 & mask == mask
    }

    /// Keep only the lowest `k` bits.
    pub fn truncate(self, k: usize) -> Self {
        Self(self.0 & low_mask(k))
    }

    pub fn count_ones(self) -> u32 {
        self.0.count_ones()
    }

    /// Render the lowest `width` bits, highest bit first.
    pub fn to_bit_string(self, width: usize) -> String {
        (0..width)
            .rev()
            .map(|i| if self.get(i) { '1' } else { '0' })
            .collect()
    }
}

impl From<u64> for Bits {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:b}", self.0)
    }
}

/// Parses `"0110"`-style strings; the leftmost character is the highest bit.
impl FromStr for Bits {
    type Err = GbnError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() > MAX_PLACES {
            return Err(GbnError::DimensionOverflow {
                n: s.len(),
                m: 0,
                max: MAX_PLACES,
            });
        }
        let mut value = 0u64;
        for c in s.chars() {
            value <<= 1;
            match c {
                '0' => {}
                '1' => value |= 1,
                other => {
                    return Err(GbnError::InvalidArgument(format!(
                        "'{}' is not a bit in '{}'",
                        other, s
                    )))
                }
            }
        }
        Ok(Self(value))
    }
}

fn low_mask(k: usize) -> u64 {
    if k >= MAX_PLACES {
        u64::MAX
    } else {
        (1u64 << k) - 1
    }
}

/// Number of assignments over `k` wires (`2^k`).
pub fn assignment_count(k: usize) -> u128 {
    1u128 << k
}

/// Iterate over every assignment of `k` wires in increasing integer order.
pub fn all_assignments(k: usize) -> impl Iterator<Item = Bits> {
    (0..assignment_count(k)).map(|i| Bits(i as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_msb_first() {
        let b: Bits = "01".parse().unwrap();
        assert!(b.get(0));
        assert!(!b.get(1));
        assert_eq!("110".parse::<Bits>().unwrap().value(), 6);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("012".parse::<Bits>().is_err());
    }

    #[test]
    fn test_all_ones() {
        assert!(Bits::new(0b0111).is_all_ones(3));
        assert!(!Bits::new(0b0101).is_all_ones(3));
        assert!(Bits::ZERO.is_all_ones(0));
        assert!(Bits::new(u64::MAX).is_all_ones(MAX_PLACES));
    }

    #[test]
    fn test_flip_and_set() {
        let mut b = Bits::ZERO;
        b.flip(4);
        assert_eq!(b.value(), 16);
        b.set(4, false);
        assert!(b.is_none());
        assert_eq!(Bits::new(5).to_bit_string(4), "0101");
    }

    #[test]
    fn test_all_assignments() {
        let all: Vec<u64> = all_assignments(2).map(Bits::value).collect();
        assert_eq!(all, vec![0, 1, 2, 3]);
        assert_eq!(all_assignments(0).count(), 1);
    }
}
