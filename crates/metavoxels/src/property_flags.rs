//! PropertyFlags - sparse, self-describing set of enumerated flags.
//!
//! Encodes "which of N enumerated properties are present" without a fixed
//! schema, so an enumeration can grow without a wire version bump.
//!
//! # Wire Format
//!
//! ```text
//! byte 0                 byte 1
//! 1 1 0 f0 f1 f2 f3 f4 | f5 f6 ... (zero padded)
//! └─┬─┘ └──── max_flag + 1 flag bits ────┘
//!   unary length prefix: (length - 1) ones, then a zero
//! ```
//!
//! - `length = max_flag / 7 + 1` bytes, bits are MSB-first within a byte.
//! - An empty set encodes as the single byte `0x00`.
//! - The trailing default (see [`PropertyFlags::is_complemented`]) is not
//!   encoded; only non-complemented sets round-trip.
//!
//! # Combinators
//!
//! Because the upper bound of the enumeration is unknown, `&` and `^` only
//! operate on the bits that are currently tracked:
//! - `a & b` clears bits of `a` beyond the tracked range of `b`
//! - `a ^ b` toggles only within the narrower of the two tracked ranges
//!
//! The trailing default of the right operand is ignored by every
//! combinator.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{
  Add, AddAssign, BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Not, Shl,
  ShlAssign, Sub, SubAssign,
};

use smallvec::SmallVec;

use crate::error::{MetavoxelError, Result};

const BITS_PER_BYTE: usize = 8;
const BITS_PER_WORD: usize = 64;

/// An enumerated property usable as a flag index.
pub trait PropertyFlag: Copy {
  /// Zero-based position of this flag in the encoded bit sequence.
  fn flag_index(self) -> usize;
}

macro_rules! impl_property_flag {
  ($($ty:ty),*) => {
    $(
      impl PropertyFlag for $ty {
        #[inline]
        fn flag_index(self) -> usize {
          self as usize
        }
      }
    )*
  };
}

impl_property_flag!(u8, u16, u32, usize);

/// Sparse flag set with a tracked maximum and a trailing default.
///
/// Invariants:
/// - storage covers exactly `max_flag + 1` bits; bits past that are zero
/// - the highest tracked bit never equals the trailing default (trailing
///   bits that match it are trimmed)
pub struct PropertyFlags<E> {
  words: SmallVec<[u64; 2]>,
  max_flag: Option<usize>,
  min_flag: Option<usize>,
  /// When set, flags past `max_flag` read as true.
  trailing_flipped: bool,
  _flag: PhantomData<fn() -> E>,
}

impl<E> PropertyFlags<E> {
  /// Create an empty flag set.
  pub fn new() -> Self {
    Self {
      words: SmallVec::new(),
      max_flag: None,
      min_flag: None,
      trailing_flipped: false,
      _flag: PhantomData,
    }
  }

  /// Remove every flag and reset the trailing default.
  pub fn clear(&mut self) {
    self.words.clear();
    self.max_flag = None;
    self.min_flag = None;
    self.trailing_flipped = false;
  }

  /// Lowest set flag within the tracked range.
  pub fn first_flag(&self) -> Option<usize> {
    self.min_flag
  }

  /// Highest tracked flag.
  pub fn last_flag(&self) -> Option<usize> {
    self.max_flag
  }

  /// True when no flag reads as set.
  pub fn is_empty(&self) -> bool {
    self.min_flag.is_none() && !self.trailing_flipped
  }

  /// True when flags past the tracked maximum read as set.
  pub fn is_complemented(&self) -> bool {
    self.trailing_flipped
  }

  /// Iterate over set flag indices within the tracked range.
  pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
    (0..self.tracked_len()).filter(move |&index| self.bit(index))
  }

  /// Query a flag by raw index.
  pub fn has_index(&self, index: usize) -> bool {
    if index >= self.tracked_len() {
      return self.trailing_flipped;
    }
    self.bit(index)
  }

  /// Set or clear a flag by raw index.
  pub fn set_index(&mut self, index: usize, value: bool) {
    if index >= self.tracked_len() {
      if value == self.trailing_flipped {
        // Already implied by the trailing default.
        return;
      }
      self.resize(index + 1, self.trailing_flipped);
    }
    self.put_bit(index, value);
    self.normalize();
  }

  /// Encode into the self-describing byte format.
  pub fn encode(&self) -> Vec<u8> {
    let Some(max_flag) = self.max_flag else {
      return vec![0];
    };

    let length_in_bytes = max_flag / (BITS_PER_BYTE - 1) + 1;
    let mut output = vec![0u8; length_in_bytes];

    // Unary length prefix; the terminating zero is already in place.
    for position in 0..length_in_bytes - 1 {
      set_encoded_bit(&mut output, position);
    }

    for flag in 0..=max_flag {
      if self.bit(flag) {
        set_encoded_bit(&mut output, length_in_bytes + flag);
      }
    }

    output
  }

  /// Replace the contents with the flags decoded from `encoded`.
  ///
  /// Returns the number of bytes consumed; bytes past the declared length
  /// are left for the caller.
  pub fn decode(&mut self, encoded: &[u8]) -> Result<usize> {
    self.clear();

    let bit_count = encoded.len() * BITS_PER_BYTE;
    let leading_ones = (0..bit_count)
      .take_while(|&position| encoded_bit(encoded, position))
      .count();

    if leading_ones == bit_count {
      let reason = if encoded.is_empty() {
        "no bytes to decode".to_string()
      } else {
        format!("length prefix is unterminated within {} bytes", encoded.len())
      };
      return Err(MetavoxelError::MalformedEncoding(reason));
    }

    let encoded_byte_count = leading_ones + 1;
    if encoded_byte_count > encoded.len() {
      return Err(MetavoxelError::MalformedEncoding(format!(
        "length prefix declares {} bytes, only {} available",
        encoded_byte_count,
        encoded.len()
      )));
    }

    let flags_start = leading_ones + 1;
    let flag_bits = encoded_byte_count * BITS_PER_BYTE - flags_start;
    let highest = (0..flag_bits)
      .rev()
      .find(|&flag| encoded_bit(encoded, flags_start + flag));

    if let Some(highest) = highest {
      self.resize(highest + 1, false);
      for flag in 0..=highest {
        if encoded_bit(encoded, flags_start + flag) {
          self.put_bit(flag, true);
        }
      }
    }
    self.normalize();

    Ok(encoded_byte_count)
  }

  /// Decode a new flag set from `encoded`.
  pub fn from_encoded(encoded: &[u8]) -> Result<Self> {
    let mut flags = Self::new();
    flags.decode(encoded)?;
    Ok(flags)
  }

  #[inline]
  fn tracked_len(&self) -> usize {
    self.max_flag.map_or(0, |max| max + 1)
  }

  #[inline]
  fn bit(&self, index: usize) -> bool {
    (self.words[index / BITS_PER_WORD] >> (index % BITS_PER_WORD)) & 1 == 1
  }

  #[inline]
  fn put_bit(&mut self, index: usize, value: bool) {
    let mask = 1u64 << (index % BITS_PER_WORD);
    let word = &mut self.words[index / BITS_PER_WORD];
    if value {
      *word |= mask;
    } else {
      *word &= !mask;
    }
  }

  /// Resize the tracked range, filling new bits with `fill`.
  fn resize(&mut self, len: usize, fill: bool) {
    let old_len = self.tracked_len();
    self.words.resize(len.div_ceil(BITS_PER_WORD), 0);

    if len > old_len {
      if fill {
        for index in old_len..len {
          self.put_bit(index, true);
        }
      }
    } else if len % BITS_PER_WORD != 0 {
      let last = len / BITS_PER_WORD;
      self.words[last] &= (1u64 << (len % BITS_PER_WORD)) - 1;
    }

    self.max_flag = len.checked_sub(1);
  }

  /// Trim trailing bits equal to the trailing default and refresh `min_flag`.
  fn normalize(&mut self) {
    let old_len = self.tracked_len();
    let mut len = old_len;
    while len > 0 && self.bit(len - 1) == self.trailing_flipped {
      len -= 1;
    }
    if len != old_len {
      self.resize(len, false);
    }

    self.min_flag = self
      .words
      .iter()
      .enumerate()
      .find(|(_, word)| **word != 0)
      .map(|(index, word)| index * BITS_PER_WORD + word.trailing_zeros() as usize);
  }
}

impl<E: PropertyFlag> PropertyFlags<E> {
  /// Set or clear `flag`.
  pub fn set_flag(&mut self, flag: E, value: bool) {
    self.set_index(flag.flag_index(), value);
  }

  /// Query `flag`; flags past the tracked maximum return the trailing
  /// default.
  pub fn has_flag(&self, flag: E) -> bool {
    self.has_index(flag.flag_index())
  }
}

#[inline]
fn encoded_bit(bytes: &[u8], position: usize) -> bool {
  bytes[position / BITS_PER_BYTE] & (0x80 >> (position % BITS_PER_BYTE)) != 0
}

#[inline]
fn set_encoded_bit(bytes: &mut [u8], position: usize) {
  bytes[position / BITS_PER_BYTE] |= 0x80 >> (position % BITS_PER_BYTE);
}

impl<E> Default for PropertyFlags<E> {
  fn default() -> Self {
    Self::new()
  }
}

impl<E> Clone for PropertyFlags<E> {
  fn clone(&self) -> Self {
    Self {
      words: self.words.clone(),
      max_flag: self.max_flag,
      min_flag: self.min_flag,
      trailing_flipped: self.trailing_flipped,
      _flag: PhantomData,
    }
  }
}

impl<E> PartialEq for PropertyFlags<E> {
  fn eq(&self, other: &Self) -> bool {
    self.max_flag == other.max_flag
      && self.trailing_flipped == other.trailing_flipped
      && self.words == other.words
  }
}

impl<E> Eq for PropertyFlags<E> {}

impl<E> fmt::Debug for PropertyFlags<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PropertyFlags")
      .field("set", &self.iter().collect::<Vec<_>>())
      .field("max_flag", &self.max_flag)
      .field("trailing_flipped", &self.trailing_flipped)
      .finish()
  }
}

impl<E: PropertyFlag> From<E> for PropertyFlags<E> {
  fn from(flag: E) -> Self {
    let mut flags = Self::new();
    flags.set_flag(flag, true);
    flags
  }
}

impl<E: PropertyFlag> FromIterator<E> for PropertyFlags<E> {
  fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
    let mut flags = Self::new();
    for flag in iter {
      flags.set_flag(flag, true);
    }
    flags
  }
}

impl<E> BitOrAssign<&PropertyFlags<E>> for PropertyFlags<E> {
  fn bitor_assign(&mut self, other: &PropertyFlags<E>) {
    let len = self.tracked_len().max(other.tracked_len());
    if len > self.tracked_len() {
      self.resize(len, false);
    }
    for index in other.iter() {
      self.put_bit(index, true);
    }
    self.normalize();
  }
}

impl<E> BitAndAssign<&PropertyFlags<E>> for PropertyFlags<E> {
  fn bitand_assign(&mut self, other: &PropertyFlags<E>) {
    for index in 0..self.tracked_len() {
      if self.bit(index) && !(index < other.tracked_len() && other.bit(index)) {
        self.put_bit(index, false);
      }
    }
    self.normalize();
  }
}

impl<E> BitXorAssign<&PropertyFlags<E>> for PropertyFlags<E> {
  fn bitxor_assign(&mut self, other: &PropertyFlags<E>) {
    let shared = self.tracked_len().min(other.tracked_len());
    for index in 0..shared {
      if other.bit(index) {
        let current = self.bit(index);
        self.put_bit(index, !current);
      }
    }
    self.normalize();
  }
}

impl<E> AddAssign<&PropertyFlags<E>> for PropertyFlags<E> {
  fn add_assign(&mut self, other: &PropertyFlags<E>) {
    for index in other.iter() {
      self.set_index(index, true);
    }
  }
}

impl<E> SubAssign<&PropertyFlags<E>> for PropertyFlags<E> {
  fn sub_assign(&mut self, other: &PropertyFlags<E>) {
    for index in other.iter() {
      self.set_index(index, false);
    }
  }
}

/// `<<` is an alias for `+`: append every flag of the right operand.
impl<E> ShlAssign<&PropertyFlags<E>> for PropertyFlags<E> {
  fn shl_assign(&mut self, other: &PropertyFlags<E>) {
    *self += other;
  }
}

macro_rules! flag_operator {
  ($op:ident, $method:ident, $assign:ident, $assign_method:ident) => {
    impl<E> $assign for PropertyFlags<E> {
      fn $assign_method(&mut self, other: Self) {
        <Self as $assign<&Self>>::$assign_method(self, &other);
      }
    }

    impl<E> $op for PropertyFlags<E> {
      type Output = Self;

      fn $method(mut self, other: Self) -> Self {
        <Self as $assign<&Self>>::$assign_method(&mut self, &other);
        self
      }
    }

    impl<E> $op<&PropertyFlags<E>> for &PropertyFlags<E> {
      type Output = PropertyFlags<E>;

      fn $method(self, other: &PropertyFlags<E>) -> PropertyFlags<E> {
        let mut result = self.clone();
        <PropertyFlags<E> as $assign<&PropertyFlags<E>>>::$assign_method(&mut result, other);
        result
      }
    }
  };
}

flag_operator!(BitOr, bitor, BitOrAssign, bitor_assign);
flag_operator!(BitAnd, bitand, BitAndAssign, bitand_assign);
flag_operator!(BitXor, bitxor, BitXorAssign, bitxor_assign);
flag_operator!(Add, add, AddAssign, add_assign);
flag_operator!(Sub, sub, SubAssign, sub_assign);
flag_operator!(Shl, shl, ShlAssign, shl_assign);

impl<E> Not for PropertyFlags<E> {
  type Output = Self;

  fn not(mut self) -> Self {
    for index in 0..self.tracked_len() {
      let current = self.bit(index);
      self.put_bit(index, !current);
    }
    self.trailing_flipped = !self.trailing_flipped;
    self.normalize();
    self
  }
}

impl<E> Not for &PropertyFlags<E> {
  type Output = PropertyFlags<E>;

  fn not(self) -> PropertyFlags<E> {
    !self.clone()
  }
}

#[cfg(test)]
#[path = "property_flags_test.rs"]
mod property_flags_test;
