//! Fixed-width scalar attributes.

use std::fmt;
use std::marker::PhantomData;

use super::{value_mismatch, Attribute, AttributeInfo, PackedColor, Value, MERGE_COUNT};
use crate::bitstream::{BitReader, BitWriter};
use crate::error::Result;

/// A scalar stored directly in a [`Value`] and streamed as raw bits.
pub trait InlineScalar: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
  const BITS: usize;
  /// Variant name used in mismatch panics.
  const KIND: &'static str;

  fn from_value(value: &Value) -> Option<Self>;
  fn into_value(self) -> Value;
  fn to_raw(self) -> u64;
  fn from_raw(raw: u64) -> Self;
}

impl InlineScalar for f32 {
  const BITS: usize = 32;
  const KIND: &'static str = "float";

  fn from_value(value: &Value) -> Option<Self> {
    value.as_float()
  }

  fn into_value(self) -> Value {
    Value::Float(self)
  }

  fn to_raw(self) -> u64 {
    self.to_bits() as u64
  }

  fn from_raw(raw: u64) -> Self {
    f32::from_bits(raw as u32)
  }
}

impl InlineScalar for i32 {
  const BITS: usize = 32;
  const KIND: &'static str = "int";

  fn from_value(value: &Value) -> Option<Self> {
    value.as_int()
  }

  fn into_value(self) -> Value {
    Value::Int(self)
  }

  fn to_raw(self) -> u64 {
    self as u32 as u64
  }

  fn from_raw(raw: u64) -> Self {
    raw as u32 as i32
  }
}

impl InlineScalar for PackedColor {
  const BITS: usize = 32;
  const KIND: &'static str = "color";

  fn from_value(value: &Value) -> Option<Self> {
    value.as_color()
  }

  fn into_value(self) -> Value {
    Value::Color(self)
  }

  fn to_raw(self) -> u64 {
    self.0 as u64
  }

  fn from_raw(raw: u64) -> Self {
    PackedColor(raw as u32)
  }
}

/// Scalars whose merge is the arithmetic mean of the children.
pub trait Averageable: InlineScalar {
  fn mean(children: &[Self; MERGE_COUNT]) -> Self;
}

impl Averageable for f32 {
  fn mean(children: &[Self; MERGE_COUNT]) -> Self {
    children.iter().sum::<f32>() / MERGE_COUNT as f32
  }
}

impl Averageable for i32 {
  /// Truncates toward zero, like the type's own division.
  fn mean(children: &[Self; MERGE_COUNT]) -> Self {
    let total: i64 = children.iter().map(|&child| child as i64).sum();
    (total / MERGE_COUNT as i64) as i32
  }
}

// =============================================================================
// Codec helper
// =============================================================================

/// Shared read/write/compare logic for inline scalars.
///
/// Values are only streamed for leaves; internal nodes are recomputed by
/// merging on the receiving side.
#[derive(Debug)]
pub struct InlineAttribute<T: InlineScalar> {
  info: AttributeInfo,
  default_value: Value,
  _scalar: PhantomData<T>,
}

impl<T: InlineScalar> InlineAttribute<T> {
  pub fn new(name: impl Into<String>, default_value: T) -> Self {
    Self {
      info: AttributeInfo::new(name),
      default_value: default_value.into_value(),
      _scalar: PhantomData,
    }
  }

  pub fn info(&self) -> &AttributeInfo {
    &self.info
  }

  pub fn default_value(&self) -> &Value {
    &self.default_value
  }

  /// Extract the scalar, panicking on a foreign variant.
  #[track_caller]
  pub fn scalar(&self, value: &Value) -> T {
    T::from_value(value).unwrap_or_else(|| value_mismatch(self.info.name(), T::KIND, value))
  }

  pub fn scalars(&self, children: &[&Value; MERGE_COUNT]) -> [T; MERGE_COUNT] {
    children.map(|child| self.scalar(child))
  }

  pub fn read(&self, input: &mut BitReader<'_>, is_leaf: bool) -> Result<Value> {
    if !is_leaf {
      return Ok(self.default_value.clone());
    }
    Ok(T::from_raw(input.read_bits(T::BITS)?).into_value())
  }

  pub fn write(&self, out: &mut BitWriter, value: &Value, is_leaf: bool) {
    if is_leaf {
      out.write_bits(self.scalar(value).to_raw(), T::BITS);
    }
  }

  pub fn equal(&self, a: &Value, b: &Value) -> bool {
    self.scalar(a) == self.scalar(b)
  }
}

/// Inline scalar merged by mean.
#[derive(Debug)]
pub struct SimpleInlineAttribute<T: Averageable> {
  inline: InlineAttribute<T>,
}

pub type FloatAttribute = SimpleInlineAttribute<f32>;
pub type IntAttribute = SimpleInlineAttribute<i32>;

impl<T: Averageable> SimpleInlineAttribute<T> {
  pub fn new(name: impl Into<String>, default_value: T) -> Self {
    Self {
      inline: InlineAttribute::new(name, default_value),
    }
  }

  pub fn with_lod_threshold_multiplier(self, multiplier: f32) -> Self {
    self.inline.info().set_lod_threshold_multiplier(multiplier);
    self
  }
}

impl<T: Averageable> Attribute for SimpleInlineAttribute<T> {
  fn info(&self) -> &AttributeInfo {
    self.inline.info()
  }

  fn default_value(&self) -> &Value {
    self.inline.default_value()
  }

  fn equal(&self, a: &Value, b: &Value) -> bool {
    self.inline.equal(a, b)
  }

  fn read(&self, input: &mut BitReader<'_>, is_leaf: bool) -> Result<Value> {
    self.inline.read(input, is_leaf)
  }

  fn write(&self, out: &mut BitWriter, value: &Value, is_leaf: bool) {
    self.inline.write(out, value, is_leaf);
  }

  fn merge(&self, parent: &mut Value, children: &[&Value; MERGE_COUNT]) -> bool {
    let scalars = self.inline.scalars(children);
    *parent = T::mean(&scalars).into_value();
    scalars.iter().all(|scalar| *scalar == scalars[0])
  }
}
