//! Packed color and packed normal attributes.
//!
//! Both store a [`PackedColor`] through the same inline codec and differ
//! only in how eight children merge.

use glam::Vec3;

use super::{Attribute, AttributeInfo, InlineAttribute, PackedColor, Value, MERGE_COUNT};
use crate::bitstream::{BitReader, BitWriter};
use crate::error::Result;

/// Color merged by alpha-weighted mean.
#[derive(Debug)]
pub struct ColorAttribute {
  inline: InlineAttribute<PackedColor>,
}

impl ColorAttribute {
  pub fn new(name: impl Into<String>, default_value: PackedColor) -> Self {
    Self {
      inline: InlineAttribute::new(name, default_value),
    }
  }
}

/// Per-channel mean weighted by alpha, rounded to nearest. Transparent
/// children contribute nothing; all-transparent input yields transparent
/// black.
fn weighted_mean(colors: &[PackedColor; MERGE_COUNT]) -> PackedColor {
  let total_alpha: u32 = colors.iter().map(|color| color.alpha() as u32).sum();
  if total_alpha == 0 {
    return PackedColor::TRANSPARENT;
  }

  let channel = |select: fn(PackedColor) -> u8| {
    let weighted: u32 = colors
      .iter()
      .map(|&color| select(color) as u32 * color.alpha() as u32)
      .sum();
    ((weighted + total_alpha / 2) / total_alpha) as u8
  };

  let alpha = (total_alpha + MERGE_COUNT as u32 / 2) / MERGE_COUNT as u32;
  PackedColor::rgba(
    channel(PackedColor::red),
    channel(PackedColor::green),
    channel(PackedColor::blue),
    alpha as u8,
  )
}

impl Attribute for ColorAttribute {
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
    let colors = self.inline.scalars(children);
    if colors.iter().all(|color| *color == colors[0]) {
      *parent = Value::Color(colors[0]);
      return true;
    }
    *parent = Value::Color(weighted_mean(&colors));
    false
  }
}

// =============================================================================
// Normals
// =============================================================================

/// Pack a vector in [-1, 1]^3 into signed bytes with an opaque alpha.
pub fn pack_normal(normal: Vec3) -> PackedColor {
  let scaled = normal.clamp(Vec3::NEG_ONE, Vec3::ONE) * 127.0;
  PackedColor::rgb(
    scaled.x as i8 as u8,
    scaled.y as i8 as u8,
    scaled.z as i8 as u8,
  )
}

pub fn unpack_normal(color: PackedColor) -> Vec3 {
  Vec3::new(
    color.red() as i8 as f32,
    color.green() as i8 as f32,
    color.blue() as i8 as f32,
  ) / 127.0
}

/// Unit normal merged by renormalized vector sum.
#[derive(Debug)]
pub struct PackedNormalAttribute {
  inline: InlineAttribute<PackedColor>,
}

impl PackedNormalAttribute {
  pub fn new(name: impl Into<String>, default_value: PackedColor) -> Self {
    Self {
      inline: InlineAttribute::new(name, default_value),
    }
  }
}

impl Attribute for PackedNormalAttribute {
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
    let normals = self.inline.scalars(children);
    if normals.iter().all(|normal| *normal == normals[0]) {
      *parent = Value::Color(normals[0]);
      return true;
    }

    let sum: Vec3 = normals.iter().map(|&normal| unpack_normal(normal)).sum();
    *parent = if sum == Vec3::ZERO {
      self.inline.default_value().clone()
    } else {
      Value::Color(pack_normal(sum.normalize()))
    };
    false
  }
}
