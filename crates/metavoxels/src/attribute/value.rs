//! Attribute values and the handles that pair them with a descriptor.

use std::fmt;

use super::{same_attribute, AttributePointer};
use crate::shared_object::{SharedObjectPointer, SharedObjectSet};

/// 0xAARRGGBB color.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedColor(pub u32);

impl PackedColor {
  pub const TRANSPARENT: Self = Self(0);

  pub const fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
    Self((alpha as u32) << 24 | (red as u32) << 16 | (green as u32) << 8 | blue as u32)
  }

  /// Opaque color.
  pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
    Self::rgba(red, green, blue, 0xFF)
  }

  pub const fn red(self) -> u8 {
    (self.0 >> 16) as u8
  }

  pub const fn green(self) -> u8 {
    (self.0 >> 8) as u8
  }

  pub const fn blue(self) -> u8 {
    self.0 as u8
  }

  pub const fn alpha(self) -> u8 {
    (self.0 >> 24) as u8
  }
}

impl fmt::Debug for PackedColor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{:08X}", self.0)
  }
}

/// Every value an attribute can hold.
#[derive(Debug, Clone)]
pub enum Value {
  Float(f32),
  Int(i32),
  Color(PackedColor),
  Object(Option<SharedObjectPointer>),
  ObjectSet(SharedObjectSet),
}

impl Value {
  pub fn kind_name(&self) -> &'static str {
    match self {
      Value::Float(_) => "float",
      Value::Int(_) => "int",
      Value::Color(_) => "color",
      Value::Object(_) => "object",
      Value::ObjectSet(_) => "object set",
    }
  }

  pub fn as_float(&self) -> Option<f32> {
    match self {
      Value::Float(value) => Some(*value),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i32> {
    match self {
      Value::Int(value) => Some(*value),
      _ => None,
    }
  }

  pub fn as_color(&self) -> Option<PackedColor> {
    match self {
      Value::Color(value) => Some(*value),
      _ => None,
    }
  }

  /// Outer `None` when this is not an object value.
  pub fn as_object(&self) -> Option<Option<&SharedObjectPointer>> {
    match self {
      Value::Object(value) => Some(value.as_ref()),
      _ => None,
    }
  }

  pub fn as_object_set(&self) -> Option<&SharedObjectSet> {
    match self {
      Value::ObjectSet(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_object_set_mut(&mut self) -> Option<&mut SharedObjectSet> {
    match self {
      Value::ObjectSet(value) => Some(value),
      _ => None,
    }
  }
}

impl From<f32> for Value {
  fn from(value: f32) -> Self {
    Value::Float(value)
  }
}

impl From<i32> for Value {
  fn from(value: i32) -> Self {
    Value::Int(value)
  }
}

impl From<PackedColor> for Value {
  fn from(value: PackedColor) -> Self {
    Value::Color(value)
  }
}

impl From<Option<SharedObjectPointer>> for Value {
  fn from(value: Option<SharedObjectPointer>) -> Self {
    Value::Object(value)
  }
}

impl From<SharedObjectSet> for Value {
  fn from(value: SharedObjectSet) -> Self {
    Value::ObjectSet(value)
  }
}

// =============================================================================
// Handles
// =============================================================================

/// Borrowed descriptor/value pair.
#[derive(Debug, Clone, Copy)]
pub struct AttributeValue<'a> {
  attribute: &'a AttributePointer,
  value: &'a Value,
}

impl<'a> AttributeValue<'a> {
  pub fn new(attribute: &'a AttributePointer, value: &'a Value) -> Self {
    Self { attribute, value }
  }

  pub fn attribute(&self) -> &'a AttributePointer {
    self.attribute
  }

  pub fn value(&self) -> &'a Value {
    self.value
  }

  /// Independent copy made by the descriptor.
  pub fn copy(&self) -> Value {
    self.attribute.create_copy(self.value)
  }

  pub fn is_default(&self) -> bool {
    self.attribute.is_default(self.value)
  }

  pub fn to_owned_value(&self) -> OwnedAttributeValue {
    OwnedAttributeValue::new(self.attribute.clone(), self.copy())
  }
}

impl PartialEq for AttributeValue<'_> {
  fn eq(&self, other: &Self) -> bool {
    same_attribute(self.attribute, other.attribute) && self.attribute.equal(self.value, other.value)
  }
}

/// Owned value; the descriptor's `destroy` runs exactly once, when the
/// value is replaced or the handle is dropped.
pub struct OwnedAttributeValue {
  attribute: AttributePointer,
  value: Value,
}

impl OwnedAttributeValue {
  pub fn new(attribute: AttributePointer, value: Value) -> Self {
    Self { attribute, value }
  }

  /// Fresh copy of the descriptor's default.
  pub fn with_default(attribute: AttributePointer) -> Self {
    let value = attribute.create();
    Self::new(attribute, value)
  }

  pub fn attribute(&self) -> &AttributePointer {
    &self.attribute
  }

  pub fn value(&self) -> &Value {
    &self.value
  }

  pub fn value_mut(&mut self) -> &mut Value {
    &mut self.value
  }

  /// Replace the value, destroying the previous one.
  pub fn set(&mut self, value: Value) {
    let previous = std::mem::replace(&mut self.value, value);
    self.attribute.destroy(previous);
  }

  pub fn as_attribute_value(&self) -> AttributeValue<'_> {
    AttributeValue::new(&self.attribute, &self.value)
  }

  pub fn is_default(&self) -> bool {
    self.attribute.is_default(&self.value)
  }
}

impl Drop for OwnedAttributeValue {
  fn drop(&mut self) {
    let value = std::mem::replace(&mut self.value, Value::Int(0));
    self.attribute.destroy(value);
  }
}

impl Clone for OwnedAttributeValue {
  fn clone(&self) -> Self {
    Self::new(self.attribute.clone(), self.attribute.create_copy(&self.value))
  }
}

impl PartialEq for OwnedAttributeValue {
  fn eq(&self, other: &Self) -> bool {
    self.as_attribute_value() == other.as_attribute_value()
  }
}

impl fmt::Debug for OwnedAttributeValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OwnedAttributeValue")
      .field("attribute", &self.attribute.name())
      .field("value", &self.value)
      .finish()
  }
}

#[cfg(test)]
#[path = "value_test.rs"]
mod value_test;
