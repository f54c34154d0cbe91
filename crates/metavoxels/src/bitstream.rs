//! Bit cursor used by every attribute codec.
//!
//! Bits are packed least-significant first within each byte, and
//! multi-bit values are written least-significant bit first. Shared
//! objects are written by reference: the first occurrence of an object
//! carries a fresh id, its type name and its payload; later occurrences
//! carry only the id. Id 0 is the null reference.

use std::collections::HashMap;

use glam::Vec3;

use crate::error::{MetavoxelError, Result};
use crate::property_flags::PropertyFlags;
use crate::shared_object::{object_address, ObjectCatalog, SharedObjectPointer};

const NULL_OBJECT_ID: u32 = 0;

// =============================================================================
// Writer
// =============================================================================

/// Append-only bit sink.
#[derive(Debug, Default)]
pub struct BitWriter {
  bytes: Vec<u8>,
  bit_len: usize,
  object_ids: HashMap<usize, u32>,
  /// Keeps written objects alive so their addresses stay unique.
  retained: Vec<SharedObjectPointer>,
}

impl BitWriter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of bits written so far.
  pub fn bit_len(&self) -> usize {
    self.bit_len
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// Finish writing; the final byte is zero padded.
  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }

  pub fn write_bool(&mut self, value: bool) {
    let offset = self.bit_len % 8;
    if offset == 0 {
      self.bytes.push(0);
    }
    if value {
      if let Some(last) = self.bytes.last_mut() {
        *last |= 1 << offset;
      }
    }
    self.bit_len += 1;
  }

  /// Write the low `count` bits of `value`.
  pub fn write_bits(&mut self, value: u64, count: usize) {
    assert!(count <= 64, "cannot write {count} bits from a u64");
    for bit in 0..count {
      self.write_bool((value >> bit) & 1 == 1);
    }
  }

  pub fn write_u32(&mut self, value: u32) {
    self.write_bits(value as u64, 32);
  }

  pub fn write_i32(&mut self, value: i32) {
    self.write_u32(value as u32);
  }

  pub fn write_f32(&mut self, value: f32) {
    self.write_u32(value.to_bits());
  }

  pub fn write_vec3(&mut self, value: Vec3) {
    self.write_f32(value.x);
    self.write_f32(value.y);
    self.write_f32(value.z);
  }

  /// Length-prefixed UTF-8.
  pub fn write_string(&mut self, value: &str) {
    self.write_u32(value.len() as u32);
    for byte in value.bytes() {
      self.write_bits(byte as u64, 8);
    }
  }

  /// Embed the self-describing flag encoding.
  pub fn write_property_flags<E>(&mut self, flags: &PropertyFlags<E>) {
    for byte in flags.encode() {
      self.write_bits(byte as u64, 8);
    }
  }

  /// Write an object reference, serializing the object on first sight.
  pub fn write_object(&mut self, object: Option<&SharedObjectPointer>) {
    let Some(object) = object else {
      self.write_u32(NULL_OBJECT_ID);
      return;
    };

    let address = object_address(object);
    if let Some(&id) = self.object_ids.get(&address) {
      self.write_u32(id);
      return;
    }

    let id = self.retained.len() as u32 + 1;
    self.object_ids.insert(address, id);
    self.retained.push(object.clone());

    self.write_u32(id);
    self.write_string(object.object_type().name);
    object.write(self);
  }
}

// =============================================================================
// Reader
// =============================================================================

/// Bit source over a borrowed buffer.
#[derive(Debug)]
pub struct BitReader<'a> {
  bytes: &'a [u8],
  position: usize,
  catalog: Option<&'a ObjectCatalog>,
  /// Objects seen so far, indexed by id - 1. `None` while an object's own
  /// payload is being decoded.
  objects: Vec<Option<SharedObjectPointer>>,
}

impl<'a> BitReader<'a> {
  /// Reader without an object catalog; any object reference fails.
  pub fn new(bytes: &'a [u8]) -> Self {
    Self {
      bytes,
      position: 0,
      catalog: None,
      objects: Vec::new(),
    }
  }

  pub fn with_catalog(bytes: &'a [u8], catalog: &'a ObjectCatalog) -> Self {
    Self {
      catalog: Some(catalog),
      ..Self::new(bytes)
    }
  }

  /// Bit offset of the next read.
  pub fn position(&self) -> usize {
    self.position
  }

  pub fn remaining_bits(&self) -> usize {
    self.bytes.len() * 8 - self.position
  }

  fn ensure(&self, requested: usize) -> Result<()> {
    if requested > self.remaining_bits() {
      return Err(MetavoxelError::UnexpectedEnd {
        position: self.position,
        requested,
      });
    }
    Ok(())
  }

  pub fn read_bool(&mut self) -> Result<bool> {
    self.ensure(1)?;
    let byte = self.bytes[self.position / 8];
    let value = (byte >> (self.position % 8)) & 1 == 1;
    self.position += 1;
    Ok(value)
  }

  pub fn read_bits(&mut self, count: usize) -> Result<u64> {
    assert!(count <= 64, "cannot read {count} bits into a u64");
    self.ensure(count)?;
    let mut value = 0u64;
    for bit in 0..count {
      if self.read_bool()? {
        value |= 1 << bit;
      }
    }
    Ok(value)
  }

  pub fn read_u32(&mut self) -> Result<u32> {
    Ok(self.read_bits(32)? as u32)
  }

  pub fn read_i32(&mut self) -> Result<i32> {
    Ok(self.read_u32()? as i32)
  }

  pub fn read_f32(&mut self) -> Result<f32> {
    Ok(f32::from_bits(self.read_u32()?))
  }

  pub fn read_vec3(&mut self) -> Result<Vec3> {
    Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
  }

  pub fn read_string(&mut self) -> Result<String> {
    let len = self.read_u32()? as usize;
    self.ensure(len.saturating_mul(8))?;
    let mut bytes = Vec::with_capacity(len);
    for _ in 0..len {
      bytes.push(self.read_bits(8)? as u8);
    }
    String::from_utf8(bytes)
      .map_err(|error| MetavoxelError::MalformedEncoding(format!("string is not UTF-8: {error}")))
  }

  /// Read a flag set embedded with [`BitWriter::write_property_flags`].
  ///
  /// A stream that ends inside the declared length is reported as
  /// [`MetavoxelError::MalformedEncoding`], like [`PropertyFlags::decode`].
  pub fn read_property_flags<E>(&mut self) -> Result<PropertyFlags<E>> {
    let mut encoded = Vec::new();
    // Each all-ones byte extends the length prefix by eight bytes.
    loop {
      let byte = self.read_flag_byte(&encoded)?;
      encoded.push(byte);
      if byte != 0xFF {
        break;
      }
    }
    let declared = encoded.iter().take_while(|&&byte| byte == 0xFF).count() * 8
      + encoded.last().map_or(0, |byte| byte.leading_ones() as usize)
      + 1;
    while encoded.len() < declared {
      let byte = self.read_flag_byte(&encoded)?;
      encoded.push(byte);
    }
    PropertyFlags::from_encoded(&encoded)
  }

  fn read_flag_byte(&mut self, encoded: &[u8]) -> Result<u8> {
    match self.read_bits(8) {
      Ok(byte) => Ok(byte as u8),
      Err(MetavoxelError::UnexpectedEnd { position, .. }) => Err(MetavoxelError::MalformedEncoding(format!(
        "property flags truncated at bit {position} after {} bytes",
        encoded.len()
      ))),
      Err(error) => Err(error),
    }
  }

  /// Read an object reference written by [`BitWriter::write_object`].
  pub fn read_object(&mut self) -> Result<Option<SharedObjectPointer>> {
    let id = self.read_u32()?;
    if id == NULL_OBJECT_ID {
      return Ok(None);
    }

    let index = (id - 1) as usize;
    if index < self.objects.len() {
      return match &self.objects[index] {
        Some(object) => Ok(Some(object.clone())),
        None => Err(MetavoxelError::MalformedEncoding(format!(
          "object {id} references itself"
        ))),
      };
    }
    if index != self.objects.len() {
      return Err(MetavoxelError::MalformedEncoding(format!(
        "object id {id} skips ahead of {} known objects",
        self.objects.len()
      )));
    }

    let name = self.read_string()?;
    let reader = self
      .catalog
      .and_then(|catalog| catalog.get(&name))
      .and_then(|object_type| object_type.read)
      .ok_or_else(|| MetavoxelError::UnknownObjectType(name.clone()))?;

    self.objects.push(None);
    let object = reader(self)?;
    self.objects[index] = Some(object.clone());
    Ok(Some(object))
  }
}

#[cfg(test)]
#[path = "bitstream_test.rs"]
mod bitstream_test;
