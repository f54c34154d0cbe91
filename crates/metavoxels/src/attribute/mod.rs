//! Attribute descriptors.
//!
//! An [`Attribute`] knows how to create, compare, merge and stream the
//! values of one named property of a metavoxel tree. Values themselves are
//! the closed [`Value`] sum type; a descriptor only ever interprets values
//! it created, and panics when handed a foreign variant.
//!
//! Variants:
//! - [`SimpleInlineAttribute`] - fixed-width scalars merged by mean
//! - [`ColorAttribute`] - packed ARGB merged by alpha-weighted mean
//! - [`PackedNormalAttribute`] - unit vectors packed as signed bytes
//! - [`SharedObjectAttribute`] - one optional shared object
//! - [`SharedObjectSetAttribute`] - unordered set of shared objects
//! - [`SpannerSetAttribute`] - object set streamed as explicit lists

mod color;
mod inline;
mod object;
mod value;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub use color::{pack_normal, unpack_normal, ColorAttribute, PackedNormalAttribute};
pub use inline::{
  Averageable, FloatAttribute, InlineAttribute, InlineScalar, IntAttribute, SimpleInlineAttribute,
};
pub use object::{SharedObjectAttribute, SharedObjectSetAttribute, SpannerSetAttribute};
pub use value::{AttributeValue, OwnedAttributeValue, PackedColor, Value};

use crate::bitstream::{BitReader, BitWriter};
use crate::error::Result;
use crate::node::MetavoxelNode;
use crate::stream::StreamState;

/// Number of children merged into one parent.
pub const MERGE_COUNT: usize = 8;

pub type AttributePointer = Arc<dyn Attribute>;

/// True when both handles refer to the same registered descriptor.
#[inline]
pub fn same_attribute(a: &AttributePointer, b: &AttributePointer) -> bool {
  Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Name and LOD tuning shared by every descriptor.
#[derive(Debug)]
pub struct AttributeInfo {
  name: String,
  /// f32 bits; the multiplier is the only mutable part of a descriptor.
  lod_threshold_multiplier: AtomicU32,
}

impl AttributeInfo {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      lod_threshold_multiplier: AtomicU32::new(1.0f32.to_bits()),
    }
  }

  pub fn with_lod_threshold_multiplier(self, multiplier: f32) -> Self {
    self.set_lod_threshold_multiplier(multiplier);
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn lod_threshold_multiplier(&self) -> f32 {
    f32::from_bits(self.lod_threshold_multiplier.load(Ordering::Relaxed))
  }

  pub fn set_lod_threshold_multiplier(&self, multiplier: f32) {
    self
      .lod_threshold_multiplier
      .store(multiplier.to_bits(), Ordering::Relaxed);
  }
}

/// Panic for a value of the wrong variant handed to a descriptor.
#[track_caller]
pub(crate) fn value_mismatch(attribute: &str, expected: &str, value: &Value) -> ! {
  panic!(
    "attribute `{attribute}` expects a {expected} value, got {}",
    value.kind_name()
  )
}

/// Type-erased descriptor of one attribute.
pub trait Attribute: Send + Sync + fmt::Debug {
  fn info(&self) -> &AttributeInfo;

  fn name(&self) -> &str {
    self.info().name()
  }

  /// Scales how aggressively subtrees of this attribute collapse.
  fn lod_threshold_multiplier(&self) -> f32 {
    self.info().lod_threshold_multiplier()
  }

  fn set_lod_threshold_multiplier(&self, multiplier: f32) {
    self.info().set_lod_threshold_multiplier(multiplier);
  }

  /// Immutable template copied by [`Attribute::create`].
  fn default_value(&self) -> &Value;

  fn create(&self) -> Value {
    self.create_copy(self.default_value())
  }

  fn create_copy(&self, value: &Value) -> Value {
    value.clone()
  }

  /// Release a value created by this descriptor.
  fn destroy(&self, _value: Value) {}

  fn equal(&self, a: &Value, b: &Value) -> bool;

  fn is_default(&self, value: &Value) -> bool {
    self.equal(value, self.default_value())
  }

  /// Decode one value. Inline and single-object variants carry no payload
  /// for internal nodes and return the default.
  fn read(&self, input: &mut BitReader<'_>, is_leaf: bool) -> Result<Value>;

  fn write(&self, out: &mut BitWriter, value: &Value, is_leaf: bool);

  fn read_delta(&self, input: &mut BitReader<'_>, _reference: &Value, is_leaf: bool) -> Result<Value> {
    self.read(input, is_leaf)
  }

  fn write_delta(&self, out: &mut BitWriter, value: &Value, _reference: &Value, is_leaf: bool) {
    self.write(out, value, is_leaf);
  }

  /// Merge exactly eight children into `parent`.
  ///
  /// Returns true when every child is equal, which lets the caller drop
  /// the children in favor of the parent.
  fn merge(&self, parent: &mut Value, children: &[&Value; MERGE_COUNT]) -> bool;

  // ===========================================================================
  // Tree streaming
  // ===========================================================================

  /// Decode a full subtree snapshot.
  fn read_metavoxel_root(
    &self,
    state: &StreamState<'_>,
    input: &mut BitReader<'_>,
  ) -> Result<Arc<MetavoxelNode>> {
    MetavoxelNode::read(state, input).map(Arc::new)
  }

  fn write_metavoxel_root(&self, root: &MetavoxelNode, state: &StreamState<'_>, out: &mut BitWriter) {
    root.write(state, out);
  }

  /// Decode a subtree against the receiver's `reference`.
  fn read_metavoxel_delta(
    &self,
    reference: &Arc<MetavoxelNode>,
    state: &StreamState<'_>,
    input: &mut BitReader<'_>,
  ) -> Result<Arc<MetavoxelNode>> {
    if input.read_bool()? {
      return MetavoxelNode::read_delta(reference, state, input).map(Arc::new);
    }
    if state.became_subdivided() {
      return MetavoxelNode::read_subdivision(reference, state, input);
    }
    Ok(reference.clone())
  }

  fn write_metavoxel_delta(
    &self,
    root: &MetavoxelNode,
    reference: &MetavoxelNode,
    state: &StreamState<'_>,
    out: &mut BitWriter,
  ) {
    if root.same_subtree(reference) {
      out.write_bool(false);
      if state.became_subdivided() {
        root.write_subdivision(state, out);
      }
      return;
    }
    out.write_bool(true);
    root.write_delta(reference, state, out);
  }

  /// Refine nodes collapsed at the reference LOD but subdivided now.
  fn read_metavoxel_subdivision(
    &self,
    root: &Arc<MetavoxelNode>,
    state: &StreamState<'_>,
    input: &mut BitReader<'_>,
  ) -> Result<Arc<MetavoxelNode>> {
    MetavoxelNode::read_subdivision(root, state, input)
  }

  fn write_metavoxel_subdivision(&self, root: &MetavoxelNode, state: &StreamState<'_>, out: &mut BitWriter) {
    root.write_subdivision(state, out);
  }
}
