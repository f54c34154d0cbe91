//! LOD-aware streaming of whole metavoxel volumes.
//!
//! # Wire Format
//!
//! Full snapshot ([`MetavoxelData::write`]):
//! ```text
//! size: f32
//! { true, name: string, root } *      one entry per non-default root
//! false
//! ```
//!
//! Delta ([`MetavoxelData::write_delta`]):
//! ```text
//! size: f32
//! { true, name: string, mode: 2 bits, payload } *
//! false
//! ```
//! Modes are [`EntryMode`]. Roots that are unchanged and not newly
//! subdivided are omitted.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::attribute::{AttributePointer, Value};
use crate::bitstream::{BitReader, BitWriter};
use crate::error::{MetavoxelError, Result};
use crate::merge::collapse;
use crate::node::MetavoxelNode;
use crate::registry::AttributeRegistry;

// =============================================================================
// LOD
// =============================================================================

/// Viewer position and the distance threshold that decides subdivision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetavoxelLod {
  pub position: Vec3,
  pub threshold: f32,
}

impl MetavoxelLod {
  /// Every node is subdivided.
  pub const FULL: Self = Self {
    position: Vec3::ZERO,
    threshold: 0.0,
  };

  pub fn new(position: Vec3, threshold: f32) -> Self {
    Self { position, threshold }
  }

  pub fn with_position(mut self, position: Vec3) -> Self {
    self.position = position;
    self
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  /// A cube subdivides when its size is at least its center's distance
  /// from the viewer scaled by the threshold.
  pub fn should_subdivide(&self, minimum: Vec3, size: f32, multiplier: f32) -> bool {
    let center = minimum + Vec3::splat(size * 0.5);
    size >= self.position.distance(center) * self.threshold * multiplier
  }

  /// Whether the cube may hold nodes subdivided now but not at
  /// `reference`.
  ///
  /// Conservative: a `true` result only means the subtree has to be
  /// visited. Any descendant may cross the threshold once the viewer
  /// moves, so only an unchanged viewer with an equal or coarser
  /// threshold, or a cube that is not subdivided now, is ruled out.
  pub fn became_subdivided(&self, minimum: Vec3, size: f32, reference: &MetavoxelLod, multiplier: f32) -> bool {
    if self.position == reference.position && self.threshold >= reference.threshold {
      return false;
    }
    self.should_subdivide(minimum, size, multiplier)
  }
}

impl Default for MetavoxelLod {
  fn default() -> Self {
    Self::FULL
  }
}

/// Minimum corner of child `octant` of a cube split into halves of
/// `half_size`.
#[inline]
pub fn child_minimum(minimum: Vec3, half_size: f32, octant: usize) -> Vec3 {
  minimum
    + Vec3::new(
      if octant & 1 != 0 { half_size } else { 0.0 },
      if octant & 2 != 0 { half_size } else { 0.0 },
      if octant & 4 != 0 { half_size } else { 0.0 },
    )
}

// =============================================================================
// Stream state
// =============================================================================

/// Position of the node being streamed plus the LODs on both ends.
#[derive(Debug, Clone, Copy)]
pub struct StreamState<'a> {
  pub attribute: &'a AttributePointer,
  pub minimum: Vec3,
  pub size: f32,
  pub lod: MetavoxelLod,
  /// LOD at which the receiver's reference data was sent.
  pub reference_lod: MetavoxelLod,
}

impl<'a> StreamState<'a> {
  pub fn new(attribute: &'a AttributePointer, minimum: Vec3, size: f32, lod: MetavoxelLod) -> Self {
    Self {
      attribute,
      minimum,
      size,
      lod,
      reference_lod: lod,
    }
  }

  pub fn with_reference_lod(mut self, reference_lod: MetavoxelLod) -> Self {
    self.reference_lod = reference_lod;
    self
  }

  pub fn should_subdivide(&self) -> bool {
    self
      .lod
      .should_subdivide(self.minimum, self.size, self.attribute.lod_threshold_multiplier())
  }

  pub fn should_subdivide_reference(&self) -> bool {
    self
      .reference_lod
      .should_subdivide(self.minimum, self.size, self.attribute.lod_threshold_multiplier())
  }

  pub fn became_subdivided(&self) -> bool {
    self.lod.became_subdivided(
      self.minimum,
      self.size,
      &self.reference_lod,
      self.attribute.lod_threshold_multiplier(),
    )
  }

  /// State of child `octant`.
  pub fn child(&self, octant: usize) -> Self {
    let half_size = self.size * 0.5;
    Self {
      minimum: child_minimum(self.minimum, half_size, octant),
      size: half_size,
      ..*self
    }
  }
}

// =============================================================================
// Volume
// =============================================================================

/// How a delta entry relates to the receiver's reference root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
  /// Full root; the receiver had none.
  Root = 0,
  /// Changed relative to the reference root.
  Delta = 1,
  /// The receiver drops its root.
  Removed = 2,
  /// Unchanged, but refined for the new LOD.
  Subdivision = 3,
}

impl EntryMode {
  const BITS: usize = 2;

  fn from_bits(bits: u64) -> Self {
    match bits {
      0 => EntryMode::Root,
      1 => EntryMode::Delta,
      2 => EntryMode::Removed,
      _ => EntryMode::Subdivision,
    }
  }
}

/// One octree root per attribute over a cube of edge `size` centered on
/// the origin.
#[derive(Debug, Clone)]
pub struct MetavoxelData {
  size: f32,
  roots: BTreeMap<String, Arc<MetavoxelNode>>,
}

impl MetavoxelData {
  pub fn new(size: f32) -> Self {
    Self {
      size,
      roots: BTreeMap::new(),
    }
  }

  pub fn size(&self) -> f32 {
    self.size
  }

  pub fn minimum(&self) -> Vec3 {
    Vec3::splat(-self.size * 0.5)
  }

  pub fn root(&self, name: &str) -> Option<&Arc<MetavoxelNode>> {
    self.roots.get(name)
  }

  pub fn roots(&self) -> impl Iterator<Item = (&str, &Arc<MetavoxelNode>)> {
    self.roots.iter().map(|(name, root)| (name.as_str(), root))
  }

  /// Store `root` under its attribute's name, returning the previous root.
  pub fn set_root(&mut self, root: Arc<MetavoxelNode>) -> Option<Arc<MetavoxelNode>> {
    self.roots.insert(root.attribute().name().to_string(), root)
  }

  pub fn remove_root(&mut self, name: &str) -> Option<Arc<MetavoxelNode>> {
    self.roots.remove(name)
  }

  /// Root value for `attribute`, or its default when there is no root.
  pub fn value_of(&self, attribute: &AttributePointer) -> Value {
    match self.roots.get(attribute.name()) {
      Some(root) => attribute.create_copy(root.value()),
      None => attribute.create(),
    }
  }

  /// Roots that are streamed; default leaves are equivalent to absence.
  fn streamed_root(&self, name: &str) -> Option<&Arc<MetavoxelNode>> {
    self.roots.get(name).filter(|root| !root.is_default_leaf())
  }

  fn state<'a>(&self, attribute: &'a AttributePointer, lod: MetavoxelLod) -> StreamState<'a> {
    StreamState::new(attribute, self.minimum(), self.size, lod)
  }

  /// Collapse every root in parallel.
  pub fn collapse(&mut self) {
    let _span = tracing::trace_span!("collapse_roots", roots = self.roots.len()).entered();
    let collapsed: Vec<(String, Arc<MetavoxelNode>)> = self
      .roots
      .par_iter()
      .map(|(name, root)| (name.clone(), collapse(root)))
      .collect();
    self.roots = collapsed.into_iter().collect();
  }

  // ===========================================================================
  // Full snapshot
  // ===========================================================================

  #[tracing::instrument(level = "trace", skip_all, name = "metavoxels::write")]
  pub fn write(&self, lod: MetavoxelLod, out: &mut BitWriter) {
    out.write_f32(self.size);
    for (name, root) in &self.roots {
      if root.is_default_leaf() {
        continue;
      }
      out.write_bool(true);
      out.write_string(name);
      let attribute = root.attribute();
      attribute.write_metavoxel_root(root, &self.state(attribute, lod), out);
    }
    out.write_bool(false);
  }

  #[tracing::instrument(level = "trace", skip_all, name = "metavoxels::read")]
  pub fn read(registry: &AttributeRegistry, lod: MetavoxelLod, input: &mut BitReader<'_>) -> Result<Self> {
    let mut data = Self::new(input.read_f32()?);
    while input.read_bool()? {
      let attribute = lookup(registry, input)?;
      let root = attribute.read_metavoxel_root(&data.state(&attribute, lod), input)?;
      data.roots.insert(attribute.name().to_string(), root);
    }
    debug!(roots = data.roots.len(), size = data.size, "read metavoxel data");
    Ok(data)
  }

  // ===========================================================================
  // Delta
  // ===========================================================================

  /// Write the changes from `reference` (sent at `reference_lod`) to this
  /// data at `lod`.
  #[tracing::instrument(level = "trace", skip_all, name = "metavoxels::write_delta")]
  pub fn write_delta(
    &self,
    reference: &MetavoxelData,
    lod: MetavoxelLod,
    reference_lod: MetavoxelLod,
    out: &mut BitWriter,
  ) {
    out.write_f32(self.size);
    // A resized volume shares no geometry with the reference.
    let empty = MetavoxelData::new(self.size);
    let reference = if reference.size == self.size { reference } else { &empty };

    for (name, root) in &self.roots {
      if root.is_default_leaf() {
        continue;
      }
      let attribute = root.attribute();
      let state = self.state(attribute, lod).with_reference_lod(reference_lod);

      match reference.streamed_root(name) {
        None => {
          write_entry(out, name, EntryMode::Root);
          attribute.write_metavoxel_root(root, &state, out);
        }
        Some(reference_root) if root.same_subtree(reference_root) => {
          if state.became_subdivided() {
            write_entry(out, name, EntryMode::Subdivision);
            attribute.write_metavoxel_subdivision(root, &state, out);
          } else {
            trace!(attribute = %name, "root unchanged");
          }
        }
        Some(reference_root) => {
          write_entry(out, name, EntryMode::Delta);
          attribute.write_metavoxel_delta(root, reference_root, &state, out);
        }
      }
    }

    for name in reference.roots.keys() {
      if reference.streamed_root(name).is_some() && self.streamed_root(name).is_none() {
        write_entry(out, name, EntryMode::Removed);
      }
    }
    out.write_bool(false);
  }

  /// Apply a delta written against `reference`.
  #[tracing::instrument(level = "trace", skip_all, name = "metavoxels::read_delta")]
  pub fn read_delta(
    reference: &MetavoxelData,
    registry: &AttributeRegistry,
    lod: MetavoxelLod,
    reference_lod: MetavoxelLod,
    input: &mut BitReader<'_>,
  ) -> Result<Self> {
    let size = input.read_f32()?;
    let mut data = if reference.size == size {
      reference.clone()
    } else {
      Self::new(size)
    };

    while input.read_bool()? {
      let attribute = lookup(registry, input)?;
      let name = attribute.name().to_string();
      let mode = EntryMode::from_bits(input.read_bits(EntryMode::BITS)?);
      let state = data.state(&attribute, lod).with_reference_lod(reference_lod);

      if mode == EntryMode::Root {
        let root = attribute.read_metavoxel_root(&state, input)?;
        data.roots.insert(name, root);
        continue;
      }
      if mode == EntryMode::Removed {
        data.roots.remove(&name);
        continue;
      }

      let Some(reference_root) = data.roots.get(&name).cloned() else {
        return Err(MetavoxelError::MalformedEncoding(format!(
          "{mode:?} entry for `{name}` without a reference root"
        )));
      };
      let root = if mode == EntryMode::Delta {
        attribute.read_metavoxel_delta(&reference_root, &state, input)?
      } else {
        attribute.read_metavoxel_subdivision(&reference_root, &state, input)?
      };
      data.roots.insert(name, root);
    }

    debug!(roots = data.roots.len(), size = data.size, "applied metavoxel delta");
    Ok(data)
  }
}

fn write_entry(out: &mut BitWriter, name: &str, mode: EntryMode) {
  out.write_bool(true);
  out.write_string(name);
  out.write_bits(mode as u64, EntryMode::BITS);
}

fn lookup(registry: &AttributeRegistry, input: &mut BitReader<'_>) -> Result<AttributePointer> {
  let name = input.read_string()?;
  registry
    .get(&name)
    .ok_or(MetavoxelError::UnknownAttribute(name))
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
