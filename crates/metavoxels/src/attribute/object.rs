//! Attributes holding shared objects.

use std::sync::Arc;

use glam::Vec3;

use super::{value_mismatch, Attribute, AttributeInfo, Value, MERGE_COUNT};
use crate::bitstream::{BitReader, BitWriter};
use crate::error::{MetavoxelError, Result};
use crate::node::MetavoxelNode;
use crate::shared_object::{
  optional_objects_equal, ObjectType, SharedObjectPointer, SharedObjectSet, Spanner, SPANNER_TYPE,
};
use crate::stream::{child_minimum, MetavoxelLod, StreamState};

fn check_constraint(
  info: &AttributeInfo,
  constraint: &'static ObjectType,
  object: &SharedObjectPointer,
) -> Result<()> {
  let object_type = object.object_type();
  if object_type.is_a(constraint) {
    return Ok(());
  }
  Err(MetavoxelError::TypeConstraintViolation {
    attribute: info.name().to_string(),
    constraint: constraint.name,
    object_type: object_type.name,
  })
}

// =============================================================================
// Single object
// =============================================================================

/// One optional shared object constrained to a type.
#[derive(Debug)]
pub struct SharedObjectAttribute {
  info: AttributeInfo,
  constraint: &'static ObjectType,
  default_value: Value,
}

impl SharedObjectAttribute {
  /// Panics when `default_object` does not satisfy `constraint`.
  pub fn new(
    name: impl Into<String>,
    constraint: &'static ObjectType,
    default_object: Option<SharedObjectPointer>,
  ) -> Self {
    let info = AttributeInfo::new(name);
    if let Some(object) = &default_object {
      if let Err(error) = check_constraint(&info, constraint, object) {
        panic!("invalid default object: {error}");
      }
    }
    Self {
      info,
      constraint,
      default_value: Value::Object(default_object),
    }
  }

  pub fn constraint(&self) -> &'static ObjectType {
    self.constraint
  }

  pub fn check_object(&self, object: &SharedObjectPointer) -> Result<()> {
    check_constraint(&self.info, self.constraint, object)
  }

  /// Build a value holding `object` after checking the constraint.
  pub fn create_from_object(&self, object: Option<SharedObjectPointer>) -> Result<Value> {
    if let Some(object) = &object {
      self.check_object(object)?;
    }
    Ok(Value::Object(object))
  }

  #[track_caller]
  fn object<'v>(&self, value: &'v Value) -> Option<&'v SharedObjectPointer> {
    match value.as_object() {
      Some(object) => object,
      None => value_mismatch(self.info.name(), "object", value),
    }
  }
}

impl Attribute for SharedObjectAttribute {
  fn info(&self) -> &AttributeInfo {
    &self.info
  }

  fn default_value(&self) -> &Value {
    &self.default_value
  }

  fn equal(&self, a: &Value, b: &Value) -> bool {
    optional_objects_equal(self.object(a), self.object(b))
  }

  fn read(&self, input: &mut BitReader<'_>, is_leaf: bool) -> Result<Value> {
    if !is_leaf {
      return Ok(self.default_value.clone());
    }
    let object = input.read_object()?;
    self.create_from_object(object)
  }

  fn write(&self, out: &mut BitWriter, value: &Value, is_leaf: bool) {
    if is_leaf {
      out.write_object(self.object(value));
    }
  }

  /// All-equal children pass the first child up; otherwise the parent
  /// reverts to the default.
  fn merge(&self, parent: &mut Value, children: &[&Value; MERGE_COUNT]) -> bool {
    let first = self.object(children[0]);
    let all_equal = children[1..]
      .iter()
      .all(|child| optional_objects_equal(self.object(child), first));
    *parent = if all_equal {
      Value::Object(first.cloned())
    } else {
      self.default_value.clone()
    };
    all_equal
  }
}

// =============================================================================
// Object set
// =============================================================================

/// Unordered set of shared objects constrained to a type.
#[derive(Debug)]
pub struct SharedObjectSetAttribute {
  info: AttributeInfo,
  constraint: &'static ObjectType,
  default_value: Value,
}

impl SharedObjectSetAttribute {
  pub fn new(name: impl Into<String>, constraint: &'static ObjectType) -> Self {
    Self {
      info: AttributeInfo::new(name),
      constraint,
      default_value: Value::ObjectSet(SharedObjectSet::new()),
    }
  }

  pub fn constraint(&self) -> &'static ObjectType {
    self.constraint
  }

  pub fn check_object(&self, object: &SharedObjectPointer) -> Result<()> {
    check_constraint(&self.info, self.constraint, object)
  }

  /// Insert after checking the constraint. Returns false when an equal
  /// object was already present.
  pub fn insert(&self, value: &mut Value, object: SharedObjectPointer) -> Result<bool> {
    self.check_object(&object)?;
    Ok(self.set_mut(value).insert(object))
  }

  #[track_caller]
  pub fn set<'v>(&self, value: &'v Value) -> &'v SharedObjectSet {
    match value.as_object_set() {
      Some(set) => set,
      None => value_mismatch(self.info.name(), "object set", value),
    }
  }

  #[track_caller]
  fn set_mut<'v>(&self, value: &'v mut Value) -> &'v mut SharedObjectSet {
    match value {
      Value::ObjectSet(set) => set,
      other => value_mismatch(self.info.name(), "object set", other),
    }
  }

  /// Read one non-null, constraint-satisfying object.
  fn read_member(&self, input: &mut BitReader<'_>) -> Result<SharedObjectPointer> {
    let object = input.read_object()?.ok_or_else(|| {
      MetavoxelError::MalformedEncoding(format!("null object in set `{}`", self.info.name()))
    })?;
    self.check_object(&object)?;
    Ok(object)
  }
}

impl Attribute for SharedObjectSetAttribute {
  fn info(&self) -> &AttributeInfo {
    &self.info
  }

  fn default_value(&self) -> &Value {
    &self.default_value
  }

  fn equal(&self, a: &Value, b: &Value) -> bool {
    self.set(a) == self.set(b)
  }

  /// Internal nodes carry no payload; their sets are the merge of their
  /// children.
  fn read(&self, input: &mut BitReader<'_>, is_leaf: bool) -> Result<Value> {
    if !is_leaf {
      return Ok(self.default_value.clone());
    }
    let count = input.read_u32()?;
    let mut set = SharedObjectSet::new();
    for _ in 0..count {
      set.insert(self.read_member(input)?);
    }
    Ok(Value::ObjectSet(set))
  }

  fn write(&self, out: &mut BitWriter, value: &Value, is_leaf: bool) {
    if !is_leaf {
      return;
    }
    let set = self.set(value);
    out.write_u32(set.len() as u32);
    for object in set.iter() {
      out.write_object(Some(object));
    }
  }

  /// Union of the children's sets.
  fn merge(&self, parent: &mut Value, children: &[&Value; MERGE_COUNT]) -> bool {
    let first = self.set(children[0]);
    let mut union = first.clone();
    let mut all_equal = true;
    for child in &children[1..] {
      let set = self.set(child);
      all_equal &= set == first;
      union.union_with(set);
    }
    *parent = Value::ObjectSet(union);
    all_equal
  }
}

// =============================================================================
// Spanner set
// =============================================================================

/// Object set of [`Spanner`]s streamed as explicit object lists.
///
/// A spanner is visible at a LOD when its extent passes the same
/// distance test used for subdividing nodes. Receivers store the visible
/// spanners as a single leaf set.
#[derive(Debug)]
pub struct SpannerSetAttribute {
  set: SharedObjectSetAttribute,
}

impl SpannerSetAttribute {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      set: SharedObjectSetAttribute::new(name, &SPANNER_TYPE),
    }
  }

  pub fn with_lod_threshold_multiplier(self, multiplier: f32) -> Self {
    self.set.info().set_lod_threshold_multiplier(multiplier);
    self
  }

  pub fn insert(&self, value: &mut Value, object: SharedObjectPointer) -> Result<bool> {
    self.set.insert(value, object)
  }

  /// Spanners visible at `lod` within the subtree at `state`.
  pub fn visible_spanners(&self, root: &MetavoxelNode, state: &StreamState<'_>, lod: &MetavoxelLod) -> SharedObjectSet {
    let mut visible = SharedObjectSet::new();
    self.collect_visible(root, state.minimum, state.size, lod, &mut visible);
    visible
  }

  fn collect_visible(
    &self,
    node: &MetavoxelNode,
    minimum: Vec3,
    size: f32,
    lod: &MetavoxelLod,
    visible: &mut SharedObjectSet,
  ) {
    let multiplier = self.lod_threshold_multiplier();
    match node.children() {
      // Parents hold the union of their children, so an unsubdivided
      // parent already lists everything below it.
      Some(children) if lod.should_subdivide(minimum, size, multiplier) => {
        let half_size = size * 0.5;
        for (octant, child) in children.iter().enumerate() {
          self.collect_visible(child, child_minimum(minimum, half_size, octant), half_size, lod, visible);
        }
      }
      _ => {
        for object in self.set.set(node.value()).iter() {
          if spanner_visible(object, lod, multiplier) {
            visible.insert(object.clone());
          }
        }
      }
    }
  }

  fn write_list<'a>(out: &mut BitWriter, objects: impl Iterator<Item = &'a SharedObjectPointer>) {
    for object in objects {
      out.write_object(Some(object));
    }
    out.write_object(None);
  }

  /// Read a null-terminated list, applying `apply` to each object.
  fn read_list(
    &self,
    input: &mut BitReader<'_>,
    mut apply: impl FnMut(SharedObjectPointer),
  ) -> Result<()> {
    while let Some(object) = input.read_object()? {
      self.set.check_object(&object)?;
      apply(object);
    }
    Ok(())
  }

  fn leaf(&self, state: &StreamState<'_>, set: SharedObjectSet) -> Arc<MetavoxelNode> {
    Arc::new(MetavoxelNode::leaf(state.attribute, Value::ObjectSet(set)))
  }
}

fn spanner_visible(object: &SharedObjectPointer, lod: &MetavoxelLod, multiplier: f32) -> bool {
  match object.as_any().downcast_ref::<Spanner>() {
    Some(spanner) => {
      spanner.extent() >= lod.position.distance(spanner.center()) * lod.threshold * multiplier
    }
    None => true,
  }
}

impl Attribute for SpannerSetAttribute {
  fn info(&self) -> &AttributeInfo {
    self.set.info()
  }

  fn default_value(&self) -> &Value {
    self.set.default_value()
  }

  fn equal(&self, a: &Value, b: &Value) -> bool {
    self.set.equal(a, b)
  }

  fn read(&self, input: &mut BitReader<'_>, is_leaf: bool) -> Result<Value> {
    self.set.read(input, is_leaf)
  }

  fn write(&self, out: &mut BitWriter, value: &Value, is_leaf: bool) {
    self.set.write(out, value, is_leaf);
  }

  fn merge(&self, parent: &mut Value, children: &[&Value; MERGE_COUNT]) -> bool {
    self.set.merge(parent, children)
  }

  fn read_metavoxel_root(
    &self,
    state: &StreamState<'_>,
    input: &mut BitReader<'_>,
  ) -> Result<Arc<MetavoxelNode>> {
    let mut set = SharedObjectSet::new();
    self.read_list(input, |object| {
      set.insert(object);
    })?;
    Ok(self.leaf(state, set))
  }

  fn write_metavoxel_root(&self, root: &MetavoxelNode, state: &StreamState<'_>, out: &mut BitWriter) {
    let visible = self.visible_spanners(root, state, &state.lod);
    Self::write_list(out, visible.iter());
  }

  /// Each listed spanner toggles membership in the reference set.
  fn read_metavoxel_delta(
    &self,
    reference: &Arc<MetavoxelNode>,
    state: &StreamState<'_>,
    input: &mut BitReader<'_>,
  ) -> Result<Arc<MetavoxelNode>> {
    let mut set = self.visible_spanners(reference, state, &MetavoxelLod::FULL);
    self.read_list(input, |object| set.toggle(object))?;
    Ok(self.leaf(state, set))
  }

  fn write_metavoxel_delta(
    &self,
    root: &MetavoxelNode,
    reference: &MetavoxelNode,
    state: &StreamState<'_>,
    out: &mut BitWriter,
  ) {
    let now = self.visible_spanners(root, state, &state.lod);
    let before = self.visible_spanners(reference, state, &state.reference_lod);
    Self::write_list(out, now.difference(&before).chain(before.difference(&now)));
  }

  fn read_metavoxel_subdivision(
    &self,
    root: &Arc<MetavoxelNode>,
    state: &StreamState<'_>,
    input: &mut BitReader<'_>,
  ) -> Result<Arc<MetavoxelNode>> {
    let mut set = self.visible_spanners(root, state, &MetavoxelLod::FULL);
    self.read_list(input, |object| {
      set.insert(object);
    })?;
    Ok(self.leaf(state, set))
  }

  /// Spanners that became visible since the reference LOD.
  fn write_metavoxel_subdivision(&self, root: &MetavoxelNode, state: &StreamState<'_>, out: &mut BitWriter) {
    let now = self.visible_spanners(root, state, &state.lod);
    let before = self.visible_spanners(root, state, &state.reference_lod);
    Self::write_list(out, now.difference(&before));
  }
}
