//! Reference-counted, separately serializable objects carried by object
//! and object-set attributes.
//!
//! Every object reports a static [`ObjectType`]. Types form a single
//! inheritance chain used for attribute constraints, and concrete types
//! carry the reader that the bitstream invokes when it meets the type name.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use smallvec::SmallVec;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::Result;

/// Decodes the payload of one concrete object type.
pub type ObjectReader = fn(&mut BitReader<'_>) -> Result<SharedObjectPointer>;

/// Runtime type descriptor of a shared object.
pub struct ObjectType {
  pub name: &'static str,
  pub parent: Option<&'static ObjectType>,
  /// `None` for abstract types that never appear on the wire.
  pub read: Option<ObjectReader>,
}

impl ObjectType {
  /// True when `self` is `other` or derives from it.
  pub fn is_a(&self, other: &ObjectType) -> bool {
    let mut current = Some(self);
    while let Some(object_type) = current {
      if object_type.name == other.name {
        return true;
      }
      current = object_type.parent;
    }
    false
  }
}

impl fmt::Debug for ObjectType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ObjectType")
      .field("name", &self.name)
      .field("parent", &self.parent.map(|parent| parent.name))
      .field("abstract", &self.read.is_none())
      .finish()
  }
}

pub static SHARED_OBJECT_TYPE: ObjectType = ObjectType {
  name: "SharedObject",
  parent: None,
  read: None,
};

pub static SPANNER_TYPE: ObjectType = ObjectType {
  name: "Spanner",
  parent: Some(&SHARED_OBJECT_TYPE),
  read: Some(read_spanner),
};

/// Abstract base of every guide object.
pub static GUIDE_TYPE: ObjectType = ObjectType {
  name: "MetavoxelGuide",
  parent: Some(&SHARED_OBJECT_TYPE),
  read: None,
};

pub static DEFAULT_GUIDE_TYPE: ObjectType = ObjectType {
  name: "DefaultMetavoxelGuide",
  parent: Some(&GUIDE_TYPE),
  read: Some(read_default_guide),
};

/// A value that can be shared between nodes and streamed by reference.
pub trait SharedObject: Any + Send + Sync + fmt::Debug {
  fn object_type(&self) -> &'static ObjectType;

  /// Write the payload. The type name has already been written.
  fn write(&self, out: &mut BitWriter);

  /// Structural equality against another object of any type.
  fn equals(&self, other: &dyn SharedObject) -> bool;

  fn as_any(&self) -> &dyn Any;
}

pub type SharedObjectPointer = Arc<dyn SharedObject>;

/// Identity check first, then structural equality.
pub fn objects_equal(a: &SharedObjectPointer, b: &SharedObjectPointer) -> bool {
  same_object(a, b) || a.equals(&**b)
}

/// Equality for optional handles; two `None`s are equal.
pub fn optional_objects_equal(a: Option<&SharedObjectPointer>, b: Option<&SharedObjectPointer>) -> bool {
  match (a, b) {
    (None, None) => true,
    (Some(a), Some(b)) => objects_equal(a, b),
    _ => false,
  }
}

/// True when both handles point at the same allocation.
#[inline]
pub fn same_object(a: &SharedObjectPointer, b: &SharedObjectPointer) -> bool {
  object_address(a) == object_address(b)
}

#[inline]
pub(crate) fn object_address(object: &SharedObjectPointer) -> usize {
  Arc::as_ptr(object) as *const () as usize
}

// =============================================================================
// Object set
// =============================================================================

/// Unordered set of shared objects, deduplicated by [`objects_equal`].
#[derive(Clone, Default)]
pub struct SharedObjectSet {
  objects: SmallVec<[SharedObjectPointer; 4]>,
}

impl SharedObjectSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.objects.len()
  }

  pub fn is_empty(&self) -> bool {
    self.objects.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &SharedObjectPointer> {
    self.objects.iter()
  }

  pub fn contains(&self, object: &SharedObjectPointer) -> bool {
    self.objects.iter().any(|member| objects_equal(member, object))
  }

  /// Returns false when an equal object was already present.
  pub fn insert(&mut self, object: SharedObjectPointer) -> bool {
    if self.contains(&object) {
      return false;
    }
    self.objects.push(object);
    true
  }

  /// Returns false when no equal object was present.
  pub fn remove(&mut self, object: &SharedObjectPointer) -> bool {
    match self.objects.iter().position(|member| objects_equal(member, object)) {
      Some(index) => {
        self.objects.swap_remove(index);
        true
      }
      None => false,
    }
  }

  /// Insert when absent, remove when present.
  pub fn toggle(&mut self, object: SharedObjectPointer) {
    if !self.remove(&object) {
      self.objects.push(object);
    }
  }

  pub fn union_with(&mut self, other: &SharedObjectSet) {
    for object in other.iter() {
      self.insert(object.clone());
    }
  }

  /// Objects in `self` that `other` lacks.
  pub fn difference<'a>(&'a self, other: &'a SharedObjectSet) -> impl Iterator<Item = &'a SharedObjectPointer> {
    self.objects.iter().filter(move |object| !other.contains(object))
  }
}

impl PartialEq for SharedObjectSet {
  fn eq(&self, other: &Self) -> bool {
    self.len() == other.len() && self.objects.iter().all(|object| other.contains(object))
  }
}

impl fmt::Debug for SharedObjectSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set().entries(self.objects.iter()).finish()
  }
}

impl FromIterator<SharedObjectPointer> for SharedObjectSet {
  fn from_iter<I: IntoIterator<Item = SharedObjectPointer>>(iter: I) -> Self {
    let mut set = Self::new();
    for object in iter {
      set.insert(object);
    }
    set
  }
}

// =============================================================================
// Catalog
// =============================================================================

/// Name-to-type table consulted when decoding object references.
#[derive(Debug, Clone, Default)]
pub struct ObjectCatalog {
  types: HashMap<&'static str, &'static ObjectType>,
}

impl ObjectCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Catalog preloaded with the crate's own object types.
  pub fn with_builtins() -> Self {
    let mut catalog = Self::new();
    catalog.register(&SHARED_OBJECT_TYPE);
    catalog.register(&SPANNER_TYPE);
    catalog.register(&GUIDE_TYPE);
    catalog.register(&DEFAULT_GUIDE_TYPE);
    catalog
  }

  pub fn register(&mut self, object_type: &'static ObjectType) {
    self.types.insert(object_type.name, object_type);
  }

  pub fn get(&self, name: &str) -> Option<&'static ObjectType> {
    self.types.get(name).copied()
  }
}

// =============================================================================
// Built-in objects
// =============================================================================

/// Axis-aligned box placed in a spanner set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spanner {
  pub minimum: Vec3,
  pub maximum: Vec3,
}

impl Spanner {
  pub fn new(minimum: Vec3, maximum: Vec3) -> Self {
    Self { minimum, maximum }
  }

  pub fn into_pointer(self) -> SharedObjectPointer {
    Arc::new(self)
  }

  pub fn center(&self) -> Vec3 {
    (self.minimum + self.maximum) * 0.5
  }

  /// Largest edge length of the box.
  pub fn extent(&self) -> f32 {
    (self.maximum - self.minimum).max_element()
  }

  /// True when the box overlaps the cube at `minimum` with edge `size`.
  pub fn intersects(&self, minimum: Vec3, size: f32) -> bool {
    let maximum = minimum + Vec3::splat(size);
    self.minimum.cmple(maximum).all() && self.maximum.cmpge(minimum).all()
  }
}

impl SharedObject for Spanner {
  fn object_type(&self) -> &'static ObjectType {
    &SPANNER_TYPE
  }

  fn write(&self, out: &mut BitWriter) {
    out.write_vec3(self.minimum);
    out.write_vec3(self.maximum);
  }

  fn equals(&self, other: &dyn SharedObject) -> bool {
    other.as_any().downcast_ref::<Spanner>() == Some(self)
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

fn read_spanner(input: &mut BitReader<'_>) -> Result<SharedObjectPointer> {
  let minimum = input.read_vec3()?;
  let maximum = input.read_vec3()?;
  Ok(Spanner::new(minimum, maximum).into_pointer())
}

/// Guide that visits every node with the registry's default behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultGuide;

impl SharedObject for DefaultGuide {
  fn object_type(&self) -> &'static ObjectType {
    &DEFAULT_GUIDE_TYPE
  }

  fn write(&self, _out: &mut BitWriter) {}

  fn equals(&self, other: &dyn SharedObject) -> bool {
    other.as_any().is::<DefaultGuide>()
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

fn read_default_guide(_input: &mut BitReader<'_>) -> Result<SharedObjectPointer> {
  Ok(Arc::new(DefaultGuide))
}

#[cfg(test)]
#[path = "shared_object_test.rs"]
mod shared_object_test;
