//! Catalog of attribute descriptors by name.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::attribute::{
  Attribute, AttributePointer, ColorAttribute, PackedColor, PackedNormalAttribute,
  SharedObjectAttribute, SpannerSetAttribute,
};
use crate::shared_object::{DefaultGuide, ObjectCatalog, GUIDE_TYPE};

pub const GUIDE_ATTRIBUTE: &str = "guide";
pub const SPANNERS_ATTRIBUTE: &str = "spanners";
pub const COLOR_ATTRIBUTE: &str = "color";
pub const NORMAL_ATTRIBUTE: &str = "normal";

/// Tuning for the built-in attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
  /// Spanner sets collapse later than other attributes.
  pub spanner_lod_threshold_multiplier: f32,
  pub normal_default: PackedColor,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      spanner_lod_threshold_multiplier: 4.0,
      normal_default: PackedColor::rgb(0, 127, 0),
    }
  }
}

impl RegistryConfig {
  pub fn with_spanner_lod_threshold_multiplier(mut self, multiplier: f32) -> Self {
    self.spanner_lod_threshold_multiplier = multiplier;
    self
  }

  pub fn with_normal_default(mut self, normal: PackedColor) -> Self {
    self.normal_default = normal;
    self
  }
}

/// Name-to-descriptor map shared by every stream and tree.
///
/// Construct once and pass by reference. Lookups share a read lock;
/// registration takes the write lock and only inserts fully built
/// descriptors.
#[derive(Debug)]
pub struct AttributeRegistry {
  attributes: RwLock<HashMap<String, AttributePointer>>,
  catalog: ObjectCatalog,
  guide: AttributePointer,
  spanners: AttributePointer,
  color: AttributePointer,
  normal: AttributePointer,
}

impl Default for AttributeRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl AttributeRegistry {
  pub fn new() -> Self {
    Self::with_config(RegistryConfig::default())
  }

  pub fn with_config(config: RegistryConfig) -> Self {
    let guide: AttributePointer = Arc::new(SharedObjectAttribute::new(
      GUIDE_ATTRIBUTE,
      &GUIDE_TYPE,
      Some(Arc::new(DefaultGuide)),
    ));
    let spanners: AttributePointer = Arc::new(
      SpannerSetAttribute::new(SPANNERS_ATTRIBUTE)
        .with_lod_threshold_multiplier(config.spanner_lod_threshold_multiplier),
    );
    let color: AttributePointer = Arc::new(ColorAttribute::new(COLOR_ATTRIBUTE, PackedColor::TRANSPARENT));
    let normal: AttributePointer = Arc::new(PackedNormalAttribute::new(NORMAL_ATTRIBUTE, config.normal_default));

    let attributes = [&guide, &spanners, &color, &normal]
      .into_iter()
      .map(|attribute| (attribute.name().to_string(), attribute.clone()))
      .collect();

    Self {
      attributes: RwLock::new(attributes),
      catalog: ObjectCatalog::with_builtins(),
      guide,
      spanners,
      color,
      normal,
    }
  }

  /// Object types available when decoding streams against this registry.
  pub fn catalog(&self) -> &ObjectCatalog {
    &self.catalog
  }

  pub fn guide_attribute(&self) -> &AttributePointer {
    &self.guide
  }

  pub fn spanners_attribute(&self) -> &AttributePointer {
    &self.spanners
  }

  pub fn color_attribute(&self) -> &AttributePointer {
    &self.color
  }

  pub fn normal_attribute(&self) -> &AttributePointer {
    &self.normal
  }

  /// Register `attribute`, or return the descriptor already registered
  /// under its name.
  pub fn register(&self, attribute: AttributePointer) -> AttributePointer {
    let mut attributes = self.attributes.write().unwrap_or_else(PoisonError::into_inner);
    match attributes.entry(attribute.name().to_string()) {
      Entry::Occupied(existing) => {
        trace!(attribute = %existing.key(), "attribute already registered");
        existing.get().clone()
      }
      Entry::Vacant(slot) => {
        debug!(attribute = %slot.key(), "registered attribute");
        slot.insert(attribute).clone()
      }
    }
  }

  pub fn register_attribute<A: Attribute + 'static>(&self, attribute: A) -> AttributePointer {
    self.register(Arc::new(attribute))
  }

  /// Remove the mapping for `name`. Holders of the descriptor keep it
  /// alive.
  pub fn deregister(&self, name: &str) {
    let mut attributes = self.attributes.write().unwrap_or_else(PoisonError::into_inner);
    if attributes.remove(name).is_some() {
      debug!(attribute = %name, "deregistered attribute");
    }
  }

  pub fn get(&self, name: &str) -> Option<AttributePointer> {
    let attributes = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
    attributes.get(name).cloned()
  }

  pub fn len(&self) -> usize {
    self.attributes.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Registered names in sorted order.
  pub fn names(&self) -> Vec<String> {
    let attributes = self.attributes.read().unwrap_or_else(PoisonError::into_inner);
    let mut names: Vec<String> = attributes.keys().cloned().collect();
    names.sort();
    names
  }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
