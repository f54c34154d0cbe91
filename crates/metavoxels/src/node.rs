//! Metavoxel tree nodes.
//!
//! A node holds one attribute value and either no children or exactly
//! eight. Children are indexed by octant (bit 0 = +X, bit 1 = +Y,
//! bit 2 = +Z) and shared through `Arc`, so unchanged subtrees are reused
//! between snapshots and compared by pointer first.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::attribute::{AttributePointer, AttributeValue, OwnedAttributeValue, Value};
use crate::bitstream::{BitReader, BitWriter};
use crate::error::Result;
use crate::merge::merge_nodes;
use crate::stream::StreamState;

pub type NodeChildren = Box<[Arc<MetavoxelNode>; 8]>;

#[derive(Debug, Clone)]
pub struct MetavoxelNode {
  value: OwnedAttributeValue,
  children: Option<NodeChildren>,
}

/// Convert collected children into the fixed octant array.
///
/// Panics unless exactly eight children were collected.
pub(crate) fn octant_array(children: SmallVec<[Arc<MetavoxelNode>; 8]>) -> NodeChildren {
  match children.into_inner() {
    Ok(children) => Box::new(children),
    Err(children) => panic!("a node has 8 children, got {}", children.len()),
  }
}

impl MetavoxelNode {
  pub fn new_leaf(value: OwnedAttributeValue) -> Self {
    Self { value, children: None }
  }

  pub fn leaf(attribute: &AttributePointer, value: Value) -> Self {
    Self::new_leaf(OwnedAttributeValue::new(attribute.clone(), value))
  }

  pub fn default_leaf(attribute: &AttributePointer) -> Self {
    Self::new_leaf(OwnedAttributeValue::with_default(attribute.clone()))
  }

  /// Internal node whose value is the merge of `children`.
  pub fn with_children(children: [Arc<MetavoxelNode>; 8]) -> Self {
    let outcome = merge_nodes(&children.each_ref().map(|child| &**child));
    let attribute = children[0].attribute().clone();
    Self {
      value: OwnedAttributeValue::new(attribute, outcome.value),
      children: Some(Box::new(children)),
    }
  }

  /// Node with an explicit value; the value is not recomputed.
  pub(crate) fn from_parts(value: OwnedAttributeValue, children: Option<NodeChildren>) -> Self {
    Self { value, children }
  }

  pub fn attribute(&self) -> &AttributePointer {
    self.value.attribute()
  }

  pub fn value(&self) -> &Value {
    self.value.value()
  }

  pub fn attribute_value(&self) -> AttributeValue<'_> {
    self.value.as_attribute_value()
  }

  pub fn owned_value(&self) -> &OwnedAttributeValue {
    &self.value
  }

  pub fn children(&self) -> Option<&[Arc<MetavoxelNode>; 8]> {
    self.children.as_deref()
  }

  pub fn child(&self, octant: usize) -> Option<&Arc<MetavoxelNode>> {
    self.children.as_ref().map(|children| &children[octant])
  }

  pub fn is_leaf(&self) -> bool {
    self.children.is_none()
  }

  /// Leaf holding the attribute's default; such roots are never streamed.
  pub fn is_default_leaf(&self) -> bool {
    self.is_leaf() && self.value.is_default()
  }

  /// Number of nodes in this subtree, counting shared subtrees each time
  /// they appear.
  pub fn node_count(&self) -> usize {
    1 + self
      .children()
      .map_or(0, |children| children.iter().map(|child| child.node_count()).sum())
  }

  /// Same allocation, or equal values and equal shape all the way down.
  pub fn same_subtree(&self, other: &MetavoxelNode) -> bool {
    if std::ptr::eq(self, other) {
      return true;
    }
    if self.value != other.value {
      return false;
    }
    match (self.children(), other.children()) {
      (None, None) => true,
      (Some(ours), Some(theirs)) => ours
        .iter()
        .zip(theirs.iter())
        .all(|(a, b)| Arc::ptr_eq(a, b) || a.same_subtree(b)),
      _ => false,
    }
  }

  // ===========================================================================
  // Root streaming
  // ===========================================================================

  /// Nodes that are not subdivided at the stream's LOD are sent as leaves
  /// holding their merged value.
  pub fn write(&self, state: &StreamState<'_>, out: &mut BitWriter) {
    if !state.should_subdivide() {
      state.attribute.write(out, self.value(), true);
      return;
    }
    let leaf = self.is_leaf();
    out.write_bool(leaf);
    state.attribute.write(out, self.value(), leaf);
    if let Some(children) = self.children() {
      for (octant, child) in children.iter().enumerate() {
        child.write(&state.child(octant), out);
      }
    }
  }

  pub fn read(state: &StreamState<'_>, input: &mut BitReader<'_>) -> Result<Self> {
    if !state.should_subdivide() {
      let value = state.attribute.read(input, true)?;
      return Ok(Self::leaf(state.attribute, value));
    }
    let leaf = input.read_bool()?;
    let value = state.attribute.read(input, leaf)?;
    if leaf {
      return Ok(Self::leaf(state.attribute, value));
    }

    let mut children = SmallVec::<[Arc<MetavoxelNode>; 8]>::new();
    for octant in 0..8 {
      children.push(Arc::new(Self::read(&state.child(octant), input)?));
    }
    Ok(Self::with_children(*octant_array(children)))
  }

  // ===========================================================================
  // Delta streaming
  // ===========================================================================

  pub fn write_delta(&self, reference: &MetavoxelNode, state: &StreamState<'_>, out: &mut BitWriter) {
    if !state.should_subdivide() {
      state
        .attribute
        .write_delta(out, self.value(), reference.value(), true);
      return;
    }
    let leaf = self.is_leaf();
    out.write_bool(leaf);
    state
      .attribute
      .write_delta(out, self.value(), reference.value(), leaf);

    let Some(children) = self.children() else {
      return;
    };
    match reference.children() {
      Some(reference_children) if state.should_subdivide_reference() => {
        for (octant, (child, reference_child)) in children.iter().zip(reference_children.iter()).enumerate() {
          let child_state = state.child(octant);
          if child.same_subtree(reference_child) {
            out.write_bool(false);
            if child_state.became_subdivided() {
              child.write_subdivision(&child_state, out);
            }
          } else {
            out.write_bool(true);
            child.write_delta(reference_child, &child_state, out);
          }
        }
      }
      // The receiver knows nothing below this node.
      _ => {
        for (octant, child) in children.iter().enumerate() {
          child.write(&state.child(octant), out);
        }
      }
    }
  }

  pub fn read_delta(
    reference: &Arc<MetavoxelNode>,
    state: &StreamState<'_>,
    input: &mut BitReader<'_>,
  ) -> Result<Self> {
    if !state.should_subdivide() {
      let value = state.attribute.read_delta(input, reference.value(), true)?;
      return Ok(Self::leaf(state.attribute, value));
    }
    let leaf = input.read_bool()?;
    let value = state.attribute.read_delta(input, reference.value(), leaf)?;
    if leaf {
      return Ok(Self::leaf(state.attribute, value));
    }

    let mut children = SmallVec::<[Arc<MetavoxelNode>; 8]>::new();
    match reference.children() {
      Some(reference_children) if state.should_subdivide_reference() => {
        for (octant, reference_child) in reference_children.iter().enumerate() {
          let child_state = state.child(octant);
          let child = if input.read_bool()? {
            Arc::new(Self::read_delta(reference_child, &child_state, input)?)
          } else if child_state.became_subdivided() {
            Self::read_subdivision(reference_child, &child_state, input)?
          } else {
            reference_child.clone()
          };
          children.push(child);
        }
      }
      _ => {
        for octant in 0..8 {
          children.push(Arc::new(Self::read(&state.child(octant), input)?));
        }
      }
    }
    Ok(Self::with_children(*octant_array(children)))
  }

  // ===========================================================================
  // Subdivision streaming
  // ===========================================================================

  /// Send the structure that became visible between the reference LOD and
  /// the current one. Values the receiver already holds are not restated.
  pub fn write_subdivision(&self, state: &StreamState<'_>, out: &mut BitWriter) {
    let leaf = self.is_leaf();
    if !state.should_subdivide_reference() {
      out.write_bool(leaf);
      if let Some(children) = self.children() {
        for (octant, child) in children.iter().enumerate() {
          child.write(&state.child(octant), out);
        }
      }
      return;
    }
    if let Some(children) = self.children() {
      for (octant, child) in children.iter().enumerate() {
        let child_state = state.child(octant);
        if child_state.became_subdivided() {
          child.write_subdivision(&child_state, out);
        }
      }
    }
  }

  /// Returns `node` itself when nothing below it changed.
  pub fn read_subdivision(
    node: &Arc<MetavoxelNode>,
    state: &StreamState<'_>,
    input: &mut BitReader<'_>,
  ) -> Result<Arc<MetavoxelNode>> {
    if !state.should_subdivide_reference() {
      if input.read_bool()? {
        if node.is_leaf() {
          return Ok(node.clone());
        }
        return Ok(Arc::new(Self::new_leaf(node.value.clone())));
      }
      let mut children = SmallVec::<[Arc<MetavoxelNode>; 8]>::new();
      for octant in 0..8 {
        children.push(Arc::new(Self::read(&state.child(octant), input)?));
      }
      return Ok(Arc::new(Self::from_parts(
        node.value.clone(),
        Some(octant_array(children)),
      )));
    }

    let Some(children) = node.children() else {
      return Ok(node.clone());
    };
    let mut changed = false;
    let mut refined = SmallVec::<[Arc<MetavoxelNode>; 8]>::new();
    for (octant, child) in children.iter().enumerate() {
      let child_state = state.child(octant);
      let next = if child_state.became_subdivided() {
        Self::read_subdivision(child, &child_state, input)?
      } else {
        child.clone()
      };
      changed |= !Arc::ptr_eq(&next, child);
      refined.push(next);
    }

    if !changed {
      return Ok(node.clone());
    }
    Ok(Arc::new(Self::with_children(*octant_array(refined))))
  }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
