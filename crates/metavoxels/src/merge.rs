//! Eight-way merge and bottom-up LOD collapse.

use std::sync::Arc;

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::attribute::{same_attribute, AttributePointer, OwnedAttributeValue, Value, MERGE_COUNT};
use crate::node::{octant_array, MetavoxelNode};

/// Result of merging eight children.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
  pub value: Value,
  /// Every child equals the first; the parent can replace them.
  pub all_children_equal: bool,
}

/// Merge exactly eight values with `attribute`.
///
/// Panics on any other child count.
pub fn merge_values(attribute: &AttributePointer, children: &[&Value]) -> MergeOutcome {
  let Ok(children) = <&[&Value; MERGE_COUNT]>::try_from(children) else {
    panic!(
      "merging `{}` takes exactly {MERGE_COUNT} children, got {}",
      attribute.name(),
      children.len()
    );
  };
  let mut value = attribute.create();
  let all_children_equal = attribute.merge(&mut value, children);
  MergeOutcome {
    value,
    all_children_equal,
  }
}

/// Merge the values of eight sibling nodes.
///
/// Panics unless there are exactly eight children sharing one attribute.
pub fn merge_nodes(children: &[&MetavoxelNode]) -> MergeOutcome {
  let Some(first) = children.first() else {
    panic!("merging takes exactly {MERGE_COUNT} children, got 0");
  };
  let attribute = first.attribute();
  assert!(
    children
      .iter()
      .all(|child| same_attribute(child.attribute(), attribute)),
    "cannot merge children of different attributes into `{}`",
    attribute.name()
  );

  let values: SmallVec<[&Value; MERGE_COUNT]> = children.iter().map(|child| child.value()).collect();
  merge_values(attribute, &values)
}

/// Recompute merged values bottom-up, replacing internal nodes whose
/// children are equal leaves with a single leaf.
///
/// Sibling subtrees collapse in parallel. Subtrees that do not change are
/// returned as the same `Arc`.
pub fn collapse(node: &Arc<MetavoxelNode>) -> Arc<MetavoxelNode> {
  let Some(children) = node.children() else {
    return node.clone();
  };

  let collapsed: Vec<Arc<MetavoxelNode>> = children.par_iter().map(collapse).collect();
  let outcome = {
    let child_refs: SmallVec<[&MetavoxelNode; MERGE_COUNT]> = collapsed.iter().map(|child| &**child).collect();
    merge_nodes(&child_refs)
  };

  let attribute = node.attribute();
  if outcome.all_children_equal && collapsed.iter().all(|child| child.is_leaf()) {
    return Arc::new(MetavoxelNode::new_leaf(OwnedAttributeValue::new(
      attribute.clone(),
      outcome.value,
    )));
  }

  let unchanged = collapsed
    .iter()
    .zip(children.iter())
    .all(|(after, before)| Arc::ptr_eq(after, before));
  if unchanged && attribute.equal(node.value(), &outcome.value) {
    return node.clone();
  }

  Arc::new(MetavoxelNode::from_parts(
    OwnedAttributeValue::new(attribute.clone(), outcome.value),
    Some(octant_array(collapsed.into_iter().collect())),
  ))
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod merge_test;
