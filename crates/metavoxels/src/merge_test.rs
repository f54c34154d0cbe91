use super::*;
use crate::attribute::FloatAttribute;

fn density() -> AttributePointer {
  Arc::new(FloatAttribute::new("density", 0.0))
}

fn leaf(attribute: &AttributePointer, value: f32) -> Arc<MetavoxelNode> {
  Arc::new(MetavoxelNode::leaf(attribute, Value::Float(value)))
}

fn parent_of(attribute: &AttributePointer, values: [f32; MERGE_COUNT]) -> Arc<MetavoxelNode> {
  Arc::new(MetavoxelNode::with_children(values.map(|value| leaf(attribute, value))))
}

// =========================================================================
// Eight-way merge
// =========================================================================

#[test]
fn test_merge_values_mean() {
  let attribute = density();
  let values: Vec<Value> = (1..=8).map(|i| Value::Float(i as f32)).collect();
  let children: Vec<&Value> = values.iter().collect();

  let outcome = merge_values(&attribute, &children);
  assert_eq!(outcome.value.as_float(), Some(4.5));
  assert!(!outcome.all_children_equal);
}

#[test]
#[should_panic(expected = "exactly 8 children, got 7")]
fn test_merge_values_rejects_seven_children() {
  let attribute = density();
  let values: Vec<Value> = (0..7).map(|_| Value::Float(1.0)).collect();
  let children: Vec<&Value> = values.iter().collect();
  merge_values(&attribute, &children);
}

#[test]
#[should_panic(expected = "different attributes")]
fn test_merge_nodes_rejects_mixed_attributes() {
  let a = density();
  let b = density();
  let mut children: Vec<Arc<MetavoxelNode>> = (0..8).map(|_| leaf(&a, 1.0)).collect();
  children[3] = leaf(&b, 1.0);

  let refs: Vec<&MetavoxelNode> = children.iter().map(|child| &**child).collect();
  merge_nodes(&refs);
}

/// Building an internal node merges its children.
#[test]
fn test_with_children_merges_values() {
  let attribute = density();
  let node = parent_of(&attribute, [0.0, 0.0, 0.0, 0.0, 8.0, 8.0, 8.0, 8.0]);
  assert_eq!(node.value().as_float(), Some(4.0));
  assert!(!node.is_leaf());
}

// =========================================================================
// Collapse
// =========================================================================

#[test]
fn test_collapse_prunes_equal_leaves() {
  let attribute = density();
  let node = parent_of(&attribute, [2.0; MERGE_COUNT]);

  let collapsed = collapse(&node);
  assert!(collapsed.is_leaf());
  assert_eq!(collapsed.value().as_float(), Some(2.0));
}

/// Unequal children stay, and an unchanged tree is returned as is.
#[test]
fn test_collapse_keeps_unchanged_tree() {
  let attribute = density();
  let node = parent_of(&attribute, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

  let collapsed = collapse(&node);
  assert!(Arc::ptr_eq(&collapsed, &node));
}

/// Collapse works bottom-up: once the grandchildren fold, the children
/// become equal leaves and fold too.
#[test]
fn test_collapse_cascades_upward() {
  let attribute = density();
  let children: [Arc<MetavoxelNode>; MERGE_COUNT] =
    std::array::from_fn(|_| parent_of(&attribute, [5.0; MERGE_COUNT]));
  let root = Arc::new(MetavoxelNode::with_children(children));
  assert_eq!(root.node_count(), 1 + 8 + 64);

  let collapsed = collapse(&root);
  assert!(collapsed.is_leaf());
  assert_eq!(collapsed.value().as_float(), Some(5.0));
}

/// Only the foldable subtree is replaced; its siblings are shared.
#[test]
fn test_collapse_partial() {
  let attribute = density();
  let varied = parent_of(&attribute, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
  let mut children: [Arc<MetavoxelNode>; MERGE_COUNT] =
    std::array::from_fn(|_| parent_of(&attribute, [9.0; MERGE_COUNT]));
  children[0] = varied.clone();
  let root = Arc::new(MetavoxelNode::with_children(children));

  let collapsed = collapse(&root);
  assert!(!collapsed.is_leaf());
  assert!(Arc::ptr_eq(collapsed.child(0).unwrap(), &varied));
  assert!(collapsed.child(1).unwrap().is_leaf());
  assert_eq!(collapsed.node_count(), 1 + 8 + 8);
  assert_eq!(collapsed.value().as_float(), root.value().as_float());
}
