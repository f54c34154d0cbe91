use super::*;

fn unit_spanner(x: f32) -> SharedObjectPointer {
  Spanner::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0)).into_pointer()
}

// =========================================================================
// Type hierarchy
// =========================================================================

#[test]
fn test_is_a_walks_parent_chain() {
  assert!(DEFAULT_GUIDE_TYPE.is_a(&GUIDE_TYPE));
  assert!(DEFAULT_GUIDE_TYPE.is_a(&SHARED_OBJECT_TYPE));
  assert!(SPANNER_TYPE.is_a(&SPANNER_TYPE));
  assert!(!SPANNER_TYPE.is_a(&GUIDE_TYPE));
  assert!(!GUIDE_TYPE.is_a(&DEFAULT_GUIDE_TYPE));
}

#[test]
fn test_catalog_builtins() {
  let catalog = ObjectCatalog::with_builtins();
  assert!(catalog.get("Spanner").is_some());
  assert!(catalog.get("MetavoxelGuide").is_some_and(|ty| ty.read.is_none()));
  assert!(catalog.get("Heightfield").is_none());
}

// =========================================================================
// Equality
// =========================================================================

/// Separate allocations with equal contents compare equal but are not the
/// same object.
#[test]
fn test_structural_versus_identity_equality() {
  let a = unit_spanner(0.0);
  let b = unit_spanner(0.0);
  let c = unit_spanner(2.0);

  assert!(objects_equal(&a, &b));
  assert!(!same_object(&a, &b));
  assert!(same_object(&a, &a.clone()));
  assert!(!objects_equal(&a, &c));

  let guide: SharedObjectPointer = Arc::new(DefaultGuide);
  assert!(!objects_equal(&a, &guide));
  assert!(optional_objects_equal(None, None));
  assert!(!optional_objects_equal(Some(&a), None));
}

// =========================================================================
// Object set
// =========================================================================

#[test]
fn test_set_deduplicates_equal_objects() {
  let mut set = SharedObjectSet::new();
  assert!(set.insert(unit_spanner(0.0)));
  assert!(!set.insert(unit_spanner(0.0)));
  assert!(set.insert(unit_spanner(1.0)));
  assert_eq!(set.len(), 2);
}

#[test]
fn test_set_toggle_and_remove() {
  let a = unit_spanner(0.0);
  let mut set: SharedObjectSet = [a.clone(), unit_spanner(1.0)].into_iter().collect();

  set.toggle(a.clone());
  assert!(!set.contains(&a));
  set.toggle(a.clone());
  assert!(set.contains(&a));

  assert!(set.remove(&unit_spanner(1.0)));
  assert!(!set.remove(&unit_spanner(1.0)));
  assert_eq!(set.len(), 1);
}

/// Equality does not depend on insertion order.
#[test]
fn test_set_equality_is_unordered() {
  let forward: SharedObjectSet = (0..3).map(|x| unit_spanner(x as f32)).collect();
  let backward: SharedObjectSet = (0..3).rev().map(|x| unit_spanner(x as f32)).collect();
  assert_eq!(forward, backward);

  let shorter: SharedObjectSet = (0..2).map(|x| unit_spanner(x as f32)).collect();
  assert_ne!(forward, shorter);
}

#[test]
fn test_set_union_and_difference() {
  let mut left: SharedObjectSet = (0..2).map(|x| unit_spanner(x as f32)).collect();
  let right: SharedObjectSet = (1..4).map(|x| unit_spanner(x as f32)).collect();

  let only_right: Vec<_> = right.difference(&left).cloned().collect();
  assert_eq!(only_right.len(), 2);

  left.union_with(&right);
  assert_eq!(left.len(), 4);
}

// =========================================================================
// Spanner geometry
// =========================================================================

#[test]
fn test_spanner_intersects_cube() {
  let spanner = Spanner::new(Vec3::splat(2.0), Vec3::splat(3.0));
  assert!(spanner.intersects(Vec3::ZERO, 4.0));
  assert!(spanner.intersects(Vec3::splat(3.0), 1.0));
  assert!(!spanner.intersects(Vec3::splat(4.0), 4.0));
  assert_eq!(spanner.extent(), 1.0);
  assert_eq!(spanner.center(), Vec3::splat(2.5));
}
