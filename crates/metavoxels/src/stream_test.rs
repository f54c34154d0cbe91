use super::*;
use crate::attribute::{FloatAttribute, PackedColor, MERGE_COUNT};
use crate::shared_object::{SharedObjectSet, Spanner};

const SIZE: f32 = 16.0;

fn color_leaf(registry: &AttributeRegistry, color: PackedColor) -> Arc<MetavoxelNode> {
  Arc::new(MetavoxelNode::leaf(registry.color_attribute(), Value::Color(color)))
}

fn color_tree(registry: &AttributeRegistry) -> Arc<MetavoxelNode> {
  let children: [Arc<MetavoxelNode>; MERGE_COUNT] =
    std::array::from_fn(|octant| color_leaf(registry, PackedColor::rgb(octant as u8 * 30, 0, 255)));
  Arc::new(MetavoxelNode::with_children(children))
}

fn spanner_root(registry: &AttributeRegistry, spanners: &[Spanner]) -> Arc<MetavoxelNode> {
  let set: SharedObjectSet = spanners.iter().map(|spanner| spanner.into_pointer()).collect();
  Arc::new(MetavoxelNode::leaf(registry.spanners_attribute(), Value::ObjectSet(set)))
}

fn encode(data: &MetavoxelData, lod: MetavoxelLod) -> BitWriter {
  let mut out = BitWriter::new();
  data.write(lod, &mut out);
  out
}

fn decode(registry: &AttributeRegistry, bytes: &[u8], lod: MetavoxelLod) -> Result<MetavoxelData> {
  MetavoxelData::read(registry, lod, &mut BitReader::with_catalog(bytes, registry.catalog()))
}

// =========================================================================
// LOD
// =========================================================================

#[test]
fn test_full_lod_always_subdivides() {
  let far = Vec3::splat(1.0e6);
  assert!(MetavoxelLod::FULL.should_subdivide(far, 0.001, 4.0));
  assert_eq!(MetavoxelLod::default(), MetavoxelLod::FULL);
}

/// size >= distance(position, center) * threshold * multiplier
#[test]
fn test_should_subdivide_by_distance() {
  let lod = MetavoxelLod::new(Vec3::ZERO, 0.5);
  // Center (10, 0, 0): 4 >= 10 * 0.5 is false, 4 >= 10 * 0.5 * 0.5 is true.
  let minimum = Vec3::new(8.0, -2.0, -2.0);
  assert!(!lod.should_subdivide(minimum, 4.0, 1.0));
  assert!(lod.should_subdivide(minimum, 4.0, 0.5));
}

#[test]
fn test_became_subdivided() {
  let minimum = Vec3::splat(-8.0);
  let distant = MetavoxelLod::new(Vec3::new(1000.0, 0.0, 0.0), 1.0);
  let near = MetavoxelLod::new(Vec3::ZERO, 1.0);

  assert!(!near.became_subdivided(minimum, SIZE, &near, 1.0));
  assert!(near.became_subdivided(minimum, SIZE, &distant, 1.0));
  assert!(!distant.became_subdivided(minimum, SIZE, &near, 1.0));
  // Lowering the threshold in place may subdivide more; raising it never does.
  assert!(near.became_subdivided(minimum, SIZE, &near.with_threshold(2.0), 1.0));
  assert!(!near.with_threshold(2.0).became_subdivided(minimum, SIZE, &near, 1.0));
}

/// A viewer moving past the cube can subdivide a far-side child that was
/// collapsed before, so the parent must still report the change.
#[test]
fn test_became_subdivided_when_viewer_crosses_cube() {
  let reference = MetavoxelLod::new(Vec3::new(4.0, 4.0, -4.0), 0.5);
  let lod = MetavoxelLod::new(Vec3::new(4.0, 4.0, 12.5), 0.5);

  // Child octant 4 of the cube [0, 8]^3 sits on the +Z side.
  let child = child_minimum(Vec3::ZERO, 4.0, 4);
  assert!(lod.should_subdivide(child, 4.0, 1.0));
  assert!(!reference.should_subdivide(child, 4.0, 1.0));

  assert!(lod.became_subdivided(child, 4.0, &reference, 1.0));
  assert!(lod.became_subdivided(Vec3::ZERO, 8.0, &reference, 1.0));
}

#[test]
fn test_child_state_octants() {
  let registry = AttributeRegistry::new();
  let state = StreamState::new(registry.color_attribute(), Vec3::splat(-8.0), SIZE, MetavoxelLod::FULL);

  let first = state.child(0);
  assert_eq!(first.minimum, Vec3::splat(-8.0));
  assert_eq!(first.size, 8.0);

  assert_eq!(state.child(1).minimum, Vec3::new(0.0, -8.0, -8.0));
  assert_eq!(state.child(2).minimum, Vec3::new(-8.0, 0.0, -8.0));
  assert_eq!(state.child(4).minimum, Vec3::new(-8.0, -8.0, 0.0));
  assert_eq!(state.child(7).minimum, Vec3::ZERO);
}

// =========================================================================
// Full snapshots
// =========================================================================

/// A root equal to the default leaf encodes like an absent root.
#[test]
fn test_default_root_is_elided() {
  let registry = AttributeRegistry::new();
  let empty = MetavoxelData::new(SIZE);
  let mut defaulted = MetavoxelData::new(SIZE);
  defaulted.set_root(Arc::new(MetavoxelNode::default_leaf(registry.color_attribute())));

  let bytes = encode(&defaulted, MetavoxelLod::FULL).into_bytes();
  assert_eq!(bytes, encode(&empty, MetavoxelLod::FULL).into_bytes());

  let decoded = decode(&registry, &bytes, MetavoxelLod::FULL).unwrap();
  assert!(decoded.root("color").is_none());
  assert_eq!(
    decoded.value_of(registry.color_attribute()).as_color(),
    Some(PackedColor::TRANSPARENT)
  );
}

#[test]
fn test_full_round_trip() {
  let registry = AttributeRegistry::new();
  let mut data = MetavoxelData::new(SIZE);
  data.set_root(color_tree(&registry));
  data.set_root(spanner_root(
    &registry,
    &[
      Spanner::new(Vec3::ZERO, Vec3::ONE),
      Spanner::new(Vec3::splat(2.0), Vec3::splat(4.0)),
    ],
  ));

  let bytes = encode(&data, MetavoxelLod::FULL).into_bytes();
  let decoded = decode(&registry, &bytes, MetavoxelLod::FULL).unwrap();

  assert_eq!(decoded.size(), SIZE);
  assert!(decoded.root("color").unwrap().same_subtree(data.root("color").unwrap()));
  let spanners = decoded.value_of(registry.spanners_attribute());
  assert_eq!(spanners.as_object_set().map(|set| set.len()), Some(2));
}

#[test]
fn test_unknown_attribute_on_read() {
  let writer_registry = AttributeRegistry::new();
  let density = writer_registry.register_attribute(FloatAttribute::new("density", 0.0));
  let mut data = MetavoxelData::new(SIZE);
  data.set_root(Arc::new(MetavoxelNode::leaf(&density, Value::Float(1.0))));

  let bytes = encode(&data, MetavoxelLod::FULL).into_bytes();
  let result = decode(&AttributeRegistry::new(), &bytes, MetavoxelLod::FULL);
  assert_eq!(result.err(), Some(MetavoxelError::UnknownAttribute("density".into())));
}

/// Spanners too small for their distance are left out until the viewer
/// comes closer.
#[test]
fn test_spanner_visibility_follows_lod() {
  let registry = AttributeRegistry::new();
  let mut data = MetavoxelData::new(SIZE);
  data.set_root(spanner_root(
    &registry,
    &[
      Spanner::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
      Spanner::new(Vec3::new(100.0, 0.0, 0.0), Vec3::new(101.0, 1.0, 1.0)),
    ],
  ));
  let lod = MetavoxelLod::new(Vec3::ZERO, 1.0);

  let bytes = encode(&data, lod).into_bytes();
  let received = decode(&registry, &bytes, lod).unwrap();
  let visible = received.value_of(registry.spanners_attribute());
  assert_eq!(visible.as_object_set().map(|set| set.len()), Some(1));

  // Moving to full detail sends only the newly visible spanner.
  let mut out = BitWriter::new();
  data.write_delta(&data, MetavoxelLod::FULL, lod, &mut out);
  let bytes = out.into_bytes();
  let refined = MetavoxelData::read_delta(
    &received,
    &registry,
    MetavoxelLod::FULL,
    lod,
    &mut BitReader::with_catalog(&bytes, registry.catalog()),
  )
  .unwrap();
  let visible = refined.value_of(registry.spanners_attribute());
  assert_eq!(visible.as_object_set().map(|set| set.len()), Some(2));
}

/// A subdivided spanner tree reaches the receiver as one leaf set.
#[test]
fn test_spanner_tree_received_as_single_leaf() {
  let registry = AttributeRegistry::new();
  let children: [Arc<MetavoxelNode>; MERGE_COUNT] = std::array::from_fn(|octant| {
    let minimum = child_minimum(Vec3::splat(-8.0), 8.0, octant);
    spanner_root(&registry, &[Spanner::new(minimum, minimum + Vec3::ONE)])
  });
  let mut data = MetavoxelData::new(SIZE);
  data.set_root(Arc::new(MetavoxelNode::with_children(children)));

  let bytes = encode(&data, MetavoxelLod::FULL).into_bytes();
  let decoded = decode(&registry, &bytes, MetavoxelLod::FULL).unwrap();

  let root = decoded.root("spanners").unwrap();
  assert!(root.is_leaf());
  assert_eq!(root.value().as_object_set().map(|set| set.len()), Some(8));
}

// =========================================================================
// Deltas
// =========================================================================

/// A delta against identical data is never larger than the snapshot.
#[test]
fn test_delta_economy() {
  let registry = AttributeRegistry::new();
  let mut data = MetavoxelData::new(SIZE);
  data.set_root(color_tree(&registry));

  let full = encode(&data, MetavoxelLod::FULL);
  let mut delta = BitWriter::new();
  data.write_delta(&data.clone(), MetavoxelLod::FULL, MetavoxelLod::FULL, &mut delta);
  assert!(delta.bit_len() < full.bit_len());

  let empty = MetavoxelData::new(SIZE);
  let mut empty_delta = BitWriter::new();
  empty.write_delta(&empty, MetavoxelLod::FULL, MetavoxelLod::FULL, &mut empty_delta);
  assert!(empty_delta.bit_len() <= encode(&empty, MetavoxelLod::FULL).bit_len());
}

/// Changed, added and removed roots all reach the receiver.
#[test]
fn test_delta_round_trip() {
  let registry = AttributeRegistry::new();
  let lod = MetavoxelLod::FULL;

  let mut reference = MetavoxelData::new(SIZE);
  reference.set_root(color_leaf(&registry, PackedColor::rgb(255, 0, 0)));
  reference.set_root(Arc::new(MetavoxelNode::leaf(
    registry.normal_attribute(),
    Value::Color(PackedColor::rgb(127, 0, 0)),
  )));
  let received = decode(&registry, &encode(&reference, lod).into_bytes(), lod).unwrap();

  let mut current = reference.clone();
  current.set_root(color_tree(&registry));
  current.remove_root("normal");
  current.set_root(spanner_root(&registry, &[Spanner::new(Vec3::ZERO, Vec3::ONE)]));

  let mut out = BitWriter::new();
  current.write_delta(&reference, lod, lod, &mut out);
  let bytes = out.into_bytes();
  let updated = MetavoxelData::read_delta(
    &received,
    &registry,
    lod,
    lod,
    &mut BitReader::with_catalog(&bytes, registry.catalog()),
  )
  .unwrap();

  assert!(updated.root("color").unwrap().same_subtree(current.root("color").unwrap()));
  assert!(updated.root("normal").is_none());
  assert_eq!(
    updated
      .value_of(registry.spanners_attribute())
      .as_object_set()
      .map(|set| set.len()),
    Some(1)
  );
}

/// Full tree of `depth` levels with distinct leaf colors.
fn deep_color_tree(registry: &AttributeRegistry, depth: u32, seed: u32) -> Arc<MetavoxelNode> {
  if depth == 0 {
    let shade = (seed * 37 % 251) as u8;
    return color_leaf(registry, PackedColor::rgb(shade, 255 - shade, seed as u8));
  }
  let children: [Arc<MetavoxelNode>; MERGE_COUNT] =
    std::array::from_fn(|octant| deep_color_tree(registry, depth - 1, seed * 8 + octant as u32));
  Arc::new(MetavoxelNode::with_children(children))
}

/// Every node the sender subdivides at the state's LOD is subdivided on the
/// receiver, and leaves carry the sender's values.
fn assert_refined(sent: &MetavoxelNode, received: &MetavoxelNode, state: &StreamState<'_>) {
  match sent.children() {
    Some(children) if state.should_subdivide() => {
      let received_children = received
        .children()
        .unwrap_or_else(|| panic!("node at {:?} size {} was not refined", state.minimum, state.size));
      for (octant, (child, received_child)) in children.iter().zip(received_children.iter()).enumerate() {
        assert_refined(child, received_child, &state.child(octant));
      }
    }
    Some(_) => {}
    None => assert_eq!(received.value().as_color(), sent.value().as_color()),
  }
}

/// After the viewer moves to the far side of the volume, a delta against
/// the old LOD brings the receiver to the detail of the new LOD.
#[test]
fn test_delta_after_viewer_moves_refines_receiver() {
  let registry = AttributeRegistry::new();
  let mut data = MetavoxelData::new(8.0);
  data.set_root(deep_color_tree(&registry, 3, 1));

  let reference_lod = MetavoxelLod::new(Vec3::new(0.0, 0.0, -8.0), 0.5);
  let lod = MetavoxelLod::new(Vec3::new(0.0, 0.0, 8.5), 0.5);

  let received = decode(&registry, &encode(&data, reference_lod).into_bytes(), reference_lod).unwrap();

  let mut out = BitWriter::new();
  data.write_delta(&data, lod, reference_lod, &mut out);
  let bytes = out.into_bytes();
  let updated = MetavoxelData::read_delta(
    &received,
    &registry,
    lod,
    reference_lod,
    &mut BitReader::with_catalog(&bytes, registry.catalog()),
  )
  .unwrap();

  let color = registry.color_attribute();
  let sent = data.root("color").unwrap();
  let before = received.root("color").unwrap();
  let after = updated.root("color").unwrap();
  assert!(after.node_count() > before.node_count());

  // Detail sent at the old LOD is kept.
  assert_refined(sent, after, &StreamState::new(color, data.minimum(), 8.0, reference_lod));
  assert_refined(sent, after, &StreamState::new(color, data.minimum(), 8.0, lod));
}

/// A resized volume is sent as if the receiver had nothing.
#[test]
fn test_delta_after_resize() {
  let registry = AttributeRegistry::new();
  let mut reference = MetavoxelData::new(SIZE);
  reference.set_root(color_leaf(&registry, PackedColor::rgb(0, 255, 0)));

  let mut current = MetavoxelData::new(SIZE * 2.0);
  current.set_root(color_leaf(&registry, PackedColor::rgb(0, 255, 0)));

  let mut out = BitWriter::new();
  current.write_delta(&reference, MetavoxelLod::FULL, MetavoxelLod::FULL, &mut out);
  let bytes = out.into_bytes();
  let updated = MetavoxelData::read_delta(
    &reference,
    &registry,
    MetavoxelLod::FULL,
    MetavoxelLod::FULL,
    &mut BitReader::with_catalog(&bytes, registry.catalog()),
  )
  .unwrap();

  assert_eq!(updated.size(), SIZE * 2.0);
  assert!(updated.root("color").unwrap().same_subtree(current.root("color").unwrap()));
}

#[test]
fn test_delta_without_reference_root_is_malformed() {
  let registry = AttributeRegistry::new();
  let mut out = BitWriter::new();
  out.write_f32(SIZE);
  out.write_bool(true);
  out.write_string("color");
  out.write_bits(EntryMode::Delta as u64, 2);
  let bytes = out.into_bytes();

  let result = MetavoxelData::read_delta(
    &MetavoxelData::new(SIZE),
    &registry,
    MetavoxelLod::FULL,
    MetavoxelLod::FULL,
    &mut BitReader::new(&bytes),
  );
  assert!(matches!(result, Err(MetavoxelError::MalformedEncoding(_))));
}

#[test]
fn test_truncated_stream() {
  let registry = AttributeRegistry::new();
  let mut data = MetavoxelData::new(SIZE);
  data.set_root(color_tree(&registry));
  let bytes = encode(&data, MetavoxelLod::FULL).into_bytes();

  let result = decode(&registry, &bytes[..bytes.len() / 2], MetavoxelLod::FULL);
  assert!(matches!(result, Err(MetavoxelError::UnexpectedEnd { .. })));
}

// =========================================================================
// Collapse
// =========================================================================

#[test]
fn test_collapse_every_root() {
  let registry = AttributeRegistry::new();
  let uniform: [Arc<MetavoxelNode>; MERGE_COUNT] =
    std::array::from_fn(|_| color_leaf(&registry, PackedColor::rgb(9, 9, 9)));

  let mut data = MetavoxelData::new(SIZE);
  data.set_root(Arc::new(MetavoxelNode::with_children(uniform)));
  data.set_root(spanner_root(&registry, &[]));
  data.collapse();

  let color = data.root("color").unwrap();
  assert!(color.is_leaf());
  assert_eq!(color.value().as_color(), Some(PackedColor::rgb(9, 9, 9)));
  assert_eq!(data.roots().count(), 2);
}
