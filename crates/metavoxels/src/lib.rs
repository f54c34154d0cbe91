//! metavoxels - Attribute codec and LOD merge engine for streamed octrees
//!
//! This crate provides the value layer of octree-shaped "metavoxel"
//! volumes that a server streams to many clients: a registry of typed
//! attributes, their bit-level codecs, and the eight-way merge that
//! collapses children into parents as detail falls off with distance.
//!
//! # Features
//!
//! - **PropertyFlags**: self-describing variable-length encoding of sparse
//!   enumerated flag sets
//! - **Attribute Registry**: named descriptors for scalar, color, normal,
//!   shared object and spanner attributes
//! - **LOD Merge**: per-attribute merge policies with an "all children
//!   equal" signal, and parallel collapse of whole trees
//! - **Streaming**: root, delta and subdivision encodings of trees at a
//!   viewer-dependent level of detail
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use metavoxels::{AttributeRegistry, BitReader, BitWriter, MetavoxelData, MetavoxelLod, MetavoxelNode, PackedColor, Value};
//!
//! let registry = AttributeRegistry::new();
//! let color = registry.color_attribute().clone();
//!
//! let mut data = MetavoxelData::new(16.0);
//! data.set_root(Arc::new(MetavoxelNode::leaf(&color, Value::Color(PackedColor::rgb(255, 0, 0)))));
//!
//! let mut out = BitWriter::new();
//! data.write(MetavoxelLod::FULL, &mut out);
//!
//! let bytes = out.into_bytes();
//! let mut input = BitReader::with_catalog(&bytes, registry.catalog());
//! let decoded = MetavoxelData::read(&registry, MetavoxelLod::FULL, &mut input)?;
//! ```

pub mod attribute;
pub mod bitstream;
pub mod error;
pub mod merge;
pub mod node;
pub mod property_flags;
pub mod registry;
pub mod shared_object;
pub mod stream;

pub use attribute::{
  pack_normal, same_attribute, unpack_normal, Attribute, AttributeInfo, AttributePointer, AttributeValue,
  ColorAttribute, FloatAttribute, IntAttribute, OwnedAttributeValue, PackedColor, PackedNormalAttribute,
  SharedObjectAttribute, SharedObjectSetAttribute, SimpleInlineAttribute, SpannerSetAttribute, Value,
  MERGE_COUNT,
};
pub use bitstream::{BitReader, BitWriter};
pub use error::{MetavoxelError, Result};
pub use merge::{collapse, merge_nodes, merge_values, MergeOutcome};
pub use node::MetavoxelNode;
pub use property_flags::{PropertyFlag, PropertyFlags};
pub use registry::{AttributeRegistry, RegistryConfig};
pub use shared_object::{
  DefaultGuide, ObjectCatalog, ObjectType, SharedObject, SharedObjectPointer, SharedObjectSet, Spanner,
};
pub use stream::{EntryMode, MetavoxelData, MetavoxelLod, StreamState};
