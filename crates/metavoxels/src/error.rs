//! Error type shared by every decode path in the crate.

use thiserror::Error;

/// Recoverable failures while decoding or inserting attribute data.
///
/// Programming errors (wrong value variant for a descriptor, merging a
/// number of children other than eight) are not represented here; they
/// panic at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetavoxelError {
  /// The encoded bytes contradict their own framing.
  #[error("malformed encoding: {0}")]
  MalformedEncoding(String),

  /// A read ran past the end of the bitstream.
  #[error("unexpected end of stream at bit {position} ({requested} more bits requested)")]
  UnexpectedEnd { position: usize, requested: usize },

  /// An object's declared type is not admissible for the attribute.
  #[error("attribute `{attribute}` only admits `{constraint}` objects, got `{object_type}`")]
  TypeConstraintViolation {
    attribute: String,
    constraint: &'static str,
    object_type: &'static str,
  },

  /// The stream named an object type the catalog does not know.
  #[error("unknown object type `{0}`")]
  UnknownObjectType(String),

  /// The stream named an attribute the registry does not know.
  #[error("unknown attribute `{0}`")]
  UnknownAttribute(String),
}

pub type Result<T> = std::result::Result<T, MetavoxelError>;
