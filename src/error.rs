//! Error types for the layered image model.
//!
//! Precondition violations (bad indices, re-parenting, non-invertible transforms) are
//! reported as values so the calling layer decides whether they are fatal. Requests that
//! simply have nothing to do (merging the bottom layer, pasting an empty buffer) are not
//! errors and never show up here.

use thiserror::Error;

use crate::layer::LayerId;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum IntraPaintError {
    /// No layer with this id exists in the tree.
    #[error("layer {0} not found")]
    LayerNotFound(LayerId),

    /// The layer is already attached to a parent stack.
    #[error("layer {0} already has a parent")]
    AlreadyParented(LayerId),

    /// An insertion or lookup index fell outside the child sequence.
    #[error("index {index} out of range for {len} children")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of children in the target stack.
        len: usize,
    },

    /// The layer is an image layer where a layer stack was required.
    #[error("layer {0} is not a layer stack")]
    NotAStack(LayerId),

    /// The layer is a layer stack where pixel content was required.
    #[error("layer {0} is not an image layer")]
    NotAnImage(LayerId),

    /// The root layer stack cannot be detached or reparented.
    #[error("the root layer stack cannot be removed or moved")]
    RootLayer,

    /// A transform with a zero or non-finite determinant was used for coordinate mapping.
    #[error("layer transform is not invertible")]
    NonInvertibleTransform,

    /// Zero-area or oversized image dimensions.
    #[error("invalid image size {width}x{height}")]
    InvalidSize {
        /// Requested width.
        width: i32,
        /// Requested height.
        height: i32,
    },

    /// Decoding or encoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file was not valid JSON for [`crate::config::EditorConfig`].
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IntraPaintError>;
