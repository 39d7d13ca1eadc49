//! IntraPaint image model: a tree of layers with per-layer transforms, a selection mask,
//! a clamped generation area and a single undo history covering all of it.
//!
//! [`ImageStack`] is the entry point. Every mutating operation on it records exactly one
//! undoable action (or none when nothing changed) and reports what happened through
//! [`signals::Signals`].

pub mod canvas;
pub mod cli;
pub mod components;
pub mod config;
pub mod error;
pub mod event_history;
pub mod geometry;
pub mod image_stack;
pub mod io;
pub mod layer;
pub mod layer_tree;
pub mod logger;
pub mod ops;
pub mod raster;
pub mod selection;
pub mod signals;

pub use config::EditorConfig;
pub use error::{IntraPaintError, Result};
pub use event_history::{EventHistory, PixmapEvent};
pub use geometry::{IntPoint, IntRect, IntSize};
pub use image_stack::ImageStack;
pub use layer::{Layer, LayerId, LayerValue};
pub use raster::{CompositionMode, Raster};
pub use signals::{EventKind, StackEvent};
