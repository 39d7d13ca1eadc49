//! Editing operations on [`crate::image_stack::ImageStack`], grouped by concern.

pub mod canvas_ops;
pub mod clipboard;
pub mod selection;
pub mod transform;
