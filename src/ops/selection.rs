// ============================================================================
// SELECTION EDITS - undoable changes to the selection mask
// ============================================================================
//
// The mask is drawn as an overlay, so none of these touch the merged-image cache.

use crate::components::history::SelectionCommand;
use crate::geometry::IntRect;
use crate::image_stack::ImageStack;
use crate::raster::Raster;
use crate::selection::SelectionLayer;
use crate::signals::StackEvent;

impl ImageStack {
    fn edit_selection<F>(&mut self, description: &str, edit: F) -> bool
    where
        F: FnOnce(&mut SelectionLayer),
    {
        let mut command = SelectionCommand::new(description, &self.canvas);
        edit(&mut self.canvas.selection);
        command.set_after(&self.canvas);
        if command.is_noop() {
            return false;
        }
        self.history.push_applied(Box::new(command));
        self.canvas.emit(StackEvent::SelectionChanged);
        true
    }

    /// Replace the selection with `mask`, whose top-left sits at the image origin.
    pub fn set_selection(&mut self, mask: &Raster) -> bool {
        self.edit_selection("Set Selection", |selection| selection.set_mask(mask))
    }

    pub fn select_rect(&mut self, rect: IntRect) -> bool {
        self.edit_selection("Select Rectangle", |selection| selection.select_rect(rect))
    }

    pub fn select_all(&mut self) -> bool {
        self.edit_selection("Select All", SelectionLayer::select_all)
    }

    pub fn clear_selection(&mut self) -> bool {
        self.edit_selection("Clear Selection", SelectionLayer::clear)
    }

    pub fn invert_selection(&mut self) -> bool {
        self.edit_selection("Invert Selection", SelectionLayer::invert)
    }
}
