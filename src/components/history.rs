use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

use kurbo::Affine;

use crate::canvas::{CanvasState, StackSnapshot};
use crate::error::Result;
use crate::geometry::IntRect;
use crate::layer::{LayerId, LayerProperty, LayerValue};
use crate::layer_tree::DetachedLayer;
use crate::raster::Raster;
use crate::selection::SelectionLayer;

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// An undoable edit of some target state. `redo` performs the edit, `undo` reverts it.
pub trait Command<T>: Send {
    fn redo(&mut self, target: &mut T);
    fn undo(&mut self, target: &mut T);
    fn description(&self) -> String;
    /// Kind of edit, compared by call sites that merge consecutive entries.
    fn type_tag(&self) -> &'static str;
    fn memory_size(&self) -> usize;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with memory limits
// ============================================================================

/// A recorded command with the size it was accounted at when pushed. Commands that
/// park detached layers report different sizes depending on which side of the
/// undo they are on, so the pushed size is what gets released again.
struct HistoryEntry<T> {
    command: Box<dyn Command<T>>,
    bytes: usize,
}

/// Undo/redo history manager with memory limits.
pub struct HistoryManager<T> {
    undo_stack: VecDeque<HistoryEntry<T>>,
    redo_stack: VecDeque<HistoryEntry<T>>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl<T> Default for HistoryManager<T> {
    fn default() -> Self {
        Self::new(50)
    }
}

impl<T> fmt::Debug for HistoryManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryManager")
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("max_history_size", &self.max_history_size)
            .field("total_memory", &self.total_memory)
            .finish()
    }
}

impl<T> HistoryManager<T> {
    pub fn new(max_history_size: usize) -> Self {
        Self::with_memory_limit(max_history_size, Some(100 * 1024 * 1024))
    }

    pub fn with_memory_limit(max_history_size: usize, max_memory_bytes: Option<usize>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size,
            max_memory_bytes,
            total_memory: 0,
        }
    }

    /// Perform `command` against `target`, then record it.
    pub fn commit_action(&mut self, mut command: Box<dyn Command<T>>, target: &mut T) {
        command.redo(target);
        self.push_applied(command);
    }

    /// Record a command whose effect has already been applied.
    pub fn push_applied(&mut self, command: Box<dyn Command<T>>) {
        // A new action invalidates everything that was undone
        for entry in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(entry.bytes);
        }

        let bytes = command.memory_size();
        tracing::trace!(action = %command.description(), tag = command.type_tag(), bytes, "history push");
        self.total_memory += bytes;
        self.undo_stack.push_back(HistoryEntry { command, bytes });

        self.prune();
    }

    pub fn last_action(&self) -> Option<&(dyn Command<T> + 'static)> {
        self.undo_stack.back().map(|entry| entry.command.as_ref())
    }

    /// Most recent entry, for call sites that fold a new edit into it.
    pub fn last_action_mut(&mut self) -> Option<&mut (dyn Command<T> + 'static)> {
        self.undo_stack.back_mut().map(|entry| entry.command.as_mut())
    }

    pub fn undo(&mut self, target: &mut T) -> Option<String> {
        let mut entry = self.undo_stack.pop_back()?;
        let description = entry.command.description();
        entry.command.undo(target);
        self.redo_stack.push_back(entry);
        tracing::debug!(action = %description, "undo");
        Some(description)
    }

    pub fn redo(&mut self, target: &mut T) -> Option<String> {
        let mut entry = self.redo_stack.pop_back()?;
        let description = entry.command.description();
        entry.command.redo(target);
        self.undo_stack.push_back(entry);
        tracing::debug!(action = %description, "redo");
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|entry| entry.command.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|entry| entry.command.description())
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack
            .iter()
            .rev()
            .map(|entry| entry.command.description())
            .collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.bytes);
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    tracing::debug!(action = %removed.command.description(), "history entry dropped for memory");
                    self.total_memory = self.total_memory.saturating_sub(removed.bytes);
                }
            }
        }
    }

    /// Drop every entry. Not itself undoable.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Undo `count` steps, stopping early when the history runs out.
    pub fn undo_to(&mut self, count: usize, target: &mut T) {
        for _ in 0..count {
            if self.undo(target).is_none() {
                break;
            }
        }
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

// ============================================================================
// LAYER OPERATION COMMAND - add/remove/move/merge and property edits
// ============================================================================

pub const TAG_LAYER_ADD: &str = "layer.add";
pub const TAG_LAYER_REMOVE: &str = "layer.remove";
pub const TAG_LAYER_MOVE: &str = "layer.move";
pub const TAG_LAYER_MERGE: &str = "layer.merge";
pub const TAG_LAYER_PROPERTY: &str = "layer.property";
pub const TAG_LAYER_CONTENT: &str = "layer.content";
pub const TAG_SNAPSHOT: &str = "snapshot";
pub const TAG_GENERATION_AREA: &str = "generation_area";
pub const TAG_SELECTION: &str = "selection";

/// A tree position: parent stack plus child index.
pub type Slot = (LayerId, usize);

/// Types of layer operations that can be undone/redone.
#[derive(Debug)]
pub enum LayerOperation {
    /// A subtree was attached. `layer` holds it while it is out of the tree.
    Add {
        id: LayerId,
        name: String,
        slot: Slot,
        layer: Option<DetachedLayer>,
        active_before: Option<LayerId>,
        active_after: Option<LayerId>,
    },
    /// A subtree was detached.
    Remove {
        id: LayerId,
        name: String,
        slot: Slot,
        layer: Option<DetachedLayer>,
        active_before: Option<LayerId>,
        active_after: Option<LayerId>,
    },
    /// `to` is an insertion point computed with the layer already taken out.
    Move { id: LayerId, from: Slot, to: Slot },
    /// `top` was painted into `base` and removed.
    Merge {
        top: LayerId,
        base: LayerId,
        top_slot: Slot,
        top_layer: Option<DetachedLayer>,
        base_before: (Raster, Affine),
        base_after: (Raster, Affine),
        active_before: Option<LayerId>,
        active_after: Option<LayerId>,
    },
    Property {
        id: LayerId,
        before: LayerValue,
        after: LayerValue,
    },
}

/// Command for layer structure operations
#[derive(Debug)]
pub struct LayerOpCommand {
    operation: LayerOperation,
}

impl LayerOpCommand {
    pub fn new(operation: LayerOperation) -> Self {
        Self { operation }
    }

    pub fn operation(&self) -> &LayerOperation {
        &self.operation
    }

    /// Fold a follow-up edit of the same property on the same layer into this entry.
    /// Returns `false` when this entry records something else.
    pub fn coalesce_property(&mut self, layer: LayerId, value: &LayerValue) -> bool {
        match &mut self.operation {
            LayerOperation::Property { id, after, .. }
                if *id == layer && after.property() == value.property() =>
            {
                *after = value.clone();
                true
            }
            _ => false,
        }
    }
}

fn attach(canvas: &mut CanvasState, stored: &mut Option<DetachedLayer>, slot: Slot) {
    let Some(layer) = stored.take() else {
        tracing::error!(?slot, "no detached layer to attach");
        return;
    };
    if let Err(err) = canvas.attach_layer(layer, slot.0, slot.1) {
        tracing::error!(%err, "failed to re-attach layer");
    }
}

fn detach(canvas: &mut CanvasState, stored: &mut Option<DetachedLayer>, id: LayerId) {
    match canvas.detach_layer(id) {
        Ok((layer, _, _)) => *stored = Some(layer),
        Err(err) => tracing::error!(%err, "failed to detach layer"),
    }
}

fn relocate(canvas: &mut CanvasState, id: LayerId, slot: Slot) {
    if let Err(err) = canvas.relocate_layer(id, slot.0, slot.1) {
        tracing::error!(%err, "failed to move layer");
    }
}

fn apply_value(canvas: &mut CanvasState, id: LayerId, value: &LayerValue) {
    match canvas.tree.layer_mut(id) {
        Ok(layer) => value.apply(layer),
        Err(err) => {
            tracing::error!(%err, "property change on missing layer");
            return;
        }
    }
    canvas.notify_layer_changed(id, value.property());
}

/// Swap in stored pixels and transform for an image layer.
fn restore_image(canvas: &mut CanvasState, id: LayerId, raster: &Raster, transform: Affine) {
    let transform_changed = match canvas.tree.layer_mut(id) {
        Ok(layer) => {
            if let Some(content) = layer.raster_mut() {
                *content = raster.clone();
            }
            let changed = layer.transform != transform;
            layer.transform = transform;
            changed
        }
        Err(err) => {
            tracing::error!(%err, "content change on missing layer");
            return;
        }
    };
    canvas.notify_layer_changed(id, LayerProperty::Content);
    if transform_changed {
        canvas.notify_layer_changed(id, LayerProperty::Transform);
    }
}

impl Command<CanvasState> for LayerOpCommand {
    fn redo(&mut self, canvas: &mut CanvasState) {
        match &mut self.operation {
            LayerOperation::Add { slot, layer, active_after, .. } => {
                attach(canvas, layer, *slot);
                canvas.set_active(*active_after);
            }
            LayerOperation::Remove { id, layer, active_after, .. } => {
                canvas.set_active(*active_after);
                detach(canvas, layer, *id);
            }
            LayerOperation::Move { id, to, .. } => relocate(canvas, *id, *to),
            LayerOperation::Merge {
                top,
                base,
                top_layer,
                base_after,
                active_after,
                ..
            } => {
                restore_image(canvas, *base, &base_after.0, base_after.1);
                canvas.set_active(*active_after);
                detach(canvas, top_layer, *top);
            }
            LayerOperation::Property { id, after, .. } => apply_value(canvas, *id, after),
        }
    }

    fn undo(&mut self, canvas: &mut CanvasState) {
        match &mut self.operation {
            LayerOperation::Add { id, layer, active_before, .. } => {
                canvas.set_active(*active_before);
                detach(canvas, layer, *id);
            }
            LayerOperation::Remove { slot, layer, active_before, .. } => {
                attach(canvas, layer, *slot);
                canvas.set_active(*active_before);
            }
            LayerOperation::Move { id, from, .. } => relocate(canvas, *id, *from),
            LayerOperation::Merge {
                base,
                top_slot,
                top_layer,
                base_before,
                active_before,
                ..
            } => {
                restore_image(canvas, *base, &base_before.0, base_before.1);
                attach(canvas, top_layer, *top_slot);
                canvas.set_active(*active_before);
            }
            LayerOperation::Property { id, before, .. } => apply_value(canvas, *id, before),
        }
    }

    fn description(&self) -> String {
        match &self.operation {
            LayerOperation::Add { name, .. } => format!("Add Layer: {}", name),
            LayerOperation::Remove { name, .. } => format!("Delete Layer: {}", name),
            LayerOperation::Move { id, from, to } => {
                format!("Move Layer {}: {} → {}", id, from.1, to.1)
            }
            LayerOperation::Merge { top, base, .. } => format!("Merge Down: {} → {}", top, base),
            LayerOperation::Property { id, after, .. } => match after {
                LayerValue::Name(name) => format!("Rename Layer {}: {}", id, name),
                LayerValue::Visible(true) => format!("Show Layer {}", id),
                LayerValue::Visible(false) => format!("Hide Layer {}", id),
                LayerValue::Saved(saved) => format!("Layer {} Saved: {}", id, saved),
                LayerValue::Opacity(opacity) => {
                    format!("Layer {} Opacity: {:.0}%", id, opacity * 100.0)
                }
                LayerValue::CompositionMode(mode) => {
                    format!("Layer {} Mode: {}", id, mode.name())
                }
                LayerValue::Transform(_) => format!("Transform Layer {}", id),
            },
        }
    }

    fn type_tag(&self) -> &'static str {
        match &self.operation {
            LayerOperation::Add { .. } => TAG_LAYER_ADD,
            LayerOperation::Remove { .. } => TAG_LAYER_REMOVE,
            LayerOperation::Move { .. } => TAG_LAYER_MOVE,
            LayerOperation::Merge { .. } => TAG_LAYER_MERGE,
            LayerOperation::Property { .. } => TAG_LAYER_PROPERTY,
        }
    }

    fn memory_size(&self) -> usize {
        match &self.operation {
            LayerOperation::Add { layer, name, .. } | LayerOperation::Remove { layer, name, .. } => {
                layer.as_ref().map_or(0, DetachedLayer::memory_bytes) + name.len()
            }
            LayerOperation::Merge {
                top_layer,
                base_before,
                base_after,
                ..
            } => {
                top_layer.as_ref().map_or(0, DetachedLayer::memory_bytes)
                    + base_before.0.memory_bytes()
                    + base_after.0.memory_bytes()
            }
            _ => std::mem::size_of::<LayerOperation>(),
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// SNAPSHOT COMMAND - whole-document undo for set_image, resize and scale
// ============================================================================

/// Stores a complete document snapshot for undo/redo of destructive operations.
#[derive(Debug)]
pub struct SnapshotCommand {
    description: String,
    before: StackSnapshot,
    after: Option<StackSnapshot>,
}

impl SnapshotCommand {
    /// Create a snapshot command. Call BEFORE performing the operation.
    /// After the operation, call `set_after()`.
    pub fn new(description: impl Into<String>, state: &CanvasState) -> Self {
        Self {
            description: description.into(),
            before: state.snapshot(),
            after: None,
        }
    }

    pub fn set_after(&mut self, state: &CanvasState) {
        self.after = Some(state.snapshot());
    }
}

impl Command<CanvasState> for SnapshotCommand {
    fn redo(&mut self, canvas: &mut CanvasState) {
        if let Some(after) = &self.after {
            canvas.restore_snapshot(after);
        }
    }

    fn undo(&mut self, canvas: &mut CanvasState) {
        canvas.restore_snapshot(&self.before);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn type_tag(&self) -> &'static str {
        TAG_SNAPSHOT
    }

    fn memory_size(&self) -> usize {
        self.before.memory_bytes() + self.after.as_ref().map_or(0, StackSnapshot::memory_bytes)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// SINGLE-LAYER SNAPSHOT - undo for edits that touch one layer's pixels
// ============================================================================

/// Captures one image layer's pixels and transform before and after an operation.
#[derive(Debug)]
pub struct SingleLayerSnapshotCommand {
    description: String,
    layer_id: LayerId,
    before: (Raster, Affine),
    after: Option<(Raster, Affine)>,
}

impl SingleLayerSnapshotCommand {
    /// Create before performing the operation. Call `set_after()` when done.
    pub fn new(description: impl Into<String>, state: &CanvasState, layer_id: LayerId) -> Result<Self> {
        let layer = state.tree.layer(layer_id)?;
        let raster = layer.raster().cloned().unwrap_or_default();
        Ok(Self {
            description: description.into(),
            layer_id,
            before: (raster, layer.transform),
            after: None,
        })
    }

    pub fn set_after(&mut self, state: &CanvasState) {
        if let Some(layer) = state.tree.get_layer_by_id(self.layer_id) {
            let raster = layer.raster().cloned().unwrap_or_default();
            self.after = Some((raster, layer.transform));
        }
    }

    /// True when the operation left the layer untouched.
    pub fn is_noop(&self) -> bool {
        self.after.as_ref().is_none_or(|after| *after == self.before)
    }
}

impl Command<CanvasState> for SingleLayerSnapshotCommand {
    fn redo(&mut self, canvas: &mut CanvasState) {
        if let Some((raster, transform)) = &self.after {
            restore_image(canvas, self.layer_id, raster, *transform);
        }
    }

    fn undo(&mut self, canvas: &mut CanvasState) {
        let (raster, transform) = &self.before;
        restore_image(canvas, self.layer_id, raster, *transform);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn type_tag(&self) -> &'static str {
        TAG_LAYER_CONTENT
    }

    fn memory_size(&self) -> usize {
        self.before.0.memory_bytes() + self.after.as_ref().map_or(0, |(r, _)| r.memory_bytes())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// GENERATION AREA COMMAND - coalescable region change
// ============================================================================

#[derive(Debug)]
pub struct GenerationAreaCommand {
    before: IntRect,
    after: IntRect,
}

impl GenerationAreaCommand {
    pub fn new(before: IntRect, after: IntRect) -> Self {
        Self { before, after }
    }

    pub fn before(&self) -> IntRect {
        self.before
    }

    /// Replace the target area, keeping the original starting area.
    pub fn coalesce(&mut self, after: IntRect) {
        self.after = after;
    }
}

impl Command<CanvasState> for GenerationAreaCommand {
    fn redo(&mut self, canvas: &mut CanvasState) {
        let area = canvas.fitted_generation_area(self.after);
        canvas.set_generation_area_value(area);
    }

    fn undo(&mut self, canvas: &mut CanvasState) {
        let area = canvas.fitted_generation_area(self.before);
        canvas.set_generation_area_value(area);
    }

    fn description(&self) -> String {
        format!(
            "Generation Area: {}x{} at ({}, {})",
            self.after.width, self.after.height, self.after.x, self.after.y
        )
    }

    fn type_tag(&self) -> &'static str {
        TAG_GENERATION_AREA
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// SELECTION COMMAND - mask edits
// ============================================================================

#[derive(Debug)]
pub struct SelectionCommand {
    description: String,
    before: SelectionLayer,
    after: Option<SelectionLayer>,
}

impl SelectionCommand {
    pub fn new(description: impl Into<String>, state: &CanvasState) -> Self {
        Self {
            description: description.into(),
            before: state.selection.clone(),
            after: None,
        }
    }

    pub fn set_after(&mut self, state: &CanvasState) {
        self.after = Some(state.selection.clone());
    }

    pub fn is_noop(&self) -> bool {
        self.after.as_ref().is_none_or(|after| *after == self.before)
    }

    fn restore(canvas: &mut CanvasState, selection: &SelectionLayer) {
        canvas.selection = selection.clone();
        if let Err(err) = canvas.selection.update_generation_area(canvas.generation_area) {
            tracing::error!(%err, "selection generation area not updated");
        }
        canvas.emit(crate::signals::StackEvent::SelectionChanged);
    }
}

impl Command<CanvasState> for SelectionCommand {
    fn redo(&mut self, canvas: &mut CanvasState) {
        if let Some(after) = &self.after {
            Self::restore(canvas, after);
        }
    }

    fn undo(&mut self, canvas: &mut CanvasState) {
        Self::restore(canvas, &self.before);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn type_tag(&self) -> &'static str {
        TAG_SELECTION
    }

    fn memory_size(&self) -> usize {
        self.before.raster().memory_bytes()
            + self.after.as_ref().map_or(0, |s| s.raster().memory_bytes())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Add(i32);

    impl Command<Vec<i32>> for Add {
        fn redo(&mut self, target: &mut Vec<i32>) {
            target.push(self.0);
        }
        fn undo(&mut self, target: &mut Vec<i32>) {
            target.pop();
        }
        fn description(&self) -> String {
            format!("add {}", self.0)
        }
        fn type_tag(&self) -> &'static str {
            "add"
        }
        fn memory_size(&self) -> usize {
            100
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    /// Holds a large payload only while applied, like a removed layer parked in its entry.
    struct Park {
        parked: bool,
    }

    impl Command<Vec<i32>> for Park {
        fn redo(&mut self, _target: &mut Vec<i32>) {
            self.parked = true;
        }
        fn undo(&mut self, _target: &mut Vec<i32>) {
            self.parked = false;
        }
        fn description(&self) -> String {
            "park".to_string()
        }
        fn type_tag(&self) -> &'static str {
            "park"
        }
        fn memory_size(&self) -> usize {
            if self.parked { 1000 } else { 10 }
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn dropped_redo_entries_release_what_they_were_charged() {
        let mut history = HistoryManager::new(10);
        let mut values = Vec::new();
        for _ in 0..5 {
            history.commit_action(Box::new(Park { parked: false }), &mut values);
            history.undo(&mut values);
            history.commit_action(Box::new(Add(1)), &mut values);
            history.undo(&mut values);
        }
        assert_eq!(history.undo_count(), 0);
        assert_eq!(history.redo_count(), 1);
        assert_eq!(history.memory_usage(), 100);
    }

    #[test]
    fn commit_runs_redo_and_undo_reverts() {
        let mut history = HistoryManager::new(10);
        let mut values = Vec::new();
        history.commit_action(Box::new(Add(1)), &mut values);
        history.commit_action(Box::new(Add(2)), &mut values);
        assert_eq!(values, vec![1, 2]);

        assert_eq!(history.undo(&mut values).as_deref(), Some("add 2"));
        assert_eq!(values, vec![1]);
        assert_eq!(history.redo(&mut values).as_deref(), Some("add 2"));
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn empty_history_is_a_noop() {
        let mut history: HistoryManager<Vec<i32>> = HistoryManager::default();
        let mut values = vec![7];
        assert!(history.last_action().is_none());
        assert!(history.last_action_mut().is_none());
        assert_eq!(history.undo(&mut values), None);
        assert_eq!(history.redo(&mut values), None);
        assert_eq!(values, vec![7]);
    }

    #[test]
    fn new_commit_discards_redo_branch() {
        let mut history = HistoryManager::new(10);
        let mut values = Vec::new();
        history.commit_action(Box::new(Add(1)), &mut values);
        history.undo(&mut values);
        assert!(history.can_redo());
        history.commit_action(Box::new(Add(3)), &mut values);
        assert!(!history.can_redo());
        assert_eq!(history.undo_history(), vec!["add 3".to_string()]);
        assert_eq!(history.memory_usage(), 100);
    }

    #[test]
    fn prunes_oldest_by_count_and_memory() {
        let mut history = HistoryManager::with_memory_limit(3, Some(250));
        let mut values = Vec::new();
        for i in 0..5 {
            history.commit_action(Box::new(Add(i)), &mut values);
        }
        assert_eq!(history.undo_count(), 2);
        assert_eq!(history.undo_history(), vec!["add 4".to_string(), "add 3".to_string()]);
    }

    #[test]
    fn last_action_can_be_downcast_for_merging() {
        let mut history = HistoryManager::new(10);
        let mut values = Vec::new();
        history.commit_action(Box::new(Add(1)), &mut values);
        let last = history.last_action_mut().unwrap();
        assert_eq!(last.type_tag(), "add");
        let add = last.as_any_mut().downcast_mut::<Add>().unwrap();
        add.0 = 9;
        assert_eq!(history.undo_description().as_deref(), Some("add 9"));
    }

    #[test]
    fn undo_to_stops_at_the_bottom() {
        let mut history = HistoryManager::new(10);
        let mut values = Vec::new();
        history.commit_action(Box::new(Add(1)), &mut values);
        history.commit_action(Box::new(Add(2)), &mut values);
        history.undo_to(5, &mut values);
        assert!(values.is_empty());
        assert_eq!(history.redo_count(), 2);
        history.clear();
        assert!(!history.can_redo());
        assert_eq!(history.memory_usage(), 0);
    }
}
