// ============================================================================
// LAYER TREE - arena of layers keyed by id, with weak parent links
// ============================================================================
//
// Stacks own their children through id lists; every node records its parent id.
// Child index 0 is the topmost layer of a stack.

use std::collections::HashMap;

use kurbo::Affine;

use crate::error::{IntraPaintError, Result};
use crate::geometry::{IntPoint, IntRect};
use crate::layer::{Layer, LayerContent, LayerId};
use crate::raster::{CompositionMode, Raster};

#[derive(Clone, Debug)]
struct Node {
    layer: Layer,
    parent: Option<LayerId>,
}

/// A subtree that has been taken out of a tree (or not yet inserted).
///
/// The first entry is the subtree root; every other entry names its parent.
#[derive(Clone, Debug, PartialEq)]
pub struct DetachedLayer {
    layers: Vec<(Layer, Option<LayerId>)>,
}

impl DetachedLayer {
    /// Wrap a single layer. Child ids of a stack are dropped since their layers are
    /// not part of the value.
    pub fn new(mut layer: Layer) -> Self {
        if let Some(children) = layer.children_mut() {
            children.clear();
        }
        Self { layers: vec![(layer, None)] }
    }

    pub fn id(&self) -> LayerId {
        self.layers[0].0.id
    }

    pub fn layer(&self) -> &Layer {
        &self.layers[0].0
    }

    pub fn layer_mut(&mut self) -> &mut Layer {
        &mut self.layers[0].0
    }

    pub fn ids(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.layers.iter().map(|(layer, _)| layer.id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers
            .iter()
            .map(|(layer, _)| layer.raster().map_or(0, Raster::memory_bytes) + layer.name.len())
            .sum()
    }
}

#[derive(Clone, Debug)]
pub struct LayerTree {
    nodes: HashMap<LayerId, Node>,
    root: LayerId,
}

impl LayerTree {
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = Layer::new_stack(root_name);
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, Node { layer: root, parent: None });
        Self { nodes, root: root_id }
    }

    // ---- lookup -------------------------------------------------------------

    pub fn root_id(&self) -> LayerId {
        self.root
    }

    pub fn root(&self) -> &Layer {
        &self.nodes[&self.root].layer
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Recursive lookup through every nested stack.
    pub fn get_layer_by_id(&self, id: LayerId) -> Option<&Layer> {
        self.nodes.get(&id).map(|node| &node.layer)
    }

    pub fn layer(&self, id: LayerId) -> Result<&Layer> {
        self.get_layer_by_id(id).ok_or(IntraPaintError::LayerNotFound(id))
    }

    pub(crate) fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.nodes
            .get_mut(&id)
            .map(|node| &mut node.layer)
            .ok_or(IntraPaintError::LayerNotFound(id))
    }

    pub fn get_layer_by_index(&self, parent: LayerId, index: usize) -> Option<LayerId> {
        self.get_layer_by_id(parent)?.children().get(index).copied()
    }

    pub fn parent_of(&self, id: LayerId) -> Option<LayerId> {
        self.nodes.get(&id)?.parent
    }

    pub fn children(&self, id: LayerId) -> &[LayerId] {
        self.get_layer_by_id(id).map(Layer::children).unwrap_or(&[])
    }

    pub fn count(&self, id: LayerId) -> usize {
        self.children(id).len()
    }

    /// Number of layers below the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_in_parent(&self, id: LayerId) -> Option<usize> {
        let parent = self.parent_of(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    pub fn is_stack(&self, id: LayerId) -> bool {
        self.get_layer_by_id(id).is_some_and(Layer::is_stack)
    }

    /// Ids from `id`'s parent up to the root.
    pub fn parent_chain(&self, id: LayerId) -> Vec<LayerId> {
        let mut chain = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.parent_of(parent);
        }
        chain
    }

    /// Every descendant of `id`, depth-first, top to bottom. Recomputed on each call.
    pub fn recursive_child_layers(&self, id: LayerId) -> Vec<LayerId> {
        let mut out = Vec::new();
        self.collect_descendants(id, &mut out);
        out
    }

    fn collect_descendants(&self, id: LayerId, out: &mut Vec<LayerId>) {
        for &child in self.children(id) {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    /// Every image (non-stack) layer in the tree, top to bottom.
    pub fn image_layers(&self) -> Vec<LayerId> {
        self.recursive_child_layers(self.root)
            .into_iter()
            .filter(|id| !self.is_stack(*id))
            .collect()
    }

    pub fn sibling_names(&self, parent: LayerId) -> Vec<&str> {
        self.children(parent)
            .iter()
            .filter_map(|id| self.get_layer_by_id(*id))
            .map(|layer| layer.name.as_str())
            .collect()
    }

    /// The layer and all of its ancestors are visible.
    pub fn is_effectively_visible(&self, id: LayerId) -> bool {
        let Some(layer) = self.get_layer_by_id(id) else {
            return false;
        };
        layer.visible
            && self
                .parent_chain(id)
                .iter()
                .all(|parent| self.get_layer_by_id(*parent).is_some_and(|p| p.visible))
    }

    // ---- geometry -----------------------------------------------------------

    /// Transform from `id`'s local coordinates into root coordinates.
    pub fn full_transform(&self, id: LayerId) -> Affine {
        let mut transform = self
            .get_layer_by_id(id)
            .map_or(Affine::IDENTITY, |layer| layer.transform);
        for parent in self.parent_chain(id) {
            if let Some(layer) = self.get_layer_by_id(parent) {
                transform = layer.transform * transform;
            }
        }
        transform
    }

    /// Root-space bounds: own transformed bounds for image layers, union of visible
    /// descendants for stacks.
    pub fn full_image_bounds(&self, id: LayerId) -> IntRect {
        let Some(layer) = self.get_layer_by_id(id) else {
            return IntRect::default();
        };
        match &layer.content {
            LayerContent::Image(raster) => raster.bounds().mapped_bbox(&self.full_transform(id)),
            LayerContent::Stack(children) => children
                .iter()
                .filter(|child| self.get_layer_by_id(**child).is_some_and(|c| c.visible))
                .fold(IntRect::default(), |acc, child| {
                    acc.united(&self.full_image_bounds(*child))
                }),
        }
    }

    // ---- structure ----------------------------------------------------------

    /// Attach a detached subtree as child `index` of `parent`.
    pub fn insert_layer(
        &mut self,
        detached: DetachedLayer,
        parent: LayerId,
        index: usize,
    ) -> Result<()> {
        for id in detached.ids() {
            if self.nodes.contains_key(&id) {
                return Err(IntraPaintError::AlreadyParented(id));
            }
        }
        let parent_layer = self.layer(parent)?;
        if !parent_layer.is_stack() {
            return Err(IntraPaintError::NotAStack(parent));
        }
        let len = parent_layer.children().len();
        if index > len {
            return Err(IntraPaintError::IndexOutOfRange { index, len });
        }

        let top_id = detached.id();
        for (layer, sub_parent) in detached.layers {
            let parent_id = sub_parent.unwrap_or(parent);
            self.nodes.insert(layer.id, Node { layer, parent: Some(parent_id) });
        }
        if let Some(children) = self.layer_mut(parent)?.children_mut() {
            children.insert(index, top_id);
        }
        Ok(())
    }

    /// Detach `id` and its subtree. Returns the subtree with its former parent and index.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<(DetachedLayer, LayerId, usize)> {
        if id == self.root {
            return Err(IntraPaintError::RootLayer);
        }
        let parent = self.parent_of(id).ok_or(IntraPaintError::LayerNotFound(id))?;
        let index = self
            .index_in_parent(id)
            .ok_or(IntraPaintError::LayerNotFound(id))?;
        if let Some(children) = self.layer_mut(parent)?.children_mut() {
            children.remove(index);
        }

        let mut ids = vec![id];
        ids.extend(self.recursive_child_layers(id));
        let mut layers = Vec::with_capacity(ids.len());
        for sub_id in ids {
            if let Some(node) = self.nodes.remove(&sub_id) {
                let sub_parent = if sub_id == id { None } else { node.parent };
                layers.push((node.layer, sub_parent));
            }
        }
        Ok((DetachedLayer { layers }, parent, index))
    }

    /// Deep copy of `id`'s subtree with fresh ids throughout.
    pub fn duplicate_subtree(&self, id: LayerId) -> Result<DetachedLayer> {
        let source = self.layer(id)?;
        let mut copy = DetachedLayer::new(source.duplicate_shallow());
        let top = copy.id();
        self.duplicate_children_into(id, top, &mut copy)?;
        Ok(copy)
    }

    fn duplicate_children_into(
        &self,
        source: LayerId,
        copy_parent: LayerId,
        out: &mut DetachedLayer,
    ) -> Result<()> {
        for &child in self.children(source) {
            let dup = self.layer(child)?.duplicate_shallow();
            let dup_id = dup.id;
            out.layers.push((dup, Some(copy_parent)));
            if let Some(parent_entry) = out
                .layers
                .iter_mut()
                .find(|(layer, _)| layer.id == copy_parent)
                && let Some(children) = parent_entry.0.children_mut()
            {
                children.push(dup_id);
            }
            self.duplicate_children_into(child, dup_id, out)?;
        }
        Ok(())
    }

    /// Where `id` ends up after moving `offset` steps through the flattened, depth-first
    /// list of insertion points (negative = up). Groups are entered and left one step at a
    /// time; the result is clamped to the first and last insertion point.
    pub fn offset_position(&self, id: LayerId, offset: isize) -> Result<(LayerId, usize)> {
        if id == self.root {
            return Err(IntraPaintError::RootLayer);
        }
        let parent = self.parent_of(id).ok_or(IntraPaintError::LayerNotFound(id))?;
        let index = self
            .index_in_parent(id)
            .ok_or(IntraPaintError::LayerNotFound(id))?;

        let mut slots = Vec::new();
        self.collect_slots(self.root, id, &mut slots);
        let current = slots
            .iter()
            .position(|slot| *slot == (parent, index))
            .ok_or(IntraPaintError::LayerNotFound(id))?;
        let max_idx = slots.len() as isize - 1;
        let target = (current as isize + offset).clamp(0, max_idx);
        Ok(slots[target as usize])
    }

    fn collect_slots(&self, stack: LayerId, exclude: LayerId, out: &mut Vec<(LayerId, usize)>) {
        let mut i = 0;
        for &child in self.children(stack) {
            if child == exclude {
                continue;
            }
            out.push((stack, i));
            if self.is_stack(child) {
                self.collect_slots(child, exclude, out);
            }
            i += 1;
        }
        out.push((stack, i));
    }

    // ---- rendering ----------------------------------------------------------

    /// Composite the visible tree into a raster covering `area` of root space.
    pub fn render(&self, area: IntRect, saved_only: bool) -> Result<Raster> {
        let mut target = Raster::from_size(area.size());
        let root = self.root();
        if root.visible {
            let base = Affine::translate((-area.x as f64, -area.y as f64)) * root.transform;
            self.render_children(self.root, &mut target, &base, saved_only)?;
        }
        Ok(target)
    }

    /// Composite just `id` (and its subtree, for stacks) into a raster covering `area` of
    /// root space, ignoring the layer's own visibility, opacity and mode.
    pub fn render_layer(&self, id: LayerId, area: IntRect) -> Result<Raster> {
        let layer = self.layer(id)?;
        let mut target = Raster::from_size(area.size());
        let transform = Affine::translate((-area.x as f64, -area.y as f64)) * self.full_transform(id);
        match &layer.content {
            LayerContent::Image(raster) => {
                target.paint(raster, &transform, CompositionMode::Normal, 1.0)?;
            }
            LayerContent::Stack(_) => self.render_children(id, &mut target, &transform, false)?,
        }
        Ok(target)
    }

    fn render_children(
        &self,
        stack: LayerId,
        target: &mut Raster,
        base: &Affine,
        saved_only: bool,
    ) -> Result<()> {
        for &child in self.children(stack).iter().rev() {
            let layer = self.layer(child)?;
            if !layer.visible || (saved_only && !layer.saved) {
                continue;
            }
            let transform = *base * layer.transform;
            match &layer.content {
                LayerContent::Image(raster) => {
                    target.paint(raster, &transform, layer.composition_mode, layer.opacity())?;
                }
                LayerContent::Stack(_) => {
                    let mut group = Raster::from_size(target.size());
                    self.render_children(child, &mut group, &transform, saved_only)?;
                    target.paint_at(
                        &group,
                        IntPoint::new(0, 0),
                        layer.composition_mode,
                        layer.opacity(),
                    );
                }
            }
        }
        Ok(())
    }
}
