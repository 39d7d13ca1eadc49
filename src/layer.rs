// ============================================================================
// LAYER - a node in the compositing tree
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use kurbo::Affine;

use crate::geometry::IntRect;
use crate::raster::{CompositionMode, Raster};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique layer identifier, stable for the layer's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    pub fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bitmap content for image layers, ordered children (top first) for stacks.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerContent {
    Image(Raster),
    Stack(Vec<LayerId>),
}

/// Which layer attribute a change notification refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerProperty {
    Content,
    Name,
    Visible,
    Saved,
    Opacity,
    CompositionMode,
    Transform,
}

/// A single attribute value, used to record and replay property edits.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerValue {
    Name(String),
    Visible(bool),
    Saved(bool),
    Opacity(f32),
    CompositionMode(CompositionMode),
    Transform(Affine),
}

impl LayerValue {
    pub fn property(&self) -> LayerProperty {
        match self {
            LayerValue::Name(_) => LayerProperty::Name,
            LayerValue::Visible(_) => LayerProperty::Visible,
            LayerValue::Saved(_) => LayerProperty::Saved,
            LayerValue::Opacity(_) => LayerProperty::Opacity,
            LayerValue::CompositionMode(_) => LayerProperty::CompositionMode,
            LayerValue::Transform(_) => LayerProperty::Transform,
        }
    }

    /// Current value of `property` on `layer`; `None` for content.
    pub fn read(layer: &Layer, property: LayerProperty) -> Option<LayerValue> {
        Some(match property {
            LayerProperty::Name => LayerValue::Name(layer.name.clone()),
            LayerProperty::Visible => LayerValue::Visible(layer.visible),
            LayerProperty::Saved => LayerValue::Saved(layer.saved),
            LayerProperty::Opacity => LayerValue::Opacity(layer.opacity),
            LayerProperty::CompositionMode => LayerValue::CompositionMode(layer.composition_mode),
            LayerProperty::Transform => LayerValue::Transform(layer.transform),
            LayerProperty::Content => return None,
        })
    }

    pub fn apply(&self, layer: &mut Layer) {
        match self {
            LayerValue::Name(name) => layer.name = name.clone(),
            LayerValue::Visible(visible) => layer.visible = *visible,
            LayerValue::Saved(saved) => layer.saved = *saved,
            LayerValue::Opacity(opacity) => layer.set_opacity(*opacity),
            LayerValue::CompositionMode(mode) => layer.composition_mode = *mode,
            LayerValue::Transform(transform) => layer.transform = *transform,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub saved: bool,
    opacity: f32,
    pub composition_mode: CompositionMode,
    /// Maps local pixel coordinates into the parent's coordinates.
    pub transform: Affine,
    pub content: LayerContent,
}

impl Layer {
    fn with_content(name: String, content: LayerContent) -> Self {
        Self {
            id: LayerId::next(),
            name,
            visible: true,
            saved: true,
            opacity: 1.0,
            composition_mode: CompositionMode::Normal,
            transform: Affine::IDENTITY,
            content,
        }
    }

    pub fn new_image(name: impl Into<String>, raster: Raster) -> Self {
        Self::with_content(name.into(), LayerContent::Image(raster))
    }

    pub fn new_stack(name: impl Into<String>) -> Self {
        Self::with_content(name.into(), LayerContent::Stack(Vec::new()))
    }

    pub fn is_stack(&self) -> bool {
        matches!(self.content, LayerContent::Stack(_))
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    /// Saved output includes a layer only when it is flagged saved and visible.
    pub fn effective_saved(&self) -> bool {
        self.saved && self.visible
    }

    pub fn raster(&self) -> Option<&Raster> {
        match &self.content {
            LayerContent::Image(raster) => Some(raster),
            LayerContent::Stack(_) => None,
        }
    }

    pub fn raster_mut(&mut self) -> Option<&mut Raster> {
        match &mut self.content {
            LayerContent::Image(raster) => Some(raster),
            LayerContent::Stack(_) => None,
        }
    }

    pub fn children(&self) -> &[LayerId] {
        match &self.content {
            LayerContent::Stack(children) => children,
            LayerContent::Image(_) => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<LayerId>> {
        match &mut self.content {
            LayerContent::Stack(children) => Some(children),
            LayerContent::Image(_) => None,
        }
    }

    /// Untransformed content bounds; empty for stacks.
    pub fn local_bounds(&self) -> IntRect {
        self.raster().map(Raster::bounds).unwrap_or_default()
    }

    /// Same attributes with a fresh id. Stack children are not carried over.
    pub(crate) fn duplicate_shallow(&self) -> Layer {
        let content = match &self.content {
            LayerContent::Image(raster) => LayerContent::Image(raster.clone()),
            LayerContent::Stack(_) => LayerContent::Stack(Vec::new()),
        };
        Layer {
            id: LayerId::next(),
            content,
            ..self.clone_attributes()
        }
    }

    fn clone_attributes(&self) -> Layer {
        Layer {
            id: self.id,
            name: self.name.clone(),
            visible: self.visible,
            saved: self.saved,
            opacity: self.opacity,
            composition_mode: self.composition_mode,
            transform: self.transform,
            content: LayerContent::Stack(Vec::new()),
        }
    }
}

/// `"layer N"` with the smallest N not already taken by one of `sibling_names`.
pub fn next_default_name<'a>(sibling_names: impl IntoIterator<Item = &'a str>) -> String {
    let mut taken: Vec<u64> = sibling_names
        .into_iter()
        .filter_map(|name| {
            let digits = name.strip_prefix("layer ")?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse::<u64>().ok()
        })
        .collect();
    taken.sort_unstable();
    taken.dedup();

    let mut n = 1;
    for used in taken {
        if used == n {
            n += 1;
        } else if used > n {
            break;
        }
    }
    format!("layer {}", n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_fills_the_first_gap() {
        assert_eq!(next_default_name([]), "layer 1");
        assert_eq!(next_default_name(["layer 1", "layer 3"]), "layer 2");
        assert_eq!(next_default_name(["layer 2", "layer 1"]), "layer 3");
    }

    #[test]
    fn default_name_ignores_non_matching_names() {
        assert_eq!(
            next_default_name(["layer 1 copy", "Layer 1", "layer x", "background"]),
            "layer 1"
        );
    }

    #[test]
    fn ids_are_unique_and_duplicates_get_fresh_ones() {
        let layer = Layer::new_image("a", Raster::new(1, 1));
        let dup = layer.duplicate_shallow();
        assert_ne!(layer.id, dup.id);
        assert_eq!(dup.name, "a");
        assert_eq!(dup.raster(), layer.raster());
    }

    #[test]
    fn layer_values_read_back_what_they_apply() {
        let mut layer = Layer::new_image("a", Raster::new(1, 1));
        LayerValue::Opacity(0.25).apply(&mut layer);
        LayerValue::Name("b".into()).apply(&mut layer);
        assert_eq!(
            LayerValue::read(&layer, LayerProperty::Opacity),
            Some(LayerValue::Opacity(0.25))
        );
        assert_eq!(layer.name, "b");
        assert_eq!(LayerValue::read(&layer, LayerProperty::Content), None);
    }

    #[test]
    fn effective_saved_requires_visibility() {
        let mut layer = Layer::new_stack("group");
        assert!(layer.effective_saved());
        layer.visible = false;
        assert!(!layer.effective_saved());
        layer.set_opacity(3.0);
        assert_eq!(layer.opacity(), 1.0);
    }
}
