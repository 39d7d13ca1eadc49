// ============================================================================
// EVENT HISTORY - replayable primitive log for a single raster
// ============================================================================
//
// The pixmap is `base` with every event in `history` applied in order. Undone events
// wait in `future` until a new event is added. When the log grows past its cap, the
// oldest events are applied to `base` and forgotten, so the rendered result never
// changes; only undo depth is lost.

use image::Rgba;

use crate::config::EditorConfig;
use crate::geometry::{IntPoint, IntSize};
use crate::raster::{CompositionMode, Raster};

/// A single replayable edit.
#[derive(Clone, Debug, PartialEq)]
pub enum PixmapEvent {
    Draw {
        color: Rgba<u8>,
        brush_size: u32,
        from: IntPoint,
        to: IntPoint,
    },
    Erase {
        brush_size: u32,
        from: IntPoint,
        to: IntPoint,
    },
    Fill {
        color: Rgba<u8>,
    },
    ResizeCanvas {
        size: IntSize,
        offset: IntPoint,
    },
    Replace {
        image: Raster,
    },
}

impl PixmapEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PixmapEvent::Draw { .. } => "draw",
            PixmapEvent::Erase { .. } => "erase",
            PixmapEvent::Fill { .. } => "fill",
            PixmapEvent::ResizeCanvas { .. } => "resize_canvas",
            PixmapEvent::Replace { .. } => "replace",
        }
    }
}

/// Apply `event` to `pixmap` in place.
pub fn apply_event(event: &PixmapEvent, pixmap: &mut Raster) {
    match event {
        PixmapEvent::Draw {
            color,
            brush_size,
            from,
            to,
        } => pixmap.draw_line(*from, *to, *brush_size, *color, CompositionMode::Normal),
        PixmapEvent::Erase { brush_size, from, to } => pixmap.draw_line(
            *from,
            *to,
            *brush_size,
            Rgba([0, 0, 0, 255]),
            CompositionMode::Clear,
        ),
        PixmapEvent::Fill { color } => pixmap.fill(*color),
        PixmapEvent::ResizeCanvas { size, offset } => {
            *pixmap = pixmap.resized_canvas(*size, *offset);
        }
        PixmapEvent::Replace { image } => *pixmap = image.clone(),
    }
}

#[derive(Clone, Debug)]
pub struct EventHistory {
    base: Raster,
    history: Vec<PixmapEvent>,
    future: Vec<PixmapEvent>,
    max_events: usize,
    /// `base` with all of `history` applied; rebuilt lazily after an undo.
    rendered: Option<Raster>,
}

impl EventHistory {
    pub fn new(base: Raster, max_events: usize) -> Self {
        Self {
            rendered: Some(base.clone()),
            base,
            history: Vec::new(),
            future: Vec::new(),
            max_events,
        }
    }

    /// Capped at the configured `max_pixmap_events`.
    pub fn with_config(base: Raster, config: &EditorConfig) -> Self {
        Self::new(base, config.max_pixmap_events)
    }

    pub fn add_draw_event(&mut self, color: Rgba<u8>, brush_size: u32, from: IntPoint, to: IntPoint) {
        self.add_event(PixmapEvent::Draw {
            color,
            brush_size,
            from,
            to,
        });
    }

    pub fn add_erase_event(&mut self, brush_size: u32, from: IntPoint, to: IntPoint) {
        self.add_event(PixmapEvent::Erase { brush_size, from, to });
    }

    pub fn add_fill_event(&mut self, color: Rgba<u8>) {
        self.add_event(PixmapEvent::Fill { color });
    }

    pub fn add_resize_event(&mut self, size: IntSize, offset: IntPoint) {
        self.add_event(PixmapEvent::ResizeCanvas { size, offset });
    }

    pub fn add_replace_event(&mut self, image: Raster) {
        self.add_event(PixmapEvent::Replace { image });
    }

    pub fn add_event(&mut self, event: PixmapEvent) {
        if let Some(rendered) = self.rendered.as_mut() {
            apply_event(&event, rendered);
        }
        self.history.push(event);
        self.future.clear();
        self.trim();
    }

    /// Bake events beyond the cap into the base image, oldest first.
    fn trim(&mut self) {
        if self.history.len() <= self.max_events {
            return;
        }
        let excess = self.history.len() - self.max_events;
        for event in self.history.drain(..excess) {
            apply_event(&event, &mut self.base);
        }
        tracing::trace!(excess, "event history trimmed");
    }

    /// Step back one event. Returns `false` when nothing is left to undo.
    pub fn undo(&mut self) -> bool {
        let Some(event) = self.history.pop() else {
            return false;
        };
        self.future.push(event);
        self.rendered = None;
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(event) = self.future.pop() else {
            return false;
        };
        if let Some(rendered) = self.rendered.as_mut() {
            apply_event(&event, rendered);
        }
        self.history.push(event);
        true
    }

    /// Current image.
    pub fn pixmap(&mut self) -> &Raster {
        self.rendered.get_or_insert_with(|| {
            let mut pixmap = self.base.clone();
            for event in &self.history {
                apply_event(event, &mut pixmap);
            }
            pixmap
        })
    }

    pub fn history(&self) -> &[PixmapEvent] {
        &self.history
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Forget all events and start over from `base`.
    pub fn reset(&mut self, base: Raster) {
        self.rendered = Some(base.clone());
        self.base = base;
        self.history.clear();
        self.future.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn strokes(history: &mut EventHistory) {
        history.add_fill_event(BLUE);
        for i in 0..6 {
            history.add_draw_event(RED, 3, IntPoint::new(i, 0), IntPoint::new(i, 9));
        }
        history.add_erase_event(2, IntPoint::new(0, 5), IntPoint::new(9, 5));
        history.add_resize_event(IntSize::new(12, 8), IntPoint::new(1, -1));
        history.add_draw_event(BLUE, 1, IntPoint::new(11, 0), IntPoint::new(0, 7));
    }

    #[test]
    fn trimming_never_changes_the_result() {
        let mut capped = EventHistory::new(Raster::new(10, 10), 3);
        let mut unbounded = EventHistory::new(Raster::new(10, 10), usize::MAX);
        strokes(&mut capped);
        strokes(&mut unbounded);

        assert_eq!(capped.history_len(), 3);
        assert_eq!(unbounded.history_len(), 10);
        // force a rebuild from the baked base
        assert!(capped.undo());
        assert!(capped.redo());
        assert_eq!(capped.pixmap(), unbounded.pixmap());
    }

    #[test]
    fn undo_redo_replays_from_base() {
        let mut history = EventHistory::new(Raster::new(4, 4), 10);
        history.add_fill_event(RED);
        history.add_erase_event(1, IntPoint::new(0, 0), IntPoint::new(0, 0));
        assert_eq!(history.pixmap().pixel(0, 0).unwrap()[3], 0);

        assert!(history.undo());
        assert_eq!(history.pixmap().pixel(0, 0), Some(RED));
        assert!(history.undo());
        assert!(!history.undo());
        assert!(history.pixmap().is_fully_transparent());

        assert!(history.redo());
        assert_eq!(history.pixmap().pixel(0, 0), Some(RED));
        assert_eq!(history.future_len(), 1);
    }

    #[test]
    fn new_event_discards_future() {
        let mut history = EventHistory::new(Raster::new(4, 4), 10);
        history.add_fill_event(RED);
        history.undo();
        history.add_fill_event(BLUE);
        assert_eq!(history.future_len(), 0);
        assert!(!history.redo());
        assert_eq!(history.pixmap().pixel(3, 3), Some(BLUE));
    }

    #[test]
    fn resize_keeps_content_at_offset() {
        let mut history = EventHistory::new(Raster::filled(2, 2, RED), 10);
        history.add_resize_event(IntSize::new(4, 4), IntPoint::new(2, 2));
        let pixmap = history.pixmap();
        assert_eq!(pixmap.size(), IntSize::new(4, 4));
        assert_eq!(pixmap.pixel(3, 3), Some(RED));
        assert_eq!(pixmap.pixel(0, 0).unwrap()[3], 0);
    }

    #[test]
    fn configured_cap_is_used() {
        let config = EditorConfig {
            max_pixmap_events: 2,
            ..EditorConfig::default()
        };
        let mut history = EventHistory::with_config(Raster::new(2, 2), &config);
        for _ in 0..5 {
            history.add_fill_event(RED);
        }
        assert_eq!(history.max_events(), 2);
        assert_eq!(history.history_len(), 2);
    }

    #[test]
    fn replace_swaps_the_whole_image() {
        let mut history = EventHistory::new(Raster::new(2, 2), 10);
        history.add_replace_event(Raster::filled(3, 1, BLUE));
        assert_eq!(history.pixmap().size(), IntSize::new(3, 1));
        history.undo();
        assert_eq!(history.pixmap().size(), IntSize::new(2, 2));
    }
}
