//! Every mutator leaves exactly one undo entry, and undo/redo restore the observable state
//! byte for byte.

use image::Rgba;
use intrapaint::layer_tree::LayerTree;
use intrapaint::{CompositionMode, ImageStack, IntPoint, IntRect, IntSize, LayerId, Raster};
use kurbo::Affine;

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const HALF_BLUE: Rgba<u8> = Rgba([0, 0, 255, 128]);

struct Ids {
    bottom: LayerId,
    middle: LayerId,
    top: LayerId,
}

fn gradient(width: u32, height: u32) -> Raster {
    let mut raster = Raster::new(width, height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            raster.put_pixel(x, y, Rgba([(x * 8) as u8, (y * 8) as u8, 64, 255]));
        }
    }
    raster
}

fn fixture() -> (ImageStack, Ids) {
    let mut stack = ImageStack::with_size(IntSize::new(32, 32));
    let bottom = stack.set_image(gradient(32, 32)).unwrap();
    let middle = stack
        .create_layer(
            Some("middle"),
            Some(Raster::filled(10, 10, RED)),
            None,
            None,
            Some(Affine::translate((4.0, 6.0))),
        )
        .unwrap();
    let top = stack
        .create_layer(
            Some("top"),
            Some(Raster::filled(8, 8, HALF_BLUE)),
            None,
            None,
            Some(Affine::translate((20.0, 20.0))),
        )
        .unwrap();
    stack.set_layer_opacity(top, 0.5).unwrap();
    stack.select_rect(IntRect::new(2, 2, 12, 12));
    stack.clear_history();
    (stack, Ids { bottom, middle, top })
}

type LayerPrint = (LayerId, String, bool, f32, CompositionMode, [f64; 6], Option<Vec<u8>>);

#[derive(Debug, PartialEq)]
struct Fingerprint {
    size: IntSize,
    generation_area: IntRect,
    active: Option<LayerId>,
    layers: Vec<LayerPrint>,
    merged: Vec<u8>,
    selection: Vec<u8>,
    selection_bounds: IntRect,
}

fn layers(tree: &LayerTree) -> Vec<LayerPrint> {
    tree.recursive_child_layers(tree.root_id())
        .into_iter()
        .map(|id| {
            let layer = tree.layer(id).unwrap();
            (
                id,
                layer.name.clone(),
                layer.visible,
                layer.opacity(),
                layer.composition_mode,
                layer.transform.as_coeffs(),
                layer.raster().map(Raster::to_bytes),
            )
        })
        .collect()
}

fn fingerprint(stack: &mut ImageStack) -> Fingerprint {
    Fingerprint {
        size: stack.size(),
        generation_area: stack.generation_area(),
        active: stack.active_layer_id(),
        layers: layers(stack.layer_tree()),
        merged: stack.merged_image(true).unwrap().to_bytes(),
        selection: stack.selection_layer().raster().to_bytes(),
        selection_bounds: stack.selection_layer().root_bounds(),
    }
}

type Action = fn(&mut ImageStack, &Ids) -> intrapaint::Result<bool>;

fn act(name: &'static str, action: Action) -> (&'static str, Action) {
    (name, action)
}

fn actions() -> Vec<(&'static str, Action)> {
    vec![
        act("create layer", |s, _| s.create_layer(None, None, None, None, None).map(|_| true)),
        act("create group", |s, _| s.create_layer_group(None, None, None).map(|_| true)),
        act("remove layer", |s, ids| s.remove_layer(Some(ids.middle))),
        act("copy layer", |s, ids| s.copy_layer(Some(ids.middle)).map(|id| id.is_some())),
        act("move down", |s, ids| s.move_layer(1, Some(ids.top))),
        act("move up", |s, ids| s.move_layer(-1, Some(ids.bottom))),
        act("merge down", |s, ids| s.merge_layer_down(Some(ids.top))),
        act("opacity", |s, ids| s.set_layer_opacity(ids.middle, 0.25)),
        act("visibility", |s, ids| s.set_layer_visible(ids.top, false)),
        act("composition mode", |s, ids| {
            s.set_layer_composition_mode(ids.top, CompositionMode::Multiply)
        }),
        act("transform", |s, ids| {
            s.set_layer_transform(ids.middle, Affine::translate((-3.0, 12.0)))
        }),
        act("rename", |s, ids| s.set_layer_name(ids.middle, "renamed")),
        act("resize canvas", |s, _| s.resize_canvas(IntSize::new(40, 30), 5, -3).map(|_| true)),
        act("scale", |s, _| s.scale(IntSize::new(16, 48)).map(|_| true)),
        act("set image", |s, _| s.set_image(Raster::filled(12, 20, RED)).map(|_| true)),
        act("layer to image size", |s, ids| s.layer_to_image_size(Some(ids.middle))),
        act("replace image", |s, ids| s.replace_layer_image(ids.bottom, Raster::filled(5, 5, RED))),
        act("generation area", |s, _| {
            let before = s.generation_area();
            s.set_generation_area(IntRect::new(3, 4, 16, 16));
            Ok(s.generation_area() != before)
        }),
        act("select all", |s, _| Ok(s.select_all())),
        act("invert selection", |s, _| Ok(s.invert_selection())),
        act("cut", |s, ids| s.cut_selected(Some(ids.middle)).map(|cut| cut.is_some())),
        act("clear selected", |s, ids| s.clear_selected(Some(ids.bottom))),
        act("fill selected", |s, ids| s.fill_selected(RED, Some(ids.bottom))),
        act("paste", |s, ids| {
            s.copy_selected(Some(ids.bottom), None)?;
            s.paste().map(|id| id.is_some())
        }),
    ]
}

#[test]
fn every_mutator_is_one_reversible_step() {
    for (name, action) in actions() {
        let (mut stack, ids) = fixture();
        let before = fingerprint(&mut stack);

        let changed = action(&mut stack, &ids).unwrap_or_else(|e| panic!("{name}: {e}"));
        assert!(changed, "{name}: expected a change");
        assert_eq!(stack.history().undo_count(), 1, "{name}: one undo entry");
        let after = fingerprint(&mut stack);
        assert_ne!(before, after, "{name}: state did not change");

        assert!(stack.undo().is_some(), "{name}: undo");
        assert_eq!(fingerprint(&mut stack), before, "{name}: undo restores state");

        assert!(stack.redo().is_some(), "{name}: redo");
        assert_eq!(fingerprint(&mut stack), after, "{name}: redo reapplies state");
    }
}

#[test]
fn undo_with_nothing_recorded_is_a_noop() {
    let (mut stack, _) = fixture();
    let before = fingerprint(&mut stack);
    assert!(stack.undo().is_none());
    assert!(stack.redo().is_none());
    assert_eq!(fingerprint(&mut stack), before);
}

#[test]
fn long_edit_sequence_unwinds_completely() {
    let (mut stack, ids) = fixture();
    let start = fingerprint(&mut stack);

    let mut steps = 0;
    for (name, action) in actions() {
        // these would remove layers that later actions refer to
        if name == "set image" || name == "remove layer" || name == "merge down" {
            continue;
        }
        if action(&mut stack, &ids).unwrap() {
            steps += 1;
        }
    }
    assert!(steps > 10);
    assert_eq!(stack.history().undo_count(), steps);

    while stack.undo().is_some() {}
    assert_eq!(fingerprint(&mut stack), start);
}

#[test]
fn sampling_follows_undo() {
    let (mut stack, ids) = fixture();
    let inside_middle = IntPoint::new(5, 7);
    assert_eq!(stack.get_color_at_point(inside_middle), RED);
    stack.set_layer_visible(ids.middle, false).unwrap();
    assert_ne!(stack.get_color_at_point(inside_middle), RED);
    stack.undo();
    assert_eq!(stack.get_color_at_point(inside_middle), RED);
}
