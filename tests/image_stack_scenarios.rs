//! End-to-end behaviour of the image stack through its public API.

use std::sync::{Arc, Mutex};

use image::Rgba;
use intrapaint::signals::EditingState;
use intrapaint::{EditorConfig, EventKind, ImageStack, IntPoint, IntRect, IntSize, Raster, StackEvent};
use kurbo::Affine;

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

fn stack_with_limits(size: i32, min: i32, max: i32) -> ImageStack {
    ImageStack::new(EditorConfig {
        default_image_size: IntSize::new(size, size),
        min_generation_area_size: IntSize::new(min, min),
        max_generation_area_size: IntSize::new(max, max),
        ..EditorConfig::default()
    })
}

fn assert_generation_area_valid(stack: &ImageStack) {
    let area = stack.generation_area();
    let min = stack.min_generation_area_size();
    let max = stack.get_max_generation_area_size();
    assert!(
        stack.bounds().contains_rect(&area),
        "{area:?} outside {:?}",
        stack.bounds()
    );
    assert!(area.width >= min.width && area.width <= max.width.max(min.width), "{area:?}");
    assert!(area.height >= min.height && area.height <= max.height.max(min.height), "{area:?}");
}

#[test]
fn create_then_merge_then_undo() {
    let mut stack = ImageStack::with_size(IntSize::new(100, 100));
    let a = stack.create_layer(Some("A"), None, None, None, None).unwrap();
    let b = stack
        .create_layer(None, Some(Raster::filled(10, 10, RED)), None, None, Some(Affine::translate((5.0, 5.0))))
        .unwrap();
    assert_eq!(stack.layer_tree().children(stack.root_id()), &[b, a]);
    let before = stack.merged_image(true).unwrap().to_bytes();

    assert!(stack.merge_layer_down(Some(b)).unwrap());
    assert_eq!(stack.layer_count(), 1);
    assert_eq!(stack.active_layer_id(), Some(a));
    let merged_a = stack.layer(a).unwrap();
    assert_eq!(merged_a.name, "A");
    assert_eq!(merged_a.raster().unwrap().pixel(5, 5), Some(RED));
    assert_eq!(merged_a.raster().unwrap().pixel(4, 4).unwrap()[3], 0);
    assert_eq!(stack.merged_image(true).unwrap().to_bytes(), before);

    assert!(stack.undo().is_some());
    assert_eq!(stack.layer_tree().children(stack.root_id()), &[b, a]);
    assert_eq!(stack.layer(b).unwrap().transform, Affine::translate((5.0, 5.0)));
    assert_eq!(stack.layer(a).unwrap().transform, Affine::IDENTITY);
    assert!(stack.layer(a).unwrap().raster().unwrap().is_fully_transparent());
    assert_eq!(stack.active_layer_id(), Some(b));
}

#[test]
fn generation_area_clamps_to_max_then_translates() {
    let mut stack = stack_with_limits(200, 8, 100);
    stack.set_generation_area(IntRect::new(190, 190, 150, 150));
    assert_eq!(stack.generation_area(), IntRect::new(100, 100, 100, 100));

    // within the size limits only the position is corrected
    stack.set_generation_area(IntRect::new(190, 190, 50, 50));
    assert_eq!(stack.generation_area(), IntRect::new(150, 150, 50, 50));
}

#[test]
fn removing_the_active_top_layer_falls_back() {
    let mut stack = ImageStack::with_size(IntSize::new(16, 16));
    let a = stack.create_layer(Some("A"), None, None, None, None).unwrap();
    let b = stack.create_layer(Some("B"), None, None, None, None).unwrap();
    let c = stack.create_layer(Some("C"), None, None, None, None).unwrap();
    assert_eq!(stack.active_layer_id(), Some(c));

    assert!(stack.remove_layer(Some(c)).unwrap());
    assert_eq!(stack.active_layer_id(), Some(b));
    assert!(!stack.layer_tree().contains(c));

    stack.undo();
    assert_eq!(stack.active_layer_id(), Some(c));
    assert_eq!(stack.layer_tree().children(stack.root_id()), &[c, b, a]);
}

#[test]
fn generation_area_stays_valid_through_size_changes() {
    let mut stack = stack_with_limits(64, 8, 48);
    stack.set_image(Raster::filled(64, 64, BLUE)).unwrap();
    stack.set_generation_area(IntRect::new(30, 30, 40, 40));
    assert_generation_area_valid(&stack);

    stack.resize_canvas(IntSize::new(32, 20), -10, -10).unwrap();
    assert_generation_area_valid(&stack);
    stack.scale(IntSize::new(90, 12)).unwrap();
    assert_generation_area_valid(&stack);
    stack.set_max_generation_area_size(IntSize::new(10, 10));
    assert_generation_area_valid(&stack);
    stack.set_min_generation_area_size(IntSize::new(12, 12));
    assert_generation_area_valid(&stack);
    assert_eq!(stack.generation_area().size(), IntSize::new(12, 12));

    // restored areas are refitted to the limits in force now
    while stack.undo().is_some() {
        assert_generation_area_valid(&stack);
    }
    while stack.redo().is_some() {
        assert_generation_area_valid(&stack);
    }
}

#[test]
fn resize_canvas_moves_every_layer_by_the_image_offset() {
    let mut stack = ImageStack::with_size(IntSize::new(32, 32));
    stack.set_image(Raster::new(32, 32)).unwrap();
    let mut dot = Raster::new(10, 10);
    dot.put_pixel(0, 0, RED);
    let scaled = stack
        .create_layer(Some("scaled"), Some(dot), None, None, Some(Affine::scale(2.0)))
        .unwrap();
    let moved = stack
        .create_layer(Some("moved"), Some(Raster::filled(4, 4, BLUE)), None, None, Some(Affine::translate((20.0, 20.0))))
        .unwrap();

    stack.resize_canvas(IntSize::new(40, 40), 4, 0).unwrap();

    assert_eq!(stack.get_color_at_point(IntPoint::new(4, 0)), RED);
    assert_eq!(stack.get_color_at_point(IntPoint::new(5, 1)), RED);
    assert_eq!(stack.get_color_at_point(IntPoint::new(3, 0))[3], 0);
    assert_eq!(stack.get_color_at_point(IntPoint::new(6, 0))[3], 0);
    assert_eq!(stack.get_color_at_point(IntPoint::new(24, 20)), BLUE);
    assert_eq!(stack.get_color_at_point(IntPoint::new(27, 23)), BLUE);
    assert_eq!(stack.get_color_at_point(IntPoint::new(23, 20))[3], 0);
    assert_eq!(stack.layer(scaled).unwrap().raster().unwrap().size(), IntSize::new(10, 10));
    assert_eq!(stack.layer(moved).unwrap().transform, Affine::translate((24.0, 20.0)));

    stack.undo();
    assert_eq!(stack.layer(scaled).unwrap().transform, Affine::scale(2.0));
    assert_eq!(stack.get_color_at_point(IntPoint::new(0, 0)), RED);
    assert_eq!(stack.get_color_at_point(IntPoint::new(20, 20)), BLUE);
}

#[test]
fn undo_memory_is_released_with_the_redo_branch() {
    let mut stack = ImageStack::with_size(IntSize::new(64, 64));
    let a = stack.create_layer(Some("a"), None, None, None, None).unwrap();
    let b = stack.create_layer(Some("b"), None, None, None, None).unwrap();
    stack.clear_history();

    stack.set_layer_name(a, "renamed").unwrap();
    stack.undo();
    let one_rename = stack.history().memory_usage();
    assert!(one_rename < 64 * 64 * 4);

    for _ in 0..5 {
        assert!(stack.remove_layer(Some(b)).unwrap());
        stack.undo();
        stack.set_layer_name(a, "renamed").unwrap();
        stack.undo();
    }
    assert_eq!(stack.history().undo_count(), 0);
    assert_eq!(stack.history().redo_count(), 1);
    assert_eq!(stack.history().memory_usage(), one_rename);
}

#[test]
fn generation_area_drag_is_one_undo_step_until_redo_exists() {
    let mut stack = stack_with_limits(100, 8, 50);
    let start = stack.generation_area();
    for x in 0..20 {
        stack.set_generation_area(IntRect::new(x, x, 30, 30));
    }
    assert_eq!(stack.history().undo_count(), 1);
    stack.undo();
    assert_eq!(stack.generation_area(), start);

    // a fresh drag after undo starts its own entry and drops the redo branch
    stack.set_generation_area(IntRect::new(40, 40, 30, 30));
    stack.set_generation_area(IntRect::new(41, 40, 30, 30));
    assert_eq!(stack.history().undo_count(), 1);
    assert!(!stack.history().can_redo());
}

#[test]
fn repeating_a_setter_is_idempotent() {
    let mut stack = ImageStack::with_size(IntSize::new(32, 32));
    let id = stack.create_layer(None, None, None, None, None).unwrap();
    let base = stack.history().undo_count();

    assert!(stack.set_layer_visible(id, false).unwrap());
    assert!(!stack.set_layer_visible(id, false).unwrap());
    assert!(stack.set_layer_name(id, "sky").unwrap());
    assert!(!stack.set_layer_name(id, "sky").unwrap());
    let area = stack.generation_area();
    stack.set_generation_area(area);
    assert_eq!(stack.history().undo_count(), base + 2);
}

#[test]
fn tree_stays_consistent_when_moving_through_groups() {
    let mut stack = ImageStack::with_size(IntSize::new(16, 16));
    let a = stack.create_layer(Some("a"), None, None, None, None).unwrap();
    let group = stack.create_layer_group(Some("group"), None, None).unwrap();
    let root = stack.root_id();
    assert_eq!(stack.layer_tree().children(root), &[group, a]);

    // one step up from the bottom lands inside the group
    assert!(stack.move_layer(-1, Some(a)).unwrap());
    assert_eq!(stack.layer_tree().parent_of(a), Some(group));
    assert_eq!(stack.layer_tree().parent_chain(a), vec![group, root]);

    let copy = stack.copy_layer(Some(a)).unwrap().unwrap();
    assert_eq!(stack.layer_tree().parent_of(copy), Some(group));

    let tree = stack.layer_tree();
    let ids = tree.recursive_child_layers(root);
    let mut unique = ids.clone();
    unique.sort_by_key(|id| id.get());
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    for id in ids {
        assert_eq!(tree.parent_chain(id).last(), Some(&root));
    }

    stack.undo();
    stack.undo();
    assert_eq!(stack.layer_tree().children(root), &[group, a]);
    assert!(stack.layer_tree().children(group).is_empty());
}

#[test]
fn editing_state_follows_layer_presence() {
    let mut stack = ImageStack::with_size(IntSize::new(8, 8));
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    stack.signals_mut().subscribe(EventKind::EditingStateChanged, move |event| {
        if let StackEvent::EditingStateChanged(state) = event {
            sink.lock().unwrap().push(*state);
        }
    });

    assert_eq!(stack.editing_state(), EditingState::NoImage);
    stack.create_layer(None, None, None, None, None).unwrap();
    assert_eq!(stack.editing_state(), EditingState::Editing);
    stack.undo();
    assert_eq!(stack.editing_state(), EditingState::NoImage);
    assert_eq!(*states.lock().unwrap(), vec![EditingState::Editing, EditingState::NoImage]);
}

#[test]
fn hidden_layer_edits_leave_the_merged_image_alone() {
    let mut stack = ImageStack::with_size(IntSize::new(8, 8));
    let id = stack.create_layer(None, Some(Raster::filled(8, 8, RED)), None, None, None).unwrap();
    stack.set_layer_visible(id, false).unwrap();

    let changes = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&changes);
    stack
        .signals_mut()
        .subscribe(EventKind::ContentChanged, move |_| *sink.lock().unwrap() += 1);

    stack.set_layer_opacity(id, 0.3).unwrap();
    stack.replace_layer_image(id, Raster::filled(8, 8, BLUE)).unwrap();
    assert_eq!(*changes.lock().unwrap(), 0);
    assert_eq!(stack.get_color_at_point(IntPoint::new(1, 1))[3], 0);

    stack.set_layer_visible(id, true).unwrap();
    assert_eq!(*changes.lock().unwrap(), 1);
}

#[test]
fn set_image_is_one_atomic_step() {
    let mut stack = ImageStack::with_size(IntSize::new(10, 10));
    stack.create_layer(None, Some(Raster::filled(10, 10, RED)), None, None, None).unwrap();
    stack.create_layer(None, None, None, None, None).unwrap();
    let layers_before = stack.layer_tree().recursive_child_layers(stack.root_id());
    let undo_before = stack.history().undo_count();

    let id = stack.set_image(Raster::filled(20, 12, BLUE)).unwrap();
    assert_eq!(stack.size(), IntSize::new(20, 12));
    assert_eq!(stack.layer_count(), 1);
    assert_eq!(stack.active_layer_id(), Some(id));
    assert_eq!(stack.history().undo_count(), undo_before + 1);

    stack.undo();
    assert_eq!(stack.size(), IntSize::new(10, 10));
    assert_eq!(stack.layer_tree().recursive_child_layers(stack.root_id()), layers_before);
    assert_eq!(stack.get_color_at_point(IntPoint::new(0, 0)), RED);
}
