// src/canvas/tests.rs
use super::*;

fn patch(x: u32, y: u32, width: u32, height: u32, pixels: &[Color]) -> Patch {
    Patch {
        x,
        y,
        width,
        height,
        pixels: pixels.to_vec(),
    }
}

use Color::{Black as B, Transparent as T, White as W};

#[test]
fn test_new_canvas_is_white() {
    let canvas = Canvas::new(3, 2);
    assert_eq!(canvas.pixels().len(), 6);
    assert!(canvas.pixels().iter().all(|&c| c == W));
    assert_eq!(canvas.get(3, 0), None);
    assert_eq!(canvas.get(0, 2), None);
}

#[test]
fn test_apply_draws_rectangle_at_offset() {
    let mut canvas = Canvas::new(4, 4);
    canvas.apply(&patch(1, 1, 2, 1, &[B, B])).unwrap();

    for y in 0..4 {
        for x in 0..4 {
            let expected = if y == 1 && (x == 1 || x == 2) { B } else { W };
            assert_eq!(canvas.get(x, y), Some(expected), "cell {},{}", x, y);
        }
    }
}

#[test]
fn test_transparent_cells_leave_grid_unchanged() {
    let mut canvas = Canvas::new(3, 3);
    canvas.apply(&patch(0, 0, 2, 2, &[B, T, T, B])).unwrap();
    let before = canvas.clone();

    canvas.apply(&patch(0, 0, 3, 3, &[T; 9])).unwrap();
    assert_eq!(canvas, before);

    // Mixed patch: only the opaque cell lands
    canvas.apply(&patch(1, 0, 2, 1, &[T, B])).unwrap();
    assert_eq!(canvas.get(1, 0), Some(W));
    assert_eq!(canvas.get(2, 0), Some(B));
}

#[test]
fn test_opaque_patch_is_idempotent() {
    let opaque = patch(1, 0, 2, 2, &[B, W, W, B]);
    let mut once = Canvas::filled(4, 3, T);
    once.apply(&opaque).unwrap();

    let mut twice = once.clone();
    twice.apply(&opaque).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn test_later_patch_wins() {
    let mut canvas = Canvas::new(2, 1);
    canvas.apply(&patch(0, 0, 2, 1, &[B, B])).unwrap();
    canvas.apply(&patch(1, 0, 1, 1, &[W])).unwrap();
    assert_eq!(canvas.pixels(), &[B, W]);
}

#[test]
fn test_out_of_bounds_patch_is_rejected() {
    let mut canvas = Canvas::new(4, 4);
    let before = canvas.clone();

    let too_wide = patch(3, 0, 2, 1, &[B, B]);
    assert!(matches!(canvas.apply(&too_wide), Err(CanvasError::OutOfBounds { .. })));

    let too_tall = patch(0, 2, 1, 3, &[B, B, B]);
    assert!(matches!(canvas.apply(&too_tall), Err(CanvasError::OutOfBounds { .. })));

    let overflow = patch(u32::MAX, 0, 2, 1, &[B, B]);
    assert!(matches!(canvas.apply(&overflow), Err(CanvasError::OutOfBounds { .. })));

    assert_eq!(canvas, before);
}

#[test]
fn test_pixel_count_mismatch_is_rejected() {
    let mut canvas = Canvas::new(4, 4);
    let before = canvas.clone();

    let result = canvas.apply(&patch(0, 0, 2, 2, &[B, B, B]));
    assert_eq!(result, Err(CanvasError::PixelCount { expected: 4, actual: 3 }));
    assert_eq!(canvas, before);
}

#[test]
fn test_empty_patch_is_a_no_op() {
    let mut canvas = Canvas::new(2, 2);
    let before = canvas.clone();
    canvas.apply(&patch(2, 2, 0, 0, &[])).unwrap();
    canvas.apply(&patch(0, 1, 0, 1, &[])).unwrap();
    assert_eq!(canvas, before);
}

#[test]
fn test_export_and_load() {
    let mut canvas = Canvas::new(5, 3);
    canvas.apply(&patch(0, 0, 3, 2, &[B, T, B, B, B, B])).unwrap();
    canvas.apply(&patch(4, 2, 1, 1, &[B])).unwrap();

    let bytes = canvas.export();
    // 12 header bytes, then 15 cells at 2 bits each
    assert_eq!(bytes.len(), 12 + 4);
    assert_eq!(&bytes[..4], b"CNV1");

    let loaded = Canvas::load(&bytes, 5, 3).unwrap();
    assert_eq!(loaded, canvas);
}

#[test]
fn test_export_keeps_transparent_cells() {
    let canvas = Canvas::from_pixels(2, 2, vec![T, B, W, T]).unwrap();
    let loaded = Canvas::load(&canvas.export(), 2, 2).unwrap();
    assert_eq!(loaded.pixels(), &[T, B, W, T]);
}

#[test]
fn test_load_rejects_dimension_mismatch() {
    let bytes = Canvas::new(4, 4).export();
    assert!(matches!(
        Canvas::load(&bytes, 2, 8),
        Err(SnapshotError::DimensionMismatch { found_w: 4, found_h: 4, .. })
    ));
}

#[test]
fn test_load_rejects_bad_data() {
    assert!(matches!(Canvas::load(b"nope", 1, 1), Err(SnapshotError::BadHeader)));

    let mut truncated = Canvas::new(8, 8).export();
    truncated.pop();
    assert!(matches!(
        Canvas::load(&truncated, 8, 8),
        Err(SnapshotError::Length { expected: 16, actual: 15 })
    ));

    // Cell code 0b11 is not in the palette
    let mut invalid = Canvas::new(2, 2).export();
    invalid[12] = 0b1011_1010;
    assert!(matches!(Canvas::load(&invalid, 2, 2), Err(SnapshotError::InvalidCell(1))));
}

#[tokio::test]
async fn test_actor_applies_in_order_and_snapshots() {
    let handle = CanvasActor::spawn(Canvas::new(4, 4), 16);

    handle.apply(patch(0, 0, 4, 1, &[B, B, B, B])).await.unwrap();
    handle.apply(patch(1, 0, 1, 1, &[W])).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.w, 4);
    assert_eq!(snapshot.h, 4);
    assert_eq!(snapshot.p, "0100111111111111");
}

#[tokio::test]
async fn test_actor_survives_invalid_patch() {
    let handle = CanvasActor::spawn(Canvas::new(2, 2), 16);

    handle.apply(patch(1, 1, 2, 2, &[B, B, B, B])).await.unwrap();
    handle.apply(patch(0, 0, 1, 1, &[B])).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.p, "0111");
}

#[tokio::test]
async fn test_actor_export_matches_canvas() {
    let handle = CanvasActor::spawn(Canvas::new(3, 3), 16);
    handle.apply(patch(2, 2, 1, 1, &[B])).await.unwrap();

    let bytes = handle.export().await.unwrap();
    let restored = Canvas::load(&bytes, 3, 3).unwrap();
    assert_eq!(restored.get(2, 2), Some(B));
    assert_eq!(restored.get(0, 0), Some(W));
}

#[test]
fn test_png_export_header() {
    let mut canvas = Canvas::new(3, 2);
    canvas.apply(&patch(0, 0, 1, 1, &[B])).unwrap();

    let png = canvas.to_png().unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    assert_eq!(&png[12..16], b"IHDR");
    assert_eq!(u32::from_be_bytes(png[16..20].try_into().unwrap()), 3);
    assert_eq!(u32::from_be_bytes(png[20..24].try_into().unwrap()), 2);
    // 8-bit RGBA
    assert_eq!((png[24], png[25]), (8, 6));
}

#[test]
fn test_palette_rgba() {
    assert_eq!(T.rgba()[3], 0);
    assert_eq!(B.rgba(), [0, 0, 0, 255]);
    assert_eq!(W.rgba(), [255, 255, 255, 255]);
}
