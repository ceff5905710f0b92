use mask_trace_core::{DisplayMapping, Point, Polygon};
use mask_trace_system_rasterizer::{rasterize, Rasterizer};

fn polygon(points: &[(f64, f64)]) -> Polygon {
    Polygon::from_points(points.iter().map(|(x, y)| Point::new(*x, *y)).collect())
}

#[test]
fn open_paths_rasterize_to_empty_grid() {
    let mappings = [
        DisplayMapping::default(),
        DisplayMapping::new(0.0, 0.0, 10.0, 10.0),
        DisplayMapping::new(-5.0, 3.0, 0.5, 200.0),
    ];
    let shapes = [
        polygon(&[]),
        polygon(&[(2.0, 2.0)]),
        polygon(&[(0.0, 0.0), (9.0, 9.0)]),
    ];

    for mapping in &mappings {
        for shape in &shapes {
            let bitmap = rasterize(shape, mapping, 12, 8).expect("bitmap allocates");
            assert_eq!(bitmap.dimensions(), (12, 8));
            assert_eq!(
                bitmap.count_set(),
                0,
                "{} point path must not cover pixels",
                shape.len()
            );
        }
    }
}

#[test]
fn axis_aligned_square_covers_pixel_centres_inside() {
    let square = polygon(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
    let bitmap = rasterize(&square, &DisplayMapping::default(), 20, 20).expect("bitmap allocates");

    assert_eq!(bitmap.count_set(), 100);
    assert_eq!(bitmap.get(0, 0), Some(true));
    assert_eq!(bitmap.get(9, 9), Some(true));
    assert_eq!(bitmap.get(10, 9), Some(false));
    assert_eq!(bitmap.get(9, 10), Some(false));
}

#[test]
fn triangle_fills_pixels_below_hypotenuse() {
    let triangle = polygon(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
    let bitmap = rasterize(&triangle, &DisplayMapping::default(), 10, 10).expect("bitmap allocates");

    assert_eq!(bitmap.count_set(), 45);
    for row in 0..10 {
        for column in 0..10 {
            assert_eq!(
                bitmap.get(column, row),
                Some(column + row < 9),
                "pixel ({column}, {row})"
            );
        }
    }
}

#[test]
fn display_rectangle_maps_onto_full_mask() {
    let mapping = DisplayMapping::new(100.0, 100.0, 200.0, 200.0);
    let outline = polygon(&[(100.0, 100.0), (300.0, 100.0), (300.0, 300.0), (100.0, 300.0)]);
    let bitmap = rasterize(&outline, &mapping, 10, 10).expect("bitmap allocates");

    assert_eq!(bitmap.count_set(), 100, "drawn rectangle spans the whole mask");

    let left_half = polygon(&[(100.0, 100.0), (200.0, 100.0), (200.0, 300.0), (100.0, 300.0)]);
    let bitmap = rasterize(&left_half, &mapping, 10, 10).expect("bitmap allocates");
    assert_eq!(bitmap.count_set(), 50);
    assert_eq!(bitmap.get(4, 0), Some(true));
    assert_eq!(bitmap.get(5, 0), Some(false));
}

#[test]
fn polygon_outside_mask_is_clipped() {
    let far_away = polygon(&[(50.0, 50.0), (60.0, 50.0), (60.0, 60.0), (50.0, 60.0)]);
    let bitmap = rasterize(&far_away, &DisplayMapping::default(), 10, 10).expect("bitmap allocates");
    assert_eq!(bitmap.count_set(), 0);

    let overhanging = polygon(&[(-5.0, -5.0), (5.0, -5.0), (5.0, 5.0), (-5.0, 5.0)]);
    let bitmap =
        rasterize(&overhanging, &DisplayMapping::default(), 10, 10).expect("bitmap allocates");
    assert_eq!(bitmap.count_set(), 25);
}

#[test]
fn rasterizing_is_deterministic_and_leaves_inputs_untouched() {
    let shape = polygon(&[(1.5, 0.5), (8.25, 2.0), (6.0, 9.75), (0.5, 7.0)]);
    let mapping = DisplayMapping::new(0.0, 0.0, 10.0, 10.0);
    let shape_before = shape.clone();
    let mapping_before = mapping;

    let mut rasterizer = Rasterizer::new();
    let first = rasterizer
        .rasterize(&shape, &mapping, 32, 32)
        .expect("bitmap allocates");
    let second = rasterizer
        .rasterize(&shape, &mapping, 32, 32)
        .expect("bitmap allocates");

    assert_eq!(first, second);
    assert_eq!(shape, shape_before);
    assert_eq!(mapping, mapping_before);
}

#[test]
fn rasterize_into_overwrites_previous_contents() {
    let mut rasterizer = Rasterizer::new();
    let big = polygon(&[(0.0, 0.0), (8.0, 0.0), (8.0, 8.0), (0.0, 8.0)]);
    let small = polygon(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);

    let mut bitmap = rasterizer
        .rasterize(&big, &DisplayMapping::default(), 8, 8)
        .expect("bitmap allocates");
    assert_eq!(bitmap.count_set(), 64);

    rasterizer.rasterize_into(&small, &DisplayMapping::default(), &mut bitmap);
    assert_eq!(bitmap.count_set(), 4, "stale coverage must be cleared");
}
