#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure rasterizer that converts traced polygons into mask-resolution coverage.
//!
//! Vertices are mapped from display space into mask pixel space through the
//! [`DisplayMapping`] recorded for the frame, and pixels are filled with an
//! even-odd scanline rule sampled at pixel centres. Open paths (fewer than
//! three vertices) have no interior and never set a pixel.

use mask_trace_core::{Bitmap, BitmapError, DisplayMapping, Point, Polygon};

/// Scanline rasterizer with reusable scratch buffers.
#[derive(Debug, Default)]
pub struct Rasterizer {
    vertices: Vec<Point>,
    crossings: Vec<f64>,
}

impl Rasterizer {
    /// Creates a rasterizer with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rasterizes the polygon into a freshly allocated `width` x `height` bitmap.
    pub fn rasterize(
        &mut self,
        polygon: &Polygon,
        mapping: &DisplayMapping,
        width: u32,
        height: u32,
    ) -> Result<Bitmap, BitmapError> {
        let mut out = Bitmap::blank(width, height)?;
        self.rasterize_into(polygon, mapping, &mut out);
        Ok(out)
    }

    /// Rasterizes the polygon into an existing bitmap, overwriting every cell.
    ///
    /// The bitmap's dimensions define the mask pixel space the vertices are
    /// mapped into.
    pub fn rasterize_into(&mut self, polygon: &Polygon, mapping: &DisplayMapping, out: &mut Bitmap) {
        let (width, height) = out.dimensions();
        for row in 0..height {
            if let Some(cells) = out.row_mut(row) {
                cells.fill(false);
            }
        }

        if !polygon.is_closed() {
            return;
        }

        self.vertices.clear();
        self.vertices.extend(
            polygon
                .points()
                .iter()
                .map(|point| mapping.to_mask_space(*point, width, height)),
        );

        for row in 0..height {
            let center_y = f64::from(row) + 0.5;
            collect_crossings(&self.vertices, center_y, &mut self.crossings);
            if self.crossings.len() < 2 {
                continue;
            }

            let Some(cells) = out.row_mut(row) else {
                continue;
            };

            for span in self.crossings.chunks_exact(2) {
                let start = first_column_at_or_after(span[0], width);
                let end = first_column_at_or_after(span[1], width);
                if start < end {
                    cells[start..end].fill(true);
                }
            }
        }
    }
}

/// Rasterizes the polygon with a throwaway [`Rasterizer`].
pub fn rasterize(
    polygon: &Polygon,
    mapping: &DisplayMapping,
    width: u32,
    height: u32,
) -> Result<Bitmap, BitmapError> {
    Rasterizer::new().rasterize(polygon, mapping, width, height)
}

/// Gathers the sorted x coordinates where polygon edges cross the scanline.
///
/// Edges use a half-open vertical span so a vertex lying exactly on the
/// scanline is counted once.
fn collect_crossings(vertices: &[Point], center_y: f64, out: &mut Vec<f64>) {
    out.clear();
    let count = vertices.len();
    for (index, start) in vertices.iter().enumerate() {
        let end = vertices[(index + 1) % count];
        if (start.y() > center_y) == (end.y() > center_y) {
            continue;
        }

        let x = start.x() + (center_y - start.y()) * (end.x() - start.x()) / (end.y() - start.y());
        if x.is_finite() {
            out.push(x);
        }
    }
    out.sort_by(f64::total_cmp);
}

/// First column whose pixel centre lies at or to the right of `x`.
fn first_column_at_or_after(x: f64, width: u32) -> usize {
    let column = (x - 0.5).ceil().clamp(0.0, f64::from(width));
    column as usize
}
