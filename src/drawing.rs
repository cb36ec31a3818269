//! Drawing divider lines and cell markers onto a preview image.
//!
//! # Examples
//!
//! ```rust
//! use iconslice::drawing::{Drawable, GridDrawingConfig};
//! use iconslice::{Axis, CellIndex, GridModel};
//! use image::{Rgba, RgbaImage};
//!
//! let mut preview = RgbaImage::from_pixel(64, 64, Rgba([255, 255, 255, 255]));
//! let mut grid = GridModel::new(64, 64);
//! grid.add_divider(Axis::X, 32);
//! grid.set_ignored(CellIndex::new(0, 1), true);
//!
//! grid.draw(&mut preview, &GridDrawingConfig::default());
//! assert_eq!(*preview.get_pixel(32, 10), Rgba([37, 99, 235, 255]));
//! ```

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::rect::Rect;

use crate::grid::{Cell, GridModel};

/// Colors and stroke width for grid previews.
///
/// # Examples
///
/// ```
/// use iconslice::drawing::GridDrawingConfig;
/// use image::Rgba;
///
/// let config = GridDrawingConfig {
///     divider_color: Rgba([255, 0, 0, 255]),
///     line_thickness: 2,
///     ..GridDrawingConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct GridDrawingConfig {
    /// Color of divider lines.
    pub divider_color: Rgba<u8>,
    /// Color of the cross drawn over ignored cells.
    pub ignored_color: Rgba<u8>,
    /// Stroke width of divider lines, in pixels.
    pub line_thickness: u32,
}

impl Default for GridDrawingConfig {
    fn default() -> Self {
        GridDrawingConfig {
            divider_color: Rgba([37, 99, 235, 255]),  // Blue
            ignored_color: Rgba([220, 38, 38, 255]),  // Red
            line_thickness: 1,
        }
    }
}

/// Trait for types that can be drawn on a preview image.
pub trait Drawable {
    /// Draws the object on the provided image using the given configuration.
    fn draw(&self, image: &mut RgbaImage, config: &GridDrawingConfig);
}

impl Drawable for GridModel {
    /// Draws every divider as a full-length line, then crosses out ignored
    /// cells of the current partition.
    fn draw(&self, image: &mut RgbaImage, config: &GridDrawingConfig) {
        let (width, height) = (image.width() as f32, image.height() as f32);
        for offset in 0..config.line_thickness {
            let offset = offset as f32;
            for &x in self.x_lines() {
                let x = x as f32 + offset;
                draw_line_segment_mut(image, (x, 0.0), (x, height), config.divider_color);
            }
            for &y in self.y_lines() {
                let y = y as f32 + offset;
                draw_line_segment_mut(image, (0.0, y), (width, y), config.divider_color);
            }
        }

        let partition = self.partition();
        for cell in partition.cells() {
            if self.is_ignored(cell.index) {
                draw_ignored_cross(image, &cell, config);
            }
        }
    }
}

/// Diagonal cross over a cell, marking it as excluded from export.
fn draw_ignored_cross(image: &mut RgbaImage, cell: &Cell<'_>, config: &GridDrawingConfig) {
    let rect = Rect::from(cell);
    let left = rect.left() as f32;
    let top = rect.top() as f32;
    let right = left + rect.width() as f32 - 1.0;
    let bottom = top + rect.height() as f32 - 1.0;
    draw_line_segment_mut(image, (left, top), (right, bottom), config.ignored_color);
    draw_line_segment_mut(image, (left, bottom), (right, top), config.ignored_color);
}
