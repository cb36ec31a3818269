use std::path::Path;

use image::RgbaImage;

use crate::drawing::{Drawable, GridDrawingConfig};
use crate::grid::GridModel;
use crate::SliceError;

/// Saves `image` with the grid drawn on it.
///
/// The dividers and ignored-cell markers land on a copy; the input buffer
/// is left untouched.
///
/// # Errors
/// Returns [`SliceError::FileWrite`] if the preview cannot be saved.
///
/// # Examples
///
/// ```rust,no_run
/// use iconslice::drawing::GridDrawingConfig;
/// use iconslice::{debug, Session};
///
/// let session = Session::load("sheet.png").unwrap();
/// debug::save_image_with_grid(
///     session.preview(),
///     session.grid(),
///     "sheet_with_grid.png".as_ref(),
///     &GridDrawingConfig::default(),
/// )
/// .unwrap();
/// ```
pub fn save_image_with_grid(
    image: &RgbaImage,
    grid: &GridModel,
    output_path: &Path,
    config: &GridDrawingConfig,
) -> Result<(), SliceError> {
    let mut preview = image.clone();
    grid.draw(&mut preview, config);
    preview.save(output_path).map_err(|e| SliceError::FileWrite {
        path: output_path.to_path_buf(),
        reason: e.to_string(),
    })
}
