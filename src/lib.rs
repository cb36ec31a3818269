//! Slice icon sheets into individual icon files along a user-defined grid.
//! Built on the `image` and `imageproc` crates, with `serde` for the sidecar
//! record and `insta` for snapshot testing.
//!
//! The crate splits into four pieces:
//! - [`mask`]: keys the sheet's background color out by rewriting the alpha
//!   channel.
//! - [`grid`]: the divider model. Dividers are pixel coordinates per axis
//!   and the rectangular partition is derived from them on demand.
//! - [`sidecar`]: JSON persistence of grid, mask, and export state next to
//!   the source image.
//! - [`export`]: the per-cell trim, scale, pad, and encode pipeline.
//!
//! [`Session`] ties them together the way a front-end consumes them:
//!
//! ```
//! use iconslice::{Axis, Session};
//! use image::{Rgba, RgbaImage};
//!
//! let sheet = RgbaImage::from_pixel(64, 64, Rgba([10, 20, 30, 255]));
//! let mut session = Session::from_image("sheet.png", sheet).unwrap();
//! session.grid_mut().add_divider(Axis::X, 32);
//! session.grid_mut().add_divider(Axis::Y, 32);
//! assert_eq!(session.grid().partition().cell_count(), 4);
//! ```

pub mod debug;
pub mod drawing;
pub mod export;
pub mod grid;
pub mod mask;
pub mod sidecar;

use std::path::{Path, PathBuf};

use image::RgbaImage;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{error, info, warn};

pub use export::{ExportFormat, ExportOptions, ExportReport};
pub use grid::{Axis, Cell, CellIndex, Column, GridModel, Partition, Row};
pub use mask::MaskSettings;

// Covers typical sheets without spilling to the heap.
const DEFAULT_SMALLVEC_SIZE: usize = 32;

/// A type alias for SmallVec with an optimized stack-allocated buffer size.
pub type SmallVecLine<T> = SmallVec<[T; DEFAULT_SMALLVEC_SIZE]>;

#[derive(Error, Debug)]
pub enum SliceError {
    #[error("Failed to load image {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    #[error("Invalid image dimensions: width={width}, height={height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Failed to read grid file {path}: {reason}")]
    SidecarRead { path: PathBuf, reason: String },

    #[error("Failed to write grid file {path}: {reason}")]
    SidecarWrite { path: PathBuf, reason: String },

    #[error("Failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    FileWrite { path: PathBuf, reason: String },
}

/// One opened sheet with its grid, mask, and export options.
///
/// The original pixels are kept unmodified; the mask only ever rewrites the
/// preview copy, so clearing the key restores the sheet exactly. All paths
/// derive from the image path the session was opened with.
#[derive(Debug, Clone)]
pub struct Session {
    image_path: PathBuf,
    original: RgbaImage,
    preview: RgbaImage,
    mask: MaskSettings,
    grid: GridModel,
    options: ExportOptions,
}

impl Session {
    /// Opens an image from disk, restoring any sidecar state found next to
    /// it. A sidecar that fails to parse is logged and ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SliceError> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| SliceError::ImageLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgba8();
        let mut session = Self::from_image(path, image)?;
        let sidecar_path = session.sidecar_path();
        if sidecar_path.exists() {
            match sidecar::load(&sidecar_path) {
                Ok(state) => session.restore(state),
                Err(err) => warn!("ignoring sidecar: {err}"),
            }
        }
        info!(
            "opened {} ({}x{})",
            path.display(),
            session.original.width(),
            session.original.height()
        );
        Ok(session)
    }

    /// Builds a session from an already-decoded buffer. `path` determines
    /// where the sidecar and default export directory live.
    pub fn from_image(path: impl AsRef<Path>, image: RgbaImage) -> Result<Self, SliceError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            error!("invalid image dimensions: width={width}, height={height}");
            return Err(SliceError::InvalidDimensions { width, height });
        }
        Ok(Self {
            image_path: path.as_ref().to_path_buf(),
            preview: image.clone(),
            original: image,
            mask: MaskSettings::default(),
            grid: GridModel::new(width, height),
            options: ExportOptions::default(),
        })
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// The sheet as loaded, untouched by the mask.
    pub fn original(&self) -> &RgbaImage {
        &self.original
    }

    /// The sheet with the current mask applied. This is the buffer the
    /// export pipeline slices.
    pub fn preview(&self) -> &RgbaImage {
        &self.preview
    }

    pub fn grid(&self) -> &GridModel {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut GridModel {
        &mut self.grid
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ExportOptions {
        &mut self.options
    }

    pub fn mask(&self) -> &MaskSettings {
        &self.mask
    }

    /// Replaces the mask settings and rebuilds the preview from the
    /// original pixels.
    pub fn set_mask(&mut self, settings: MaskSettings) {
        self.mask = settings;
        self.rebuild_preview();
    }

    /// Picks the key color from a pixel of the original sheet, so repeated
    /// picks on keyed-out areas see the true color. Returns the picked
    /// color, or `None` if the coordinates are outside the sheet.
    pub fn pick_key(&mut self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.original.width() || y >= self.original.height() {
            return None;
        }
        let [r, g, b, _] = self.original.get_pixel(x, y).0;
        self.set_mask(MaskSettings {
            key: Some([r, g, b]),
            ..self.mask
        });
        Some([r, g, b])
    }

    /// Drops the key color. The preview reverts to the original pixels.
    pub fn clear_key(&mut self) {
        self.set_mask(MaskSettings {
            key: None,
            ..self.mask
        });
    }

    fn rebuild_preview(&mut self) {
        self.preview = mask::apply(&self.original, &self.mask);
    }

    /// Path of the sidecar record for this sheet.
    pub fn sidecar_path(&self) -> PathBuf {
        sidecar::sidecar_path(&self.image_path)
    }

    /// Persists the current grid, mask, and export options.
    pub fn save_sidecar(&self) -> Result<(), SliceError> {
        sidecar::save(&self.sidecar_path(), &self.grid, &self.mask, &self.options)
    }

    /// Runs the export pipeline over the masked sheet, then persists the
    /// sidecar. A failed sidecar save is reported on the result instead of
    /// failing the run, since the exported files are already on disk.
    pub fn export(&self, out_dir: &Path) -> Result<ExportReport, SliceError> {
        let files = export::export_cells(&self.preview, &self.grid, &self.options, out_dir)?;
        let sidecar_error = match self.save_sidecar() {
            Ok(()) => None,
            Err(err) => {
                warn!("export succeeded but the sidecar save failed: {err}");
                Some(err.to_string())
            }
        };
        Ok(ExportReport {
            files,
            sidecar_error,
        })
    }

    fn restore(&mut self, state: sidecar::SidecarState) {
        self.grid
            .restore(state.x_lines, state.y_lines, state.names, state.ignored);
        self.options = state.options;
        self.set_mask(state.mask);
    }
}
