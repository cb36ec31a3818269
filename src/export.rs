//! Cell export pipeline.
//!
//! Exporting runs in three passes. A sequential plan pass walks the
//! partition row-major and decides which cells export under which file
//! stem, so naming and the auto-scale reference never depend on scheduling.
//! A render pass then scales, pads, and encodes each planned cell in
//! parallel, and a final sequential pass writes the encoded bytes out in
//! plan order.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::codecs::ico::{IcoEncoder, IcoFrame};
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::grid::GridModel;
use crate::SliceError;

/// Square frame sizes embedded in `.ico` exports, smallest first.
const ICO_SIZE_LADDER: [u32; 7] = [16, 24, 32, 48, 64, 128, 256];

/// Output encoding for exported cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Ico,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Ico => "ico",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "ico" => Ok(ExportFormat::Ico),
            other => Err(format!("unknown format {other:?}, expected png or ico")),
        }
    }
}

/// Options governing one export run.
///
/// The serialized form is the `options` record of the sidecar; fields absent
/// from records written by older builds take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Crop each cell to its non-transparent content before scaling.
    pub trim: bool,
    /// Side of the square output canvas in pixels, 0 for no canvas.
    pub limit_px: u32,
    /// Transparent margin reserved around the content, in pixels.
    pub padding: u32,
    /// Output encoding.
    pub fmt: ExportFormat,
    /// Derive one scale factor from the largest cell and apply it to every
    /// cell, preserving relative icon sizes across the set.
    pub auto_scale: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            trim: true,
            limit_px: 256,
            padding: 0,
            fmt: ExportFormat::Png,
            auto_scale: false,
        }
    }
}

/// Outcome of one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// Files written, in row-major plan order.
    pub files: Vec<PathBuf>,
    /// Set when the sidecar save after the export failed. The exported
    /// files themselves are all on disk when this is the only problem.
    pub sidecar_error: Option<String>,
}

/// One cell that survived the skip rules, ready to render.
#[derive(Debug)]
struct PlannedCell {
    stem: String,
    content: RgbaImage,
}

/// Exports every surviving cell of `grid` over `image` into `out_dir`,
/// creating the directory if needed.
///
/// Returns the written paths in row-major plan order. The first failed
/// write aborts the run; files already written stay on disk.
pub fn export_cells(
    image: &RgbaImage,
    grid: &GridModel,
    options: &ExportOptions,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, SliceError> {
    fs::create_dir_all(out_dir).map_err(|e| SliceError::FileWrite {
        path: out_dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let planned = plan_cells(image, grid, options);
    debug!("{} cell(s) planned for export", planned.len());

    let shared_factor = (options.auto_scale && options.limit_px > 0)
        .then(|| auto_scale_factor(&planned, content_target(options)));

    let rendered: Vec<(PathBuf, Vec<u8>)> = planned
        .par_iter()
        .map(|cell| {
            let path = out_dir.join(format!("{}.{}", cell.stem, options.fmt.extension()));
            let canvas = render_cell(&cell.content, options, shared_factor);
            let bytes = encode_cell(&canvas, options.fmt, &path)?;
            Ok((path, bytes))
        })
        .collect::<Result<_, SliceError>>()?;

    let mut files = Vec::with_capacity(rendered.len());
    for (path, bytes) in rendered {
        fs::write(&path, bytes).map_err(|e| SliceError::FileWrite {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        trace!("wrote {}", path.display());
        files.push(path);
    }
    info!("exported {} file(s) to {}", files.len(), out_dir.display());
    Ok(files)
}

/// Walks the partition row-major, applying the skip rules and fixing file
/// stems. Automatic stems number exported cells from 1 in walk order, so a
/// named cell still consumes its index.
fn plan_cells(image: &RgbaImage, grid: &GridModel, options: &ExportOptions) -> Vec<PlannedCell> {
    let partition = grid.partition();
    let mut planned = Vec::new();
    let mut index: u32 = 0;
    for cell in partition.cells() {
        if grid.is_ignored(cell.index) {
            trace!("cell {} is ignored", cell.index);
            continue;
        }
        let content = imageops::crop_imm(
            image,
            cell.column.x,
            cell.row.y,
            cell.column.width,
            cell.row.height,
        )
        .to_image();
        if fully_transparent(&content) {
            trace!("cell {} is empty", cell.index);
            continue;
        }
        let content = if options.trim {
            trim_transparent(&content)
        } else {
            content
        };
        if fully_transparent(&content) {
            continue;
        }
        index += 1;
        let stem = match grid.name(cell.index).map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_owned(),
            None => format!(
                "icon_{index:03}_r{row:02}_c{col:02}",
                row = cell.index.row,
                col = cell.index.col
            ),
        };
        planned.push(PlannedCell { stem, content });
    }
    planned
}

/// True when every pixel is fully transparent.
pub fn fully_transparent(image: &RgbaImage) -> bool {
    image.pixels().all(|p| p.0[3] == 0)
}

/// Crops to the tightest box containing any pixel with non-zero alpha. A
/// fully transparent buffer collapses to its top-left 1x1 pixel so callers
/// always get a valid image back.
pub fn trim_transparent(image: &RgbaImage) -> RgbaImage {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    match bounds {
        Some((x0, y0, x1, y1)) => {
            imageops::crop_imm(image, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
        }
        None => imageops::crop_imm(image, 0, 0, 1, 1).to_image(),
    }
}

/// Side of the square the content may occupy inside the output canvas.
/// Saturating, so a padding wider than the limit leaves a 1 px target.
fn content_target(options: &ExportOptions) -> u32 {
    options.limit_px.saturating_sub(options.padding.saturating_mul(2)).max(1)
}

/// Factor that maps the longest side of `width x height` onto `target`.
fn fit_factor(width: u32, height: u32, target: u32) -> f32 {
    target as f32 / width.max(height) as f32
}

/// Content size after applying `factor`, never collapsing below 1 px.
fn scaled_size(width: u32, height: u32, factor: f32) -> (u32, u32) {
    let scale = |v: u32| (((v as f32) * factor).round() as u32).max(1);
    (scale(width), scale(height))
}

/// Shared factor for auto-scale mode: fits the planned cell with the
/// largest content area onto `target`. Falls back to 1.0 when nothing is
/// planned.
fn auto_scale_factor(cells: &[PlannedCell], target: u32) -> f32 {
    cells
        .iter()
        .map(|cell| cell.content.dimensions())
        .max_by_key(|(w, h)| u64::from(*w) * u64::from(*h))
        .map(|(w, h)| fit_factor(w, h, target))
        .unwrap_or(1.0)
}

/// Scales and positions one cell's content on its output canvas.
///
/// With a canvas limit the content is Lanczos-resampled (up or down) and
/// centered, rounding the spare margin so any odd pixel lands right/bottom.
/// Without one the content is padded only, or passed through untouched.
fn render_cell(content: &RgbaImage, options: &ExportOptions, shared_factor: Option<f32>) -> RgbaImage {
    let (width, height) = content.dimensions();
    if options.limit_px > 0 {
        let factor =
            shared_factor.unwrap_or_else(|| fit_factor(width, height, content_target(options)));
        let (scaled_w, scaled_h) = scaled_size(width, height, factor);
        let scaled = imageops::resize(content, scaled_w, scaled_h, FilterType::Lanczos3);
        let mut canvas = RgbaImage::new(options.limit_px, options.limit_px);
        let x = options.limit_px.saturating_sub(scaled_w) / 2;
        let y = options.limit_px.saturating_sub(scaled_h) / 2;
        imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));
        canvas
    } else if options.padding > 0 {
        let margin = options.padding.saturating_mul(2);
        let mut canvas =
            RgbaImage::new(width.saturating_add(margin), height.saturating_add(margin));
        imageops::replace(
            &mut canvas,
            content,
            i64::from(options.padding),
            i64::from(options.padding),
        );
        canvas
    } else {
        content.clone()
    }
}

/// Encodes `image` for `fmt` into an in-memory buffer. `path` only labels
/// errors.
fn encode_cell(image: &RgbaImage, fmt: ExportFormat, path: &Path) -> Result<Vec<u8>, SliceError> {
    let encode_err = |reason: String| SliceError::Encode {
        path: path.to_path_buf(),
        reason,
    };
    let mut bytes = Vec::new();
    match fmt {
        ExportFormat::Png => {
            PngEncoder::new(&mut bytes)
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(|e| encode_err(e.to_string()))?;
        }
        ExportFormat::Ico => {
            let frames = ico_frames(image);
            let encoded = frames
                .iter()
                .map(|frame| {
                    IcoFrame::as_png(
                        frame.as_raw(),
                        frame.width(),
                        frame.height(),
                        ExtendedColorType::Rgba8,
                    )
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| encode_err(e.to_string()))?;
            IcoEncoder::new(&mut bytes)
                .encode_images(&encoded)
                .map_err(|e| encode_err(e.to_string()))?;
        }
    }
    Ok(bytes)
}

/// Square frames for an `.ico`: every ladder size not exceeding the longest
/// content side, or a single frame at the longest side when even the
/// smallest rung is too big.
fn ico_frames(image: &RgbaImage) -> Vec<RgbaImage> {
    let longest = image.width().max(image.height());
    let mut sizes: Vec<u32> = ICO_SIZE_LADDER
        .iter()
        .copied()
        .filter(|size| *size <= longest)
        .collect();
    if sizes.is_empty() {
        sizes.push(longest);
    }
    sizes.into_iter().map(|size| fit_square(image, size)).collect()
}

/// Fits `image` onto a transparent `size x size` square, preserving aspect.
fn fit_square(image: &RgbaImage, size: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == size && height == size {
        return image.clone();
    }
    let (scaled_w, scaled_h) = scaled_size(width, height, fit_factor(width, height, size));
    let scaled = imageops::resize(image, scaled_w, scaled_h, FilterType::Lanczos3);
    let mut canvas = RgbaImage::new(size, size);
    imageops::replace(
        &mut canvas,
        &scaled,
        i64::from((size - scaled_w) / 2),
        i64::from((size - scaled_h) / 2),
    );
    canvas
}
