//! JSON sidecar persistence.
//!
//! Grid, mask, and export state live next to the source image in a `.grid`
//! file so a sheet reopens exactly where it was left. Reads are forgiving:
//! missing fields take defaults, unknown fields are ignored, and a malformed
//! cell key skips that entry rather than failing the load.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::export::ExportOptions;
use crate::grid::{CellIndex, GridModel};
use crate::mask::MaskSettings;
use crate::SliceError;

/// Extension of the sidecar record, swapped onto the image path.
pub const SIDECAR_EXTENSION: &str = "grid";

/// Sidecar path for an image: same directory and stem, `.grid` extension.
///
/// # Example
/// ```
/// use std::path::Path;
///
/// let path = iconslice::sidecar::sidecar_path(Path::new("sheets/ui.png"));
/// assert_eq!(path, Path::new("sheets/ui.grid"));
/// ```
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension(SIDECAR_EXTENSION)
}

/// Wire format of the sidecar record. Cell names are keyed by `"row,col"`
/// strings; a `BTreeMap` keeps the serialized record stable for a given
/// state.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SidecarDoc {
    #[serde(default)]
    x_lines: Vec<u32>,
    #[serde(default)]
    y_lines: Vec<u32>,
    #[serde(default)]
    cells: BTreeMap<String, String>,
    #[serde(default)]
    ignored: Vec<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mask: Option<MaskRecord>,
    #[serde(default)]
    options: ExportOptions,
}

/// Mask state as persisted. Present only while a key is picked.
#[derive(Debug, Serialize, Deserialize)]
struct MaskRecord {
    key: [u8; 3],
    #[serde(default = "default_tolerance")]
    tol: u8,
    #[serde(default = "default_feather")]
    feather: u8,
    #[serde(default = "default_antialias")]
    aa: bool,
}

fn default_tolerance() -> u8 {
    MaskSettings::default().tolerance
}

fn default_feather() -> u8 {
    MaskSettings::default().feather
}

fn default_antialias() -> bool {
    MaskSettings::default().antialias
}

fn mask_record(mask: &MaskSettings) -> Option<MaskRecord> {
    mask.key.map(|key| MaskRecord {
        key,
        tol: mask.tolerance,
        feather: mask.feather,
        aa: mask.antialias,
    })
}

fn mask_settings(record: Option<MaskRecord>) -> MaskSettings {
    match record {
        Some(record) => MaskSettings {
            key: Some(record.key),
            tolerance: record.tol,
            feather: record.feather,
            antialias: record.aa,
        },
        None => MaskSettings::default(),
    }
}

/// Editable state reconstructed from a sidecar record.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarState {
    pub x_lines: Vec<u32>,
    pub y_lines: Vec<u32>,
    pub names: HashMap<CellIndex, String>,
    pub ignored: HashSet<CellIndex>,
    pub mask: MaskSettings,
    pub options: ExportOptions,
}

/// Writes the sidecar record for the given state to `path`.
///
/// Divider lists are stored ascending and restricted to the interior of
/// each axis, and the ignored list is stored row-major, so the record is
/// deterministic for a given state.
pub fn save(
    path: &Path,
    grid: &GridModel,
    mask: &MaskSettings,
    options: &ExportOptions,
) -> Result<(), SliceError> {
    let write_err = |reason: String| SliceError::SidecarWrite {
        path: path.to_path_buf(),
        reason,
    };
    let mut ignored: Vec<(u32, u32)> = grid.ignored().iter().map(|i| (i.row, i.col)).collect();
    ignored.sort_unstable();
    let doc = SidecarDoc {
        x_lines: interior(grid.x_lines(), grid.width()),
        y_lines: interior(grid.y_lines(), grid.height()),
        cells: grid
            .names()
            .iter()
            .map(|(index, name)| (index.to_string(), name.clone()))
            .collect(),
        ignored,
        mask: mask_record(mask),
        options: options.clone(),
    };
    let body = serde_json::to_string_pretty(&doc).map_err(|e| write_err(e.to_string()))?;
    fs::write(path, body).map_err(|e| write_err(e.to_string()))?;
    info!("grid saved to {}", path.display());
    Ok(())
}

/// Reads a sidecar record from `path`.
///
/// An unreadable file or invalid JSON surfaces as
/// [`SliceError::SidecarRead`]; a malformed cell key inside a valid record
/// is logged and skipped so one bad entry cannot drop the rest.
pub fn load(path: &Path) -> Result<SidecarState, SliceError> {
    let read_err = |reason: String| SliceError::SidecarRead {
        path: path.to_path_buf(),
        reason,
    };
    let body = fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
    let doc: SidecarDoc = serde_json::from_str(&body).map_err(|e| read_err(e.to_string()))?;

    let mut names = HashMap::new();
    for (key, name) in doc.cells {
        match key.parse::<CellIndex>() {
            Ok(index) => {
                names.insert(index, name);
            }
            Err(err) => warn!("skipping cell entry in {}: {err}", path.display()),
        }
    }
    let ignored = doc
        .ignored
        .into_iter()
        .map(|(row, col)| CellIndex::new(row, col))
        .collect();

    info!("grid loaded from {}", path.display());
    Ok(SidecarState {
        x_lines: doc.x_lines,
        y_lines: doc.y_lines,
        names,
        ignored,
        mask: mask_settings(doc.mask),
        options: doc.options,
    })
}

/// Keeps only coordinates strictly inside `(0, dimension)`, ascending and
/// unique. Stale records can hold out-of-range dividers; they never round-
/// trip back out.
fn interior(lines: &[u32], dimension: u32) -> Vec<u32> {
    let mut out: Vec<u32> = lines
        .iter()
        .copied()
        .filter(|v| *v > 0 && *v < dimension)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}
