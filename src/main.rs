use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use iconslice::drawing::GridDrawingConfig;
use iconslice::{debug, mask, Axis, ExportFormat, Session};

#[derive(Parser)]
#[command(name = "iconslice", version, about = "Slice icon sheets into individual icon files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export every grid cell of a sheet to individual files.
    Export(ExportArgs),
    /// Render the grid over the sheet for inspection.
    Preview(PreviewArgs),
    /// Print the grid and options stored for a sheet.
    Info {
        /// Source sheet image.
        image: PathBuf,
    },
}

/// Divider placement flags, shared by `export` and `preview`. They add to
/// whatever the sheet's sidecar already holds.
#[derive(Args)]
struct GridArgs {
    /// Vertical divider coordinates in pixels, comma separated.
    #[arg(long, value_delimiter = ',')]
    x_lines: Vec<u32>,
    /// Horizontal divider coordinates in pixels, comma separated.
    #[arg(long, value_delimiter = ',')]
    y_lines: Vec<u32>,
    /// Split the sheet into this many equal columns.
    #[arg(long)]
    cols: Option<u32>,
    /// Split the sheet into this many equal rows.
    #[arg(long)]
    rows: Option<u32>,
}

#[derive(Args)]
struct MaskArgs {
    /// Background color to key out, as R,G,B.
    #[arg(long, value_delimiter = ',', value_name = "R,G,B", conflicts_with = "key_at")]
    key: Option<Vec<u8>>,
    /// Pick the key color from a pixel of the sheet, as X,Y.
    #[arg(long, value_delimiter = ',', value_name = "X,Y")]
    key_at: Option<Vec<u32>>,
    /// Drop the stored key color.
    #[arg(long, conflicts_with_all = ["key", "key_at"])]
    clear_key: bool,
    /// Distance below which a pixel counts as background (0-80).
    #[arg(long)]
    tolerance: Option<u8>,
    /// Mask edge feather radius (0-12).
    #[arg(long)]
    feather: Option<u8>,
    /// Disable feathering regardless of the configured radius.
    #[arg(long)]
    no_antialias: bool,
}

#[derive(Args)]
struct ExportArgs {
    /// Source sheet image.
    image: PathBuf,
    /// Output directory for the exported files.
    #[arg(short, long)]
    out: PathBuf,
    #[command(flatten)]
    grid: GridArgs,
    #[command(flatten)]
    mask: MaskArgs,
    /// Output format.
    #[arg(long)]
    fmt: Option<ExportFormat>,
    /// Crop cells to their non-transparent content.
    #[arg(long)]
    trim: bool,
    /// Keep full cell bounds even when the borders are transparent.
    #[arg(long, conflicts_with = "trim")]
    no_trim: bool,
    /// Output canvas size in pixels, 0 for none.
    #[arg(long)]
    limit: Option<u32>,
    /// Transparent margin around the content, in pixels.
    #[arg(long)]
    padding: Option<u32>,
    /// Scale every cell by one factor derived from the largest cell.
    #[arg(long)]
    auto_scale: bool,
}

#[derive(Args)]
struct PreviewArgs {
    /// Source sheet image.
    image: PathBuf,
    /// Where to write the annotated preview.
    #[arg(short, long, default_value = "grid_preview.png")]
    out: PathBuf,
    #[command(flatten)]
    grid: GridArgs,
    #[command(flatten)]
    mask: MaskArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Export(args) => run_export(args),
        Command::Preview(args) => run_preview(args),
        Command::Info { image } => run_info(image),
    }
}

fn run_export(args: ExportArgs) -> Result<()> {
    let mut session = Session::load(&args.image)
        .with_context(|| format!("failed to open {}", args.image.display()))?;
    apply_grid_args(&mut session, &args.grid);
    apply_mask_args(&mut session, &args.mask)?;

    let options = session.options_mut();
    if args.trim {
        options.trim = true;
    }
    if args.no_trim {
        options.trim = false;
    }
    if let Some(limit) = args.limit {
        options.limit_px = limit;
    }
    if let Some(padding) = args.padding {
        options.padding = padding;
    }
    if let Some(fmt) = args.fmt {
        options.fmt = fmt;
    }
    if args.auto_scale {
        options.auto_scale = true;
    }

    let report = session.export(&args.out)?;
    println!("exported {} file(s) to {}", report.files.len(), args.out.display());
    Ok(())
}

fn run_preview(args: PreviewArgs) -> Result<()> {
    let mut session = Session::load(&args.image)
        .with_context(|| format!("failed to open {}", args.image.display()))?;
    apply_grid_args(&mut session, &args.grid);
    apply_mask_args(&mut session, &args.mask)?;

    debug::save_image_with_grid(
        session.preview(),
        session.grid(),
        &args.out,
        &GridDrawingConfig::default(),
    )?;
    println!("preview written to {}", args.out.display());
    Ok(())
}

fn run_info(image: PathBuf) -> Result<()> {
    let session =
        Session::load(&image).with_context(|| format!("failed to open {}", image.display()))?;
    let grid = session.grid();
    let partition = grid.partition();

    println!("{}: {}x{}", image.display(), grid.width(), grid.height());
    println!("x lines: {:?}", grid.x_lines());
    println!("y lines: {:?}", grid.y_lines());
    println!(
        "cells: {} ({} rows x {} columns)",
        partition.cell_count(),
        partition.rows.len(),
        partition.columns.len()
    );
    let mut names: Vec<_> = grid.names().iter().collect();
    names.sort();
    for (index, name) in names {
        println!("  {index} -> {name:?}");
    }
    let mut ignored: Vec<_> = grid.ignored().iter().collect();
    ignored.sort();
    for index in ignored {
        println!("  {index} ignored");
    }
    match session.mask().key {
        Some([r, g, b]) => println!(
            "mask: key=({r},{g},{b}) tolerance={} feather={} antialias={}",
            session.mask().tolerance,
            session.mask().feather,
            session.mask().antialias
        ),
        None => println!("mask: none"),
    }
    println!("options: {:?}", session.options());
    Ok(())
}

fn apply_grid_args(session: &mut Session, args: &GridArgs) {
    let (width, height) = (session.grid().width(), session.grid().height());
    for &x in &args.x_lines {
        session.grid_mut().add_divider(Axis::X, x);
    }
    for &y in &args.y_lines {
        session.grid_mut().add_divider(Axis::Y, y);
    }
    if let Some(cols) = args.cols {
        // More parts than pixels collapses to one divider per pixel.
        let cols = cols.min(width);
        for i in 1..cols {
            session.grid_mut().add_divider(Axis::X, split_position(i, width, cols));
        }
    }
    if let Some(rows) = args.rows {
        let rows = rows.min(height);
        for i in 1..rows {
            session.grid_mut().add_divider(Axis::Y, split_position(i, height, rows));
        }
    }
}

/// Coordinate of the `i`-th of `parts` equal splits of `dimension`. The
/// product is taken in u64 so wide sheets cannot overflow it.
fn split_position(i: u32, dimension: u32, parts: u32) -> u32 {
    (u64::from(i) * u64::from(dimension) / u64::from(parts)) as u32
}

fn apply_mask_args(session: &mut Session, args: &MaskArgs) -> Result<()> {
    let mut settings = *session.mask();
    if let Some(key) = &args.key {
        let [r, g, b] = key.as_slice() else {
            bail!("--key expects three components, got {}", key.len());
        };
        settings.key = Some([*r, *g, *b]);
    }
    if args.clear_key {
        settings.key = None;
    }
    if let Some(tolerance) = args.tolerance {
        if tolerance > mask::MAX_TOLERANCE {
            bail!("--tolerance must be at most {}", mask::MAX_TOLERANCE);
        }
        settings.tolerance = tolerance;
    }
    if let Some(feather) = args.feather {
        if feather > mask::MAX_FEATHER {
            bail!("--feather must be at most {}", mask::MAX_FEATHER);
        }
        settings.feather = feather;
    }
    if args.no_antialias {
        settings.antialias = false;
    }
    session.set_mask(settings);

    if let Some(at) = &args.key_at {
        let [x, y] = at.as_slice() else {
            bail!("--key-at expects X,Y, got {} component(s)", at.len());
        };
        if session.pick_key(*x, *y).is_none() {
            bail!(
                "--key-at {x},{y} is outside the sheet ({}x{})",
                session.grid().width(),
                session.grid().height()
            );
        }
    }
    Ok(())
}
