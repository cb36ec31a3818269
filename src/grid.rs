use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use imageproc::rect::Rect;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::SmallVecLine;

/// Default snap radius in pixels for [`GridModel::remove_nearest`].
pub const DEFAULT_SNAP_DISTANCE: u32 = 15;

/// One of the two divider axes. `X` dividers are vertical lines that split
/// the sheet into columns, `Y` dividers are horizontal lines that split it
/// into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// Address of one cell in the derived partition, row-major from the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellIndex {
    pub row: u32,
    pub col: u32,
}

impl CellIndex {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

/// Error returned when a `"row,col"` cell key cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid cell key {0:?}, expected \"row,col\"")]
pub struct ParseCellIndexError(String);

impl FromStr for CellIndex {
    type Err = ParseCellIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad_key = || ParseCellIndexError(s.to_owned());
        let (row, col) = s.split_once(',').ok_or_else(bad_key)?;
        Ok(Self {
            row: row.trim().parse().map_err(|_| bad_key())?,
            col: col.trim().parse().map_err(|_| bad_key())?,
        })
    }
}

/// One horizontal band of the partition.
///
/// # Example
/// ```
/// use iconslice::{Axis, GridModel};
///
/// let mut grid = GridModel::new(100, 80);
/// grid.add_divider(Axis::Y, 40);
/// let rows = grid.partition().rows;
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[1].y, 40);
/// assert_eq!(rows[1].height, 40);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub y: u32,
    pub height: u32,
}

/// One vertical band of the partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub x: u32,
    pub width: u32,
}

/// One rectangular cell of the partition, referencing a row and a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell<'a> {
    pub index: CellIndex,
    pub row: &'a Row,
    pub column: &'a Column,
}

impl From<&Cell<'_>> for Rect {
    /// Converts a cell into the pixel rectangle it covers.
    ///
    /// # Example
    /// ```
    /// use iconslice::{Axis, GridModel};
    /// use imageproc::rect::Rect;
    ///
    /// let mut grid = GridModel::new(100, 100);
    /// grid.add_divider(Axis::X, 60);
    /// let partition = grid.partition();
    /// let cell = partition.cell(iconslice::CellIndex::new(0, 1)).unwrap();
    /// assert_eq!(Rect::from(&cell), Rect::at(60, 0).of_size(40, 100));
    /// ```
    fn from(cell: &Cell<'_>) -> Self {
        Rect::at(cell.column.x as i32, cell.row.y as i32).of_size(cell.column.width, cell.row.height)
    }
}

/// The rectangular partition derived from the divider sets.
///
/// Rows and columns each tile their axis completely: the first band starts
/// at 0, consecutive bands are adjacent, and lengths sum to the image
/// dimension. Dividers on or outside the image edge contribute no band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub rows: SmallVecLine<Row>,
    pub columns: SmallVecLine<Column>,
}

impl Partition {
    /// Looks up one cell by its row-major address.
    pub fn cell(&self, index: CellIndex) -> Option<Cell<'_>> {
        let row = self.rows.get(index.row as usize)?;
        let column = self.columns.get(index.col as usize)?;
        Some(Cell { index, row, column })
    }

    /// Iterates cells in row-major order, the traversal order used when
    /// exporting.
    pub fn cells(&self) -> impl Iterator<Item = Cell<'_>> {
        self.rows.iter().enumerate().flat_map(move |(r, row)| {
            self.columns.iter().enumerate().map(move |(c, column)| Cell {
                index: CellIndex::new(r as u32, c as u32),
                row,
                column,
            })
        })
    }

    pub fn cell_count(&self) -> usize {
        self.rows.len() * self.columns.len()
    }
}

/// Builds a band from its start coordinate and length along one axis.
///
/// Lets [`GridModel::partition`] assemble rows and columns with the same
/// routine.
trait Band {
    fn new(start: u32, length: u32) -> Self;
}

impl Band for Row {
    fn new(start: u32, length: u32) -> Self {
        Self {
            y: start,
            height: length,
        }
    }
}

impl Band for Column {
    fn new(start: u32, length: u32) -> Self {
        Self {
            x: start,
            width: length,
        }
    }
}

/// Band boundaries for one axis: the implicit outer edges plus every stored
/// divider strictly inside them, ascending and unique.
fn boundaries(lines: &[u32], dimension: u32) -> SmallVecLine<u32> {
    let mut bounds = SmallVecLine::new();
    bounds.push(0);
    bounds.extend(lines.iter().copied().filter(|v| *v > 0 && *v < dimension));
    bounds.push(dimension);
    bounds.sort_unstable();
    bounds.dedup();
    bounds
}

fn bands<B: Band>(lines: &[u32], dimension: u32) -> SmallVecLine<B> {
    boundaries(lines, dimension)
        .windows(2)
        .map(|pair| B::new(pair[0], pair[1] - pair[0]))
        .collect()
}

/// Drag progress for the one divider being moved interactively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DragState {
    #[default]
    Idle,
    Dragging {
        axis: Axis,
        value: u32,
    },
}

/// Divider sets and per-cell metadata for one sheet.
///
/// Dividers are pixel coordinates stored per axis. The grid starts empty,
/// which still yields a single cell covering the whole sheet. Metadata is
/// keyed by [`CellIndex`] and survives divider edits unchanged, so indices
/// may point at different pixels after the partition shifts.
///
/// # Example
/// ```
/// use iconslice::{Axis, GridModel};
///
/// let mut grid = GridModel::new(100, 100);
/// grid.add_divider(Axis::X, 50);
/// grid.add_divider(Axis::X, 50);
/// assert_eq!(grid.x_lines(), &[50][..]);
/// assert_eq!(grid.partition().cell_count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GridModel {
    width: u32,
    height: u32,
    x_lines: SmallVecLine<u32>,
    y_lines: SmallVecLine<u32>,
    names: HashMap<CellIndex, String>,
    ignored: HashSet<CellIndex>,
    drag: DragState,
}

impl GridModel {
    /// Creates an empty grid over a `width` x `height` sheet.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            x_lines: SmallVecLine::new(),
            y_lines: SmallVecLine::new(),
            names: HashMap::new(),
            ignored: HashSet::new(),
            drag: DragState::Idle,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Vertical divider coordinates, ascending outside of an active drag.
    pub fn x_lines(&self) -> &[u32] {
        &self.x_lines
    }

    /// Horizontal divider coordinates, ascending outside of an active drag.
    pub fn y_lines(&self) -> &[u32] {
        &self.y_lines
    }

    fn dimension(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.width,
            Axis::Y => self.height,
        }
    }

    fn lines(&self, axis: Axis) -> &SmallVecLine<u32> {
        match axis {
            Axis::X => &self.x_lines,
            Axis::Y => &self.y_lines,
        }
    }

    fn lines_mut(&mut self, axis: Axis) -> &mut SmallVecLine<u32> {
        match axis {
            Axis::X => &mut self.x_lines,
            Axis::Y => &mut self.y_lines,
        }
    }

    /// Adds a divider at `coordinate`, clamped to the image bounds. Adding
    /// a coordinate that is already present is a no-op.
    pub fn add_divider(&mut self, axis: Axis, coordinate: u32) {
        let clamped = coordinate.min(self.dimension(axis));
        if self.lines(axis).contains(&clamped) {
            trace!("{axis:?} divider at {clamped} already present");
            return;
        }
        let lines = self.lines_mut(axis);
        lines.push(clamped);
        lines.sort_unstable();
        debug!("added {axis:?} divider at {clamped}");
    }

    /// Removes the divider nearest to `coordinate` if it lies within
    /// `max_snap_distance` pixels, returning the removed coordinate.
    ///
    /// # Example
    /// ```
    /// use iconslice::grid::DEFAULT_SNAP_DISTANCE;
    /// use iconslice::{Axis, GridModel};
    ///
    /// let mut grid = GridModel::new(200, 200);
    /// grid.add_divider(Axis::X, 100);
    /// assert_eq!(grid.remove_nearest(Axis::X, 110, DEFAULT_SNAP_DISTANCE), Some(100));
    /// assert_eq!(grid.remove_nearest(Axis::X, 110, DEFAULT_SNAP_DISTANCE), None);
    /// ```
    pub fn remove_nearest(&mut self, axis: Axis, coordinate: u32, max_snap_distance: u32) -> Option<u32> {
        let nearest = self
            .lines(axis)
            .iter()
            .copied()
            .min_by_key(|v| v.abs_diff(coordinate))?;
        if nearest.abs_diff(coordinate) > max_snap_distance {
            trace!("no {axis:?} divider within {max_snap_distance}px of {coordinate}");
            return None;
        }
        self.lines_mut(axis).retain(|v| *v != nearest);
        debug!("removed {axis:?} divider at {nearest}");
        Some(nearest)
    }

    /// Replaces the divider at `old` with `new` (clamped) during a drag.
    ///
    /// The moved coordinate is appended without re-sorting so the divider
    /// keeps its identity while it crosses its neighbors; [`commit`] restores
    /// the sorted order when the drag ends.
    ///
    /// [`commit`]: GridModel::commit
    pub fn move_divider(&mut self, axis: Axis, old: u32, new: u32) {
        let new = new.min(self.dimension(axis));
        let lines = self.lines_mut(axis);
        if let Some(position) = lines.iter().position(|v| *v == old) {
            lines.remove(position);
        }
        if !lines.contains(&new) {
            lines.push(new);
        }
        self.drag = DragState::Dragging { axis, value: new };
        trace!("moving {axis:?} divider {old} -> {new}");
    }

    /// Ends an active drag, restoring both divider lists to ascending order.
    /// A release without a prior drag is a no-op.
    pub fn commit(&mut self) {
        if self.drag == DragState::Idle {
            trace!("release without an active drag");
            return;
        }
        for lines in [&mut self.x_lines, &mut self.y_lines] {
            lines.sort_unstable();
            lines.dedup();
        }
        self.drag = DragState::Idle;
        debug!("divider drag committed");
    }

    /// Removes every divider on both axes. Cell metadata is kept.
    pub fn clear_dividers(&mut self) {
        self.x_lines.clear();
        self.y_lines.clear();
        debug!("cleared all dividers");
    }

    /// Assigns a name to a cell. An empty name clears the assignment, which
    /// puts the cell back on automatic naming at export.
    pub fn rename_cell(&mut self, index: CellIndex, name: impl Into<String>) {
        let name = name.into();
        if name.is_empty() {
            self.names.remove(&index);
        } else {
            self.names.insert(index, name);
        }
    }

    pub fn name(&self, index: CellIndex) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }

    pub fn names(&self) -> &HashMap<CellIndex, String> {
        &self.names
    }

    /// Marks or unmarks a cell as excluded from export.
    pub fn set_ignored(&mut self, index: CellIndex, ignored: bool) {
        if ignored {
            self.ignored.insert(index);
        } else {
            self.ignored.remove(&index);
        }
    }

    pub fn is_ignored(&self, index: CellIndex) -> bool {
        self.ignored.contains(&index)
    }

    pub fn ignored(&self) -> &HashSet<CellIndex> {
        &self.ignored
    }

    /// Replaces the editable state with values read from a sidecar record.
    /// Divider lists are normalized; partition derivation screens out
    /// anything a stale record placed outside the image.
    pub fn restore(
        &mut self,
        x_lines: Vec<u32>,
        y_lines: Vec<u32>,
        names: HashMap<CellIndex, String>,
        ignored: HashSet<CellIndex>,
    ) {
        self.x_lines = normalized(x_lines);
        self.y_lines = normalized(y_lines);
        self.names = names;
        self.ignored = ignored;
        self.drag = DragState::Idle;
    }

    /// Derives the current partition. Both axes always have at least one
    /// band, so an empty grid is a single full-sheet cell.
    pub fn partition(&self) -> Partition {
        Partition {
            rows: bands(&self.y_lines, self.height),
            columns: bands(&self.x_lines, self.width),
        }
    }
}

fn normalized(lines: Vec<u32>) -> SmallVecLine<u32> {
    let mut lines = SmallVecLine::from_vec(lines);
    lines.sort_unstable();
    lines.dedup();
    lines
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use insta::assert_yaml_snapshot;
    use pretty_assertions::assert_eq;
    use proptest::{prelude::*, proptest};
    use test_case::test_case;

    use super::*;

    #[test]
    fn empty_grid_is_one_full_sheet_cell() {
        let grid = GridModel::new(120, 90);
        let partition = grid.partition();
        assert_eq!(partition.cell_count(), 1);
        assert_eq!(partition.rows[0], Row { y: 0, height: 90 });
        assert_eq!(partition.columns[0], Column { x: 0, width: 120 });
    }

    #[test]
    fn add_divider_keeps_lines_sorted() {
        let mut grid = GridModel::new(100, 100);
        grid.add_divider(Axis::X, 70);
        grid.add_divider(Axis::X, 20);
        grid.add_divider(Axis::X, 40);
        assert_eq!(grid.x_lines(), &[20, 40, 70][..]);
    }

    #[test]
    fn add_divider_clamps_to_image_bounds() {
        let mut grid = GridModel::new(100, 100);
        grid.add_divider(Axis::X, 500);
        grid.add_divider(Axis::Y, 100);
        assert_eq!(grid.x_lines(), &[100][..]);
        assert_eq!(grid.y_lines(), &[100][..]);
        // Edge values are stored but produce no band.
        assert_eq!(grid.partition().cell_count(), 1);
    }

    #[test]
    fn duplicate_divider_is_a_no_op() {
        let mut grid = GridModel::new(100, 100);
        grid.add_divider(Axis::Y, 50);
        grid.add_divider(Axis::Y, 50);
        assert_eq!(grid.y_lines(), &[50][..]);
    }

    #[test_case(58, Some(50); "within snap distance")]
    #[test_case(65, Some(50); "at snap distance")]
    #[test_case(66, None; "just beyond snap distance")]
    #[test_case(10, Some(20); "snaps from below")]
    fn remove_nearest_respects_snap_distance(coordinate: u32, removed: Option<u32>) {
        let mut grid = GridModel::new(200, 200);
        grid.add_divider(Axis::X, 20);
        grid.add_divider(Axis::X, 50);
        assert_eq!(grid.remove_nearest(Axis::X, coordinate, DEFAULT_SNAP_DISTANCE), removed);
    }

    #[test]
    fn remove_nearest_on_empty_axis_returns_none() {
        let mut grid = GridModel::new(100, 100);
        assert_eq!(grid.remove_nearest(Axis::Y, 50, DEFAULT_SNAP_DISTANCE), None);
    }

    #[test]
    fn remove_nearest_tie_prefers_lower_coordinate() {
        let mut grid = GridModel::new(100, 100);
        grid.add_divider(Axis::X, 40);
        grid.add_divider(Axis::X, 60);
        assert_eq!(grid.remove_nearest(Axis::X, 50, DEFAULT_SNAP_DISTANCE), Some(40));
        assert_eq!(grid.x_lines(), &[60][..]);
    }

    #[test]
    fn move_divider_defers_sorting_until_commit() {
        let mut grid = GridModel::new(100, 100);
        grid.add_divider(Axis::X, 10);
        grid.add_divider(Axis::X, 30);
        grid.move_divider(Axis::X, 30, 5);
        assert_eq!(grid.x_lines(), &[10, 5][..]);
        grid.commit();
        assert_eq!(grid.x_lines(), &[5, 10][..]);
    }

    #[test]
    fn move_divider_onto_existing_coordinate_merges() {
        let mut grid = GridModel::new(100, 100);
        grid.add_divider(Axis::Y, 20);
        grid.add_divider(Axis::Y, 40);
        grid.move_divider(Axis::Y, 40, 20);
        grid.commit();
        assert_eq!(grid.y_lines(), &[20][..]);
    }

    #[test]
    fn partition_is_valid_mid_drag() {
        let mut grid = GridModel::new(100, 100);
        grid.add_divider(Axis::X, 30);
        grid.add_divider(Axis::X, 60);
        grid.move_divider(Axis::X, 60, 10);
        let widths: Vec<u32> = grid.partition().columns.iter().map(|c| c.width).collect();
        assert_eq!(widths, vec![10, 20, 70]);
    }

    #[test]
    fn commit_without_drag_is_a_no_op() {
        let mut grid = GridModel::new(100, 100);
        grid.add_divider(Axis::X, 50);
        grid.commit();
        assert_eq!(grid.x_lines(), &[50][..]);
    }

    #[test]
    fn clear_dividers_keeps_metadata() {
        let mut grid = GridModel::new(100, 100);
        grid.add_divider(Axis::X, 50);
        grid.rename_cell(CellIndex::new(0, 0), "home");
        grid.set_ignored(CellIndex::new(0, 1), true);
        grid.clear_dividers();
        assert_eq!(grid.x_lines(), &[] as &[u32]);
        assert_eq!(grid.name(CellIndex::new(0, 0)), Some("home"));
        assert!(grid.is_ignored(CellIndex::new(0, 1)));
    }

    #[test]
    fn rename_cell_with_empty_string_clears_the_name() {
        let mut grid = GridModel::new(100, 100);
        grid.rename_cell(CellIndex::new(1, 2), "save");
        grid.rename_cell(CellIndex::new(1, 2), "");
        assert_eq!(grid.name(CellIndex::new(1, 2)), None);
    }

    #[test]
    fn partition_snapshot() {
        let mut grid = GridModel::new(100, 80);
        grid.add_divider(Axis::X, 30);
        grid.add_divider(Axis::X, 60);
        grid.add_divider(Axis::Y, 40);
        let partition = grid.partition();
        assert_yaml_snapshot!(partition.rows, @r###"
        - y: 0
          height: 40
        - y: 40
          height: 40
        "###);
        assert_yaml_snapshot!(partition.columns, @r###"
        - x: 0
          width: 30
        - x: 30
          width: 30
        - x: 60
          width: 40
        "###);
    }

    #[test]
    fn cells_iterate_row_major() {
        let mut grid = GridModel::new(40, 40);
        grid.add_divider(Axis::X, 20);
        grid.add_divider(Axis::Y, 20);
        let order: Vec<CellIndex> = grid.partition().cells().map(|cell| cell.index).collect();
        assert_eq!(
            order,
            vec![
                CellIndex::new(0, 0),
                CellIndex::new(0, 1),
                CellIndex::new(1, 0),
                CellIndex::new(1, 1),
            ]
        );
    }

    #[test]
    fn cell_lookup_out_of_range_returns_none() {
        let grid = GridModel::new(40, 40);
        let partition = grid.partition();
        assert!(partition.cell(CellIndex::new(0, 0)).is_some());
        assert!(partition.cell(CellIndex::new(0, 1)).is_none());
        assert!(partition.cell(CellIndex::new(1, 0)).is_none());
    }

    #[test]
    fn cell_index_parses_and_displays() {
        let index: CellIndex = "3,12".parse().unwrap();
        assert_eq!(index, CellIndex::new(3, 12));
        assert_eq!(index.to_string(), "3,12");
        assert!(" 4 , 7 ".parse::<CellIndex>().is_ok());
        assert!("4".parse::<CellIndex>().is_err());
        assert!("a,b".parse::<CellIndex>().is_err());
        assert!("1,2,3".parse::<CellIndex>().is_err());
    }

    #[test]
    fn restore_normalizes_divider_lists() {
        let mut grid = GridModel::new(100, 100);
        grid.restore(vec![70, 10, 70, 40], vec![], HashMap::new(), HashSet::new());
        assert_eq!(grid.x_lines(), &[10, 40, 70][..]);
    }

    /// Ops a pointer session can produce, for exercising invariants.
    #[derive(Debug, Clone)]
    enum DividerOp {
        Add(u32),
        Remove(u32),
        Drag { from: u32, to: u32 },
    }

    fn divider_op() -> impl Strategy<Value = DividerOp> {
        prop_oneof![
            (0..300u32).prop_map(DividerOp::Add),
            (0..300u32).prop_map(DividerOp::Remove),
            (0..300u32, 0..300u32).prop_map(|(from, to)| DividerOp::Drag { from, to }),
        ]
    }

    proptest! {
        #[test]
        fn partition_tiles_the_sheet_exactly(
            width in 1..400u32,
            height in 1..400u32,
            xs in prop::collection::vec(0..500u32, 0..20),
            ys in prop::collection::vec(0..500u32, 0..20),
        ) {
            let mut grid = GridModel::new(width, height);
            for x in xs {
                grid.add_divider(Axis::X, x);
            }
            for y in ys {
                grid.add_divider(Axis::Y, y);
            }
            let partition = grid.partition();

            prop_assert_eq!(partition.columns[0].x, 0);
            prop_assert_eq!(partition.rows[0].y, 0);
            for pair in partition.columns.windows(2) {
                prop_assert_eq!(pair[1].x, pair[0].x + pair[0].width);
            }
            for pair in partition.rows.windows(2) {
                prop_assert_eq!(pair[1].y, pair[0].y + pair[0].height);
            }
            prop_assert_eq!(partition.columns.iter().map(|c| c.width).sum::<u32>(), width);
            prop_assert_eq!(partition.rows.iter().map(|r| r.height).sum::<u32>(), height);
            prop_assert!(partition.columns.iter().all(|c| c.width >= 1));
            prop_assert!(partition.rows.iter().all(|r| r.height >= 1));
        }

        #[test]
        fn dividers_are_sorted_and_unique_after_commit(
            ops in prop::collection::vec(divider_op(), 0..40),
        ) {
            let mut grid = GridModel::new(250, 250);
            for op in ops {
                match op {
                    DividerOp::Add(at) => grid.add_divider(Axis::X, at),
                    DividerOp::Remove(at) => {
                        grid.remove_nearest(Axis::X, at, DEFAULT_SNAP_DISTANCE);
                    }
                    DividerOp::Drag { from, to } => {
                        grid.move_divider(Axis::X, from, to);
                        grid.commit();
                    }
                }
            }
            grid.commit();
            let lines = grid.x_lines();
            prop_assert!(lines.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }
}
