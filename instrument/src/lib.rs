//! Column-oriented recording of simulation output.
//!
//! Two ways in:
//! - tracing events: [`EventTableSubscriber`] turns every event into a row of
//!   the table named after the event's target. Columns appear as fields are
//!   first seen; rows missing a field hold null.
//! - fixed-schema rows: anything implementing [`Row`] can be collected into a
//!   [`DynamicTable`] with [`table_from_rows`].
//!
//! Both convert to polars DataFrames and can be written as parquet.
//!
//! ```ignore
//! // In simulation code:
//! tracing::info!(target: "eviction", step, household, unit);
//!
//! // In a test:
//! let _guard = instrument::install_thread_subscriber();
//! // ... run simulation ...
//! let tables = instrument::drain();
//! let evictions = &tables.tables["eviction"];
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Id, Level, Metadata, Subscriber};

// ============================================================================
// Cells and columns
// ============================================================================

/// One value of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    U64(Option<u64>),
    I64(Option<i64>),
    F64(Option<f64>),
    Bool(Option<bool>),
    Str(Option<String>),
}

impl From<u64> for Cell {
    fn from(v: u64) -> Self {
        Cell::U64(Some(v))
    }
}

impl From<Option<u64>> for Cell {
    fn from(v: Option<u64>) -> Self {
        Cell::U64(v)
    }
}

impl From<u32> for Cell {
    fn from(v: u32) -> Self {
        Cell::U64(Some(v as u64))
    }
}

impl From<usize> for Cell {
    fn from(v: usize) -> Self {
        Cell::U64(Some(v as u64))
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::I64(Some(v))
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::F64(Some(v))
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        Cell::F64(v)
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(Some(v))
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Str(Some(v.to_string()))
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Str(Some(v))
    }
}

/// A nullable column of typed values.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedColumn {
    U64(Vec<Option<u64>>),
    I64(Vec<Option<i64>>),
    F64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
}

impl TypedColumn {
    /// Empty column of the cell's type with `rows` leading nulls.
    fn for_cell(cell: &Cell, rows: usize) -> Self {
        match cell {
            Cell::U64(_) => TypedColumn::U64(vec![None; rows]),
            Cell::I64(_) => TypedColumn::I64(vec![None; rows]),
            Cell::F64(_) => TypedColumn::F64(vec![None; rows]),
            Cell::Bool(_) => TypedColumn::Bool(vec![None; rows]),
            Cell::Str(_) => TypedColumn::Str(vec![None; rows]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedColumn::U64(v) => v.len(),
            TypedColumn::I64(v) => v.len(),
            TypedColumn::F64(v) => v.len(),
            TypedColumn::Bool(v) => v.len(),
            TypedColumn::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_null(&mut self) {
        match self {
            TypedColumn::U64(v) => v.push(None),
            TypedColumn::I64(v) => v.push(None),
            TypedColumn::F64(v) => v.push(None),
            TypedColumn::Bool(v) => v.push(None),
            TypedColumn::Str(v) => v.push(None),
        }
    }

    /// Append a cell. A cell of another type than the column is stored as null.
    fn push(&mut self, cell: Cell) {
        match (self, cell) {
            (TypedColumn::U64(v), Cell::U64(x)) => v.push(x),
            (TypedColumn::I64(v), Cell::I64(x)) => v.push(x),
            (TypedColumn::F64(v), Cell::F64(x)) => v.push(x),
            (TypedColumn::Bool(v), Cell::Bool(x)) => v.push(x),
            (TypedColumn::Str(v), Cell::Str(x)) => v.push(x),
            (col, _) => col.push_null(),
        }
    }

    pub fn u64s(&self) -> Option<&[Option<u64>]> {
        match self {
            TypedColumn::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn f64s(&self) -> Option<&[Option<f64>]> {
        match self {
            TypedColumn::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn strs(&self) -> Option<&[Option<String>]> {
        match self {
            TypedColumn::Str(v) => Some(v),
            _ => None,
        }
    }
}

// ============================================================================
// DynamicTable
// ============================================================================

/// A table whose columns are added as they are first seen. Column order is
/// the order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicTable {
    names: Vec<String>,
    columns: HashMap<String, TypedColumn>,
    row_count: usize,
}

impl DynamicTable {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&TypedColumn> {
        self.columns.get(name)
    }

    /// Append one row. Columns absent from the row get a null.
    pub fn push_row<'a>(&mut self, cells: impl IntoIterator<Item = (&'a str, Cell)>) {
        for (name, cell) in cells {
            if !self.columns.contains_key(name) {
                self.names.push(name.to_string());
                self.columns
                    .insert(name.to_string(), TypedColumn::for_cell(&cell, self.row_count));
            }
            if let Some(col) = self.columns.get_mut(name) {
                // A field repeated within one row keeps its first value.
                if col.len() == self.row_count {
                    col.push(cell);
                }
            }
        }
        self.row_count += 1;
        for col in self.columns.values_mut() {
            while col.len() < self.row_count {
                col.push_null();
            }
        }
    }
}

/// A fixed-schema record that can become a table row.
pub trait Row {
    fn cells(&self) -> Vec<(&'static str, Cell)>;
}

pub fn table_from_rows<R: Row>(rows: &[R]) -> DynamicTable {
    let mut table = DynamicTable::default();
    for row in rows {
        table.push_row(row.cells());
    }
    table
}

// ============================================================================
// Event recording
// ============================================================================

/// Tables keyed by name (tracing target for recorded events).
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    pub tables: BTreeMap<String, DynamicTable>,
}

impl TableSet {
    pub fn insert(&mut self, name: impl Into<String>, table: DynamicTable) {
        self.tables.insert(name.into(), table);
    }

    pub fn get(&self, name: &str) -> Option<&DynamicTable> {
        self.tables.get(name)
    }

    pub fn rows(&self, name: &str) -> usize {
        self.tables.get(name).map_or(0, DynamicTable::row_count)
    }
}

thread_local! {
    static EVENTS: RefCell<TableSet> = RefCell::default();
}

/// Collects an event's fields as cells.
#[derive(Default)]
struct CellVisitor {
    cells: Vec<(&'static str, Cell)>,
}

impl Visit for CellVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.cells.push((field.name(), Cell::U64(Some(value))));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.cells.push((field.name(), Cell::I64(Some(value))));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.cells.push((field.name(), Cell::F64(Some(value))));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.cells.push((field.name(), Cell::Bool(Some(value))));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.cells.push((field.name(), Cell::Str(Some(value.to_string()))));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{:?}", value));
    }
}

/// Tracing subscriber that appends every event at or above `max_level`
/// to the thread-local table named after the event's target.
pub struct EventTableSubscriber {
    max_level: Level,
}

impl EventTableSubscriber {
    pub fn new(max_level: Level) -> Self {
        Self { max_level }
    }
}

impl Default for EventTableSubscriber {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl Subscriber for EventTableSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= self.max_level
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut visitor = CellVisitor::default();
        event.record(&mut visitor);
        let target = event.metadata().target();
        EVENTS.with(|e| {
            e.borrow_mut()
                .tables
                .entry(target.to_string())
                .or_default()
                .push_row(visitor.cells);
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Install an [`EventTableSubscriber`] as the process-wide default.
/// Has no effect if a global subscriber is already set.
pub fn install_subscriber() {
    let _ = tracing::subscriber::set_global_default(EventTableSubscriber::default());
}

/// Install an [`EventTableSubscriber`] for the current thread until the guard drops.
pub fn install_thread_subscriber() -> DefaultGuard {
    tracing::subscriber::set_default(EventTableSubscriber::default())
}

/// Take every table recorded on this thread so far.
pub fn drain() -> TableSet {
    EVENTS.with(|e| std::mem::take(&mut *e.borrow_mut()))
}

pub fn clear() {
    EVENTS.with(|e| *e.borrow_mut() = TableSet::default());
}

// ============================================================================
// Polars
// ============================================================================

use polars::prelude::*;

impl DynamicTable {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = self
            .names
            .iter()
            .filter_map(|name| self.columns.get(name).map(|col| (name, col)))
            .map(|(name, col)| match col {
                TypedColumn::U64(v) => Column::new(name.into(), v),
                TypedColumn::I64(v) => Column::new(name.into(), v),
                TypedColumn::F64(v) => Column::new(name.into(), v),
                TypedColumn::Bool(v) => Column::new(name.into(), v),
                TypedColumn::Str(v) => Column::new(name.into(), v),
            })
            .collect();
        DataFrame::new(columns)
    }
}

impl TableSet {
    pub fn to_dataframes(&self) -> PolarsResult<BTreeMap<String, DataFrame>> {
        self.tables
            .iter()
            .map(|(name, table)| Ok((name.clone(), table.to_dataframe()?)))
            .collect()
    }
}

fn io_error(e: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: e.into(),
        msg: None,
    }
}

/// Write every DataFrame to `{dir}/{name}.parquet`.
pub fn save_parquet(dfs: &mut BTreeMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_error)?;
    for (name, df) in dfs.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{name}.parquet"))).map_err(io_error)?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

// ============================================================================
// RunRecorder
// ============================================================================

/// UTC timestamp `YYYYMMDD_HHMMSS` for run directory names.
fn run_stamp(t: std::time::SystemTime) -> String {
    let secs = t
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (days, rem) = ((secs / 86_400) as i64, secs % 86_400);

    // Days since 1970-01-01 to a civil date, in 400-year eras starting March 1.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{year:04}{month:02}{day:02}_{:02}{:02}{:02}",
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60
    )
}

/// Keep ASCII letters, digits, `-` and `_`; cap the length.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(60)
        .collect()
}

/// Records one run's events on the current thread and writes them, plus any
/// extra tables handed over, as parquet under `{parent}/{stamp}_{name}/` when
/// dropped. A `_ready` file marks a complete write.
///
/// ```ignore
/// let mut rec = instrument::RunRecorder::new("data", "rezoning_wave");
/// sim.run(30)?;
/// rec.add_tables(history.to_tables());
/// // rec drops → data/20260101_120000_rezoning_wave/*.parquet + _ready
/// ```
pub struct RunRecorder {
    run_dir: PathBuf,
    extra: TableSet,
    _guard: DefaultGuard,
}

impl RunRecorder {
    pub fn new(parent: impl Into<PathBuf>, name: &str) -> Self {
        let run_dir = parent.into().join(format!(
            "{}_{}",
            run_stamp(std::time::SystemTime::now()),
            sanitize(name)
        ));
        clear();
        Self {
            run_dir,
            extra: TableSet::default(),
            _guard: install_thread_subscriber(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Tables to write alongside the recorded events. Same-named tables replace events.
    pub fn add_tables(&mut self, tables: TableSet) {
        self.extra.tables.extend(tables.tables);
    }

    fn write(&mut self) -> PolarsResult<usize> {
        let mut tables = drain();
        tables.tables.append(&mut self.extra.tables);
        if tables.tables.is_empty() {
            return Ok(0);
        }
        let mut dfs = tables.to_dataframes()?;
        save_parquet(&mut dfs, &self.run_dir)?;
        std::fs::File::create(self.run_dir.join("_ready")).map_err(io_error)?;
        Ok(dfs.len())
    }
}

impl Drop for RunRecorder {
    fn drop(&mut self) {
        match self.write() {
            Ok(0) => {}
            Ok(n) => eprintln!("RunRecorder: wrote {} tables to {}", n, self.run_dir.display()),
            Err(e) => eprintln!("RunRecorder({}): {}", self.run_dir.display(), e),
        }
    }
}
