use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::SpreadsheetError;
use crate::table::unique_column_names;
use crate::table::Column;
use crate::table::ColumnType;
use crate::table::Table;
use crate::table::Value;
use std::collections::HashMap;

/// Blank cells a sheet may add on top of the ones it stores before it is refused.
const BLANK_CELL_ALLOWANCE: usize = 1 << 20;
/// Blank cells allowed per stored cell beyond the fixed allowance.
const BLANK_CELLS_PER_CELL: usize = 64;

/// The non-empty cells of one worksheet together with the range they span.
pub(crate) struct Sheet {
    /// Sheet name
    pub(crate) name: String,
    /// All non-empty cells in the sheet
    pub(crate) cells: Vec<Cell>,
    /// Actual data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    /// Adds a cell to the sheet, updating the data range.
    pub(crate) fn push(&mut self, cell: Cell) {
        self.update_bound(cell.row, cell.col);
        self.cells.push(cell);
    }

    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|row_lower_bound| row < row_lower_bound).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|row_upper_bound| row_upper_bound < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|col_lower_bound| col < col_lower_bound).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|col_upper_bound| col_upper_bound < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Builds a table from the sheet: the first row of the data range is the header,
    /// every following row (blank ones included) is a record, and each column gets the
    /// common type of its cells.
    pub(crate) fn into_table(self) -> Result<Table, SpreadsheetError> {
        let (Some(row_lower), Some(row_upper), Some(col_lower), Some(col_upper)) = (
            self.row_lower_bound,
            self.row_upper_bound,
            self.col_lower_bound,
            self.col_upper_bound,
        ) else {
            return Err(SpreadsheetError::EmptyFile);
        };

        let height = row_upper - row_lower + 1;
        let width = col_upper - col_lower + 1;
        let limit = self
            .cells
            .len()
            .saturating_mul(BLANK_CELLS_PER_CELL)
            .saturating_add(BLANK_CELL_ALLOWANCE);
        if height.checked_mul(width).map_or(true, |span| span > limit) {
            return Err(SpreadsheetError::InvalidWorkbook(format!(
                "sheet '{}' spans {} rows and {} columns but stores only {} cells",
                self.name,
                height,
                width,
                self.cells.len()
            )));
        }

        let index: HashMap<(usize, usize), &Cell> = self
            .cells
            .iter()
            .map(|cell| ((cell.row, cell.col), cell))
            .collect();
        let get = |row: usize, col: usize| index.get(&(row, col)).copied();

        let names = (col_lower..=col_upper)
            .map(|col| get(row_lower, col).map(|cell| cell.to_string()).unwrap_or_default())
            .collect();
        let names = unique_column_names(names);

        let data_rows = (row_lower + 1)..=row_upper;
        let columns: Vec<Column> = names
            .into_iter()
            .zip(col_lower..=col_upper)
            .map(|(name, col)| {
                let kind = ColumnType::detect(
                    data_rows
                        .clone()
                        .map(|row| get(row, col).and_then(|cell| cell.candidate_type())),
                );
                Column { name, kind }
            })
            .collect();

        let rows = data_rows
            .map(|row| {
                columns
                    .iter()
                    .zip(col_lower..=col_upper)
                    .map(|(column, col)| {
                        get(row, col)
                            .map(|cell| cell.to_value(column.kind))
                            .unwrap_or(Value::Null)
                    })
                    .collect()
            })
            .collect();

        Ok(Table::new(columns, rows)?)
    }
}
