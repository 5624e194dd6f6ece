use crate::error::{Error, Result};
use crate::protocol::command::ColumnDefinition;
use crate::protocol::value::Value;

/// Column-oriented buffer for one result set.
///
/// Cells are appended per column; row `k` is position `k` of every column.
/// A `Value::Null` cell is present, a cell that was never added is absent.
#[derive(Debug, Clone, Default)]
pub struct ResultSetCollector {
    columns: Vec<ColumnDefinition>,
    values: Vec<Vec<Value>>,
}

impl ResultSetCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a result set with `columns`, discarding anything collected before.
    pub fn begin_columns(&mut self, columns: Vec<ColumnDefinition>) {
        self.values.clear();
        self.values.resize_with(columns.len(), Vec::new);
        self.columns = columns;
    }

    pub fn add_value(&mut self, column: usize, value: Value) -> Result<()> {
        let count = self.values.len();
        let cells = self
            .values
            .get_mut(column)
            .ok_or(Error::ColumnIndexOutOfRange {
                index: column,
                count,
            })?;
        cells.push(value);
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    /// Number of rows, as seen by column 0
    pub fn row_count(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Cells of one column in row order
    pub fn column_values(&self, column: usize) -> Option<&[Value]> {
        self.values.get(column).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.columns.clear();
        self.values.clear();
    }

    /// Consume the collector into a lazy row iterator.
    pub fn into_rows(self) -> Rows {
        Rows {
            columns: self.values.into_iter().map(Vec::into_iter).collect(),
            exhausted: false,
        }
    }
}

impl IntoIterator for ResultSetCollector {
    type Item = Box<[Value]>;
    type IntoIter = Rows;

    fn into_iter(self) -> Rows {
        self.into_rows()
    }
}

/// Rows of a [`ResultSetCollector`], assembled one at a time.
///
/// Iteration ends at the first row that is missing a cell in any column.
#[derive(Debug)]
pub struct Rows {
    columns: Vec<std::vec::IntoIter<Value>>,
    exhausted: bool,
}

impl Iterator for Rows {
    type Item = Box<[Value]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.columns.is_empty() {
            return None;
        }
        let mut row = Vec::with_capacity(self.columns.len());
        for column in &mut self.columns {
            let Some(value) = column.next() else {
                self.exhausted = true;
                return None;
            };
            row.push(value);
        }
        Some(row.into_boxed_slice())
    }
}
