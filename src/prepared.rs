use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::protocol::command::{ColumnDefinition, ParameterDefinition};
use crate::protocol::param::{BindValue, ParamType};

/// A statement prepared on one backend connection.
///
/// The statement id is only meaningful on the connection that prepared it.
/// Metadata is fixed once the handle exists; long data and the rebind flag
/// change with every execution.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    statement_id: u32,
    warning_count: u16,
    params: Vec<ParameterDefinition>,
    columns: Vec<ColumnDefinition>,
    long_data: BTreeMap<usize, Vec<u8>>,
    rebind: bool,
    bound_types: Option<Vec<ParamType>>,
}

/// What one `COM_STMT_EXECUTE` needs besides the values themselves
#[derive(Debug)]
pub(crate) struct Binding<'a> {
    /// New-params-bound flag: types are sent with this execution
    pub send_types: bool,
    /// Buffered bytes per long-data parameter, in parameter order
    pub long_data: Vec<(usize, &'a [u8])>,
    /// Type list to record once the execution has been sent
    pub types: Vec<ParamType>,
}

impl PreparedStatement {
    pub(crate) fn new(
        statement_id: u32,
        warning_count: u16,
        params: Vec<ParameterDefinition>,
        columns: Vec<ColumnDefinition>,
    ) -> Self {
        Self {
            statement_id,
            warning_count,
            params,
            columns,
            long_data: BTreeMap::new(),
            rebind: true,
            bound_types: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.statement_id
    }

    pub fn warning_count(&self) -> u16 {
        self.warning_count
    }

    pub fn params(&self) -> &[ParameterDefinition] {
        &self.params
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Whether the next execution resends parameter types
    pub fn needs_rebind(&self) -> bool {
        self.rebind
    }

    /// Bytes accumulated so far for parameter `index`
    pub fn long_data(&self, index: usize) -> Option<&[u8]> {
        self.long_data.get(&index).map(Vec::as_slice)
    }

    /// Append one chunk of long data for parameter `index`.
    pub fn append_long_data(&mut self, index: usize, chunk: &[u8]) -> Result<()> {
        if index >= self.params.len() {
            return Err(Error::ParameterIndexOutOfRange {
                index,
                count: self.params.len(),
            });
        }
        self.long_data.entry(index).or_default().extend_from_slice(chunk);
        self.rebind = true;
        Ok(())
    }

    /// Drop buffered long data without executing.
    pub fn clear_long_data(&mut self) {
        self.long_data.clear();
    }

    /// Bind `values` for the next execution.
    ///
    /// Only parameters bound as `BindValue::LongData` carry buffered bytes;
    /// one without chunks is sent empty. The handle is left untouched until
    /// [`commit`](Self::commit).
    pub(crate) fn bind(&self, values: &[BindValue]) -> Result<Binding<'_>> {
        if values.len() != self.params.len() {
            return Err(Error::ParameterCountMismatch {
                expected: self.params.len(),
                got: values.len(),
            });
        }

        let long_data = values
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_long_data())
            .map(|(index, _)| (index, self.long_data(index).unwrap_or_default()))
            .collect();

        let types: Vec<ParamType> = values.iter().map(BindValue::param_type).collect();
        let send_types = self.rebind || self.bound_types.as_ref() != Some(&types);
        Ok(Binding {
            send_types,
            long_data,
            types,
        })
    }

    /// Record a sent execution: the types are known to the server and every
    /// buffered chunk has been flushed or discarded.
    pub(crate) fn commit(&mut self, types: Vec<ParamType>) {
        self.long_data.clear();
        self.bound_types = Some(types);
        self.rebind = false;
    }
}
