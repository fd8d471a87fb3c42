///
/// Typed wrapper over a native result buffer.
///
/// A `Rowset` owns exactly one buffer handle. The shape (column names,
/// kinds, nullability, vault flags) and the row count are captured once
/// at construction and every access is validated against that capture
/// before the engine is asked for a cell, so a host/engine schema drift
/// surfaces as `TypeMismatch` instead of corrupt data.
///
/// Disposal is explicit via `close`; any substantive operation after
/// that is `UseAfterDispose`. Dropping an unclosed rowset releases the
/// buffer as a backstop, so early returns cannot leak handles.
///

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::blob::BlobRef;
use crate::engine::{ColumnDecl, EngineApi, RowsetHandle, Schema};
use crate::error::BridgeError;
use crate::value::{ColumnKind, FromNative, Value};
use crate::vault::VaultedString;

pub struct Rowset {
    engine: Arc<dyn EngineApi>,
    handle: RowsetHandle,
    schema: Schema,
    row_count: usize,
    closed: bool,
}

impl fmt::Debug for Rowset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rowset")
            .field("handle", &self.handle)
            .field("schema", &self.schema)
            .field("row_count", &self.row_count)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Rowset {
    /// Wraps a buffer handle, capturing its schema and row count.
    pub fn from_handle(
        engine: Arc<dyn EngineApi>,
        handle: RowsetHandle,
    ) -> Result<Self, BridgeError> {
        let schema = engine.rowset_schema(handle)?;
        let row_count = engine.rowset_count(handle)?;
        Ok(Self {
            engine,
            handle,
            schema,
            row_count,
            closed: false,
        })
    }

    pub fn handle(&self) -> RowsetHandle {
        self.handle
    }

    pub fn row_count(&self) -> Result<usize, BridgeError> {
        self.check_open()?;
        Ok(self.row_count)
    }

    pub fn column_count(&self) -> Result<usize, BridgeError> {
        self.check_open()?;
        Ok(self.schema.len())
    }

    pub fn schema(&self) -> Result<&Schema, BridgeError> {
        self.check_open()?;
        Ok(&self.schema)
    }

    pub fn is_null(&self, row: usize, col: usize) -> Result<bool, BridgeError> {
        self.check_cell(row, col)?;
        self.engine.rowset_is_null(self.handle, row, col)
    }

    pub fn is_vaulted(&self, col: usize) -> Result<bool, BridgeError> {
        self.check_open()?;
        let decl = self.schema.col(col).ok_or(BridgeError::IndexOutOfRange {
            row: 0,
            col,
            rows: self.row_count,
            cols: self.schema.len(),
        })?;
        Ok(decl.vaulted)
    }

    pub fn get_bool(&self, row: usize, col: usize) -> Result<bool, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Bool)?;
        bool::from_native(&value, &ctx)
    }

    pub fn get_int(&self, row: usize, col: usize) -> Result<i32, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Int)?;
        i32::from_native(&value, &ctx)
    }

    pub fn get_long(&self, row: usize, col: usize) -> Result<i64, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Long)?;
        i64::from_native(&value, &ctx)
    }

    pub fn get_double(&self, row: usize, col: usize) -> Result<f64, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Double)?;
        f64::from_native(&value, &ctx)
    }

    /// Clear text. Rejected on vaulted columns; those go through
    /// `get_vaulted`.
    pub fn get_text(&self, row: usize, col: usize) -> Result<String, BridgeError> {
        let decl = self.expect_kind(row, col, ColumnKind::Text)?;
        if decl.vaulted {
            return Err(BridgeError::mismatch(
                "text",
                "vaulted text",
                self.cell_context(row, col),
            ));
        }
        let value = self.engine.rowset_value(self.handle, row, col)?;
        String::from_native(&value, &self.cell_context(row, col))
    }

    pub fn get_nullable_bool(&self, row: usize, col: usize) -> Result<Option<bool>, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Bool)?;
        Option::<bool>::from_native(&value, &ctx)
    }

    pub fn get_nullable_int(&self, row: usize, col: usize) -> Result<Option<i32>, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Int)?;
        Option::<i32>::from_native(&value, &ctx)
    }

    pub fn get_nullable_long(&self, row: usize, col: usize) -> Result<Option<i64>, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Long)?;
        Option::<i64>::from_native(&value, &ctx)
    }

    pub fn get_nullable_double(&self, row: usize, col: usize) -> Result<Option<f64>, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Double)?;
        Option::<f64>::from_native(&value, &ctx)
    }

    pub fn get_nullable_text(&self, row: usize, col: usize) -> Result<Option<String>, BridgeError> {
        let decl = self.expect_kind(row, col, ColumnKind::Text)?;
        if decl.vaulted {
            return Err(BridgeError::mismatch(
                "text",
                "vaulted text",
                self.cell_context(row, col),
            ));
        }
        let value = self.engine.rowset_value(self.handle, row, col)?;
        Option::<String>::from_native(&value, &self.cell_context(row, col))
    }

    pub fn get_blob(&self, row: usize, col: usize) -> Result<BlobRef, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Blob)?;
        BlobRef::from_native(&value, &ctx)
    }

    pub fn get_nullable_blob(
        &self,
        row: usize,
        col: usize,
    ) -> Result<Option<BlobRef>, BridgeError> {
        let (value, ctx) = self.scalar(row, col, ColumnKind::Blob)?;
        Option::<BlobRef>::from_native(&value, &ctx)
    }

    /// Sensitive text, wrapped before it ever reaches host code. Only
    /// valid on columns the shape declares vaulted.
    pub fn get_vaulted(
        &self,
        row: usize,
        col: usize,
    ) -> Result<Option<VaultedString>, BridgeError> {
        let decl = self.expect_kind(row, col, ColumnKind::Text)?;
        if !decl.vaulted {
            return Err(BridgeError::mismatch(
                "vaulted text",
                "text",
                self.cell_context(row, col),
            ));
        }
        let value = self.engine.rowset_value(self.handle, row, col)?;
        let ctx = self.cell_context(row, col);
        Ok(Option::<String>::from_native(&value, &ctx)?.map(VaultedString::new))
    }

    /// Nested rowset named by a rows-kind cell. The engine retains the
    /// child buffer, so the returned rowset stays valid after this one
    /// is closed.
    pub fn get_child(&self, row: usize, col: usize) -> Result<Rowset, BridgeError> {
        self.expect_kind(row, col, ColumnKind::Rows)?;
        let child = self.engine.rowset_child(self.handle, row, col)?;
        Rowset::from_handle(self.engine.clone(), child)
    }

    pub fn row_hash(&self, row: usize) -> Result<u64, BridgeError> {
        self.check_row(row)?;
        self.engine.rowset_row_hash(self.handle, row)
    }

    /// Whole-row equality against a row of another rowset.
    pub fn rows_eq(&self, row: usize, other: &Rowset, other_row: usize) -> Result<bool, BridgeError> {
        self.check_row(row)?;
        other.check_row(other_row)?;
        self.engine
            .rowset_rows_eq(self.handle, row, other.handle, other_row)
    }

    /// Identity-column equality: do the two rows denote the same entity.
    /// The shape must declare identity columns.
    pub fn rows_same(
        &self,
        row: usize,
        other: &Rowset,
        other_row: usize,
    ) -> Result<bool, BridgeError> {
        self.check_row(row)?;
        other.check_row(other_row)?;
        if !self.schema.has_identity() {
            return Err(BridgeError::mismatch(
                "shape with identity columns",
                "shape without",
                "rows_same",
            ));
        }
        self.engine
            .rowset_rows_same(self.handle, row, other.handle, other_row)
    }

    /// Copies `count` rows starting at `from` into a fresh independent
    /// rowset with the same shape.
    pub fn copy_range(&self, from: usize, count: usize) -> Result<Rowset, BridgeError> {
        self.check_open()?;
        if from.checked_add(count).is_none_or(|end| end > self.row_count) {
            return Err(BridgeError::IndexOutOfRange {
                row: from.saturating_add(count),
                col: 0,
                rows: self.row_count,
                cols: self.schema.len(),
            });
        }
        let copy = self.engine.rowset_copy(self.handle, from, count)?;
        Rowset::from_handle(self.engine.clone(), copy)
    }

    /// Releases the native buffer. Exactly once; a second close reports
    /// `UseAfterDispose` like any other post-close operation.
    pub fn close(&mut self) -> Result<(), BridgeError> {
        self.check_open()?;
        self.closed = true;
        trace!(handle = self.handle.raw(), "rowset closed");
        self.engine.rowset_release(self.handle)
    }

    fn check_open(&self) -> Result<(), BridgeError> {
        if self.closed {
            Err(BridgeError::UseAfterDispose)
        } else {
            Ok(())
        }
    }

    fn check_row(&self, row: usize) -> Result<(), BridgeError> {
        self.check_open()?;
        if row >= self.row_count {
            return Err(BridgeError::IndexOutOfRange {
                row,
                col: 0,
                rows: self.row_count,
                cols: self.schema.len(),
            });
        }
        Ok(())
    }

    fn check_cell(&self, row: usize, col: usize) -> Result<&ColumnDecl, BridgeError> {
        self.check_open()?;
        if row >= self.row_count || col >= self.schema.len() {
            return Err(BridgeError::IndexOutOfRange {
                row,
                col,
                rows: self.row_count,
                cols: self.schema.len(),
            });
        }
        // In range by the check above.
        Ok(&self.schema.cols[col])
    }

    fn expect_kind(
        &self,
        row: usize,
        col: usize,
        kind: ColumnKind,
    ) -> Result<&ColumnDecl, BridgeError> {
        let decl = self.check_cell(row, col)?;
        if decl.kind != kind {
            return Err(BridgeError::mismatch(
                kind.name(),
                decl.kind.name(),
                self.cell_context(row, col),
            ));
        }
        Ok(decl)
    }

    fn scalar(
        &self,
        row: usize,
        col: usize,
        kind: ColumnKind,
    ) -> Result<(Value, String), BridgeError> {
        self.expect_kind(row, col, kind)?;
        let value = self.engine.rowset_value(self.handle, row, col)?;
        Ok((value, self.cell_context(row, col)))
    }

    fn cell_context(&self, row: usize, col: usize) -> String {
        match self.schema.col(col) {
            Some(decl) => format!("column '{}' row {row}", decl.name),
            None => format!("column {col} row {row}"),
        }
    }
}

impl Drop for Rowset {
    fn drop(&mut self) {
        if !self.closed {
            trace!(handle = self.handle.raw(), "rowset released on drop");
            let _ = self.engine.rowset_release(self.handle);
        }
    }
}
