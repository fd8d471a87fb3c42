///
/// Typed facades over rowsets.
///
/// A view model is a thin struct wrapping a `Rowset` and exposing one
/// named accessor per column, so call sites read `inv.age(row)` instead
/// of positional gets. One facade type exists per procedure output
/// shape; this trait carries the operations they all share. Facades
/// hold nothing but the rowset, and child accessors wrap their handle
/// freshly on every call.
///

use crate::error::BridgeError;
use crate::rowset::Rowset;

pub trait ViewModel {
    fn rows(&self) -> &Rowset;

    fn count(&self) -> Result<usize, BridgeError> {
        self.rows().row_count()
    }

    fn row_hash(&self, row: usize) -> Result<u64, BridgeError> {
        self.rows().row_hash(row)
    }

    /// Whole-row equality against a row of another facade with the same
    /// shape.
    fn rows_eq<V: ViewModel>(
        &self,
        row: usize,
        other: &V,
        other_row: usize,
    ) -> Result<bool, BridgeError> {
        self.rows().rows_eq(row, other.rows(), other_row)
    }

    /// Identity-column equality; the shape must declare identity
    /// columns.
    fn rows_same<V: ViewModel>(
        &self,
        row: usize,
        other: &V,
        other_row: usize,
    ) -> Result<bool, BridgeError> {
        self.rows().rows_same(row, other.rows(), other_row)
    }
}
