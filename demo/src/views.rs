///
/// Typed facades over the pack's result shapes.
///
/// One struct per shape, each wrapping the rowset a procedure returned
/// and naming its columns, so call sites never touch column positions.
/// `OutArgBlend` is the odd one out: it decodes out slots instead of
/// rows.
///

use quern_bridge::{
    BlobRef, BridgeError, CallOutcome, Rowset, VaultedString, ViewModel,
};

/// The `fetch_inventory` parent shape: one row per stocked part, with a
/// nested detail set per row.
pub struct InventoryRows {
    rows: Rowset,
}

impl InventoryRows {
    pub fn new(rows: Rowset) -> Self {
        Self { rows }
    }

    pub fn id(&self, row: usize) -> Result<i64, BridgeError> {
        self.rows.get_long(row, 0)
    }

    pub fn name(&self, row: usize) -> Result<String, BridgeError> {
        self.rows.get_text(row, 1)
    }

    pub fn age(&self, row: usize) -> Result<Option<i32>, BridgeError> {
        self.rows.get_nullable_int(row, 2)
    }

    pub fn rate(&self, row: usize) -> Result<f64, BridgeError> {
        self.rows.get_double(row, 3)
    }

    pub fn tag(&self, row: usize) -> Result<BlobRef, BridgeError> {
        self.rows.get_blob(row, 4)
    }

    /// The part serial, which never leaves the vault.
    pub fn serial(&self, row: usize) -> Result<Option<VaultedString>, BridgeError> {
        self.rows.get_vaulted(row, 5)
    }

    pub fn detail(&self, row: usize) -> Result<InventoryDetail, BridgeError> {
        Ok(InventoryDetail::new(self.rows.get_child(row, 6)?))
    }

    pub fn close(&mut self) -> Result<(), BridgeError> {
        self.rows.close()
    }
}

impl ViewModel for InventoryRows {
    fn rows(&self) -> &Rowset {
        &self.rows
    }
}

/// The child shape attached to each inventory row.
pub struct InventoryDetail {
    rows: Rowset,
}

impl InventoryDetail {
    pub fn new(rows: Rowset) -> Self {
        Self { rows }
    }

    pub fn x(&self, row: usize) -> Result<i64, BridgeError> {
        self.rows.get_long(row, 0)
    }

    pub fn y(&self, row: usize) -> Result<String, BridgeError> {
        self.rows.get_text(row, 1)
    }

    pub fn close(&mut self) -> Result<(), BridgeError> {
        self.rows.close()
    }
}

impl ViewModel for InventoryDetail {
    fn rows(&self) -> &Rowset {
        &self.rows
    }
}

/// Single-column shape shared by `single_row` and `counted_rows`.
pub struct XRows {
    rows: Rowset,
}

impl XRows {
    pub fn new(rows: Rowset) -> Self {
        Self { rows }
    }

    pub fn x(&self, row: usize) -> Result<i64, BridgeError> {
        self.rows.get_long(row, 0)
    }

    pub fn close(&mut self) -> Result<(), BridgeError> {
        self.rows.close()
    }
}

impl ViewModel for XRows {
    fn rows(&self) -> &Rowset {
        &self.rows
    }
}

/// Post-call values of an `out_arg_blend` invocation, in slot order:
/// the bumped inout, the blended out, the prefixed text.
#[derive(Debug, PartialEq)]
pub struct OutArgBlend {
    pub y: i32,
    pub z: i32,
    pub t: String,
}

impl OutArgBlend {
    pub fn decode(outcome: &CallOutcome) -> Result<Self, BridgeError> {
        Ok(Self {
            y: outcome.out(0)?,
            z: outcome.out(1)?,
            t: outcome.out(2)?,
        })
    }
}
