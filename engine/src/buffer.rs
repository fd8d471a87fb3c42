///
/// Materialized result buffers.
///
/// A `Buffer` is the engine-side form of one result set: a schema, a
/// vector of rows, and a reference count. Scalar cells carry boundary
/// values; rows-kind cells carry the handle of a child buffer held in
/// the registry.
///
/// `BufferBuilder` is how procedure handlers assemble one. Every
/// appended row is checked against the schema (width, cell kinds,
/// nullability), so a malformed buffer can never reach the bridge.
///

use quern_bridge::{BridgeError, ColumnKind, Schema, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Val(Value),
    Rows(i64),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Val(Value::Null))
    }

    fn describe(&self) -> &'static str {
        match self {
            Cell::Val(v) => v.kind_name(),
            Cell::Rows(_) => "rows",
        }
    }
}

pub struct Buffer {
    pub schema: Schema,
    pub rows: Vec<Vec<Cell>>,
    pub refs: u32,
}

pub struct BufferBuilder {
    schema: Schema,
    rows: Vec<Vec<Cell>>,
}

impl BufferBuilder {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, cells: Vec<Cell>) -> Result<(), BridgeError> {
        if cells.len() != self.schema.len() {
            return Err(BridgeError::Engine {
                message: format!(
                    "row width {} does not match shape width {}",
                    cells.len(),
                    self.schema.len()
                ),
            });
        }
        for (cell, decl) in cells.iter().zip(self.schema.cols.iter()) {
            let ok = match cell {
                Cell::Val(Value::Null) => decl.nullable,
                Cell::Val(v) => v.kind() == Some(decl.kind),
                Cell::Rows(_) => decl.kind == ColumnKind::Rows,
            };
            if !ok {
                return Err(BridgeError::Engine {
                    message: format!(
                        "cell kind {} not allowed in column '{}' ({}{})",
                        cell.describe(),
                        decl.name,
                        decl.kind.name(),
                        if decl.nullable { ", nullable" } else { "" }
                    ),
                });
            }
        }
        self.rows.push(cells);
        Ok(())
    }

    pub fn finish(self) -> Buffer {
        Buffer {
            schema: self.schema,
            rows: self.rows,
            refs: 1,
        }
    }
}
