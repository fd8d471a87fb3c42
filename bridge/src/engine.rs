///
/// Entry-point interface to the native engine.
///
/// `EngineApi` enumerates every operation the bridge is allowed to ask
/// of an engine: connection lifecycle, procedure invocation, result
/// buffer access, row identity, and blob equality. Everything is named
/// by opaque i64 tokens; the bridge never dereferences or interprets
/// one. The trait is object-safe and shared as `Arc<dyn EngineApi>`.
///

use crate::blob::BlobRef;
use crate::error::BridgeError;
use crate::value::{ColumnKind, Value};

/// Opaque token naming an open database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DbHandle(i64);

impl DbHandle {
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }
}

/// Opaque token naming a native result buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowsetHandle(i64);

impl RowsetHandle {
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }
}

/// One column of a result-set shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDecl {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub vaulted: bool,
}

impl ColumnDecl {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            vaulted: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the column as sensitive. Reads must go through the vaulted
    /// accessor; clear-text reads are rejected.
    pub fn vaulted(mut self) -> Self {
        self.vaulted = true;
        self
    }
}

/// Shape of a result set: ordered columns plus the positions of the
/// identity columns used by row sameness.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub cols: Vec<ColumnDecl>,
    pub identity: Vec<usize>,
}

impl Schema {
    pub fn new(cols: Vec<ColumnDecl>) -> Self {
        Self {
            cols,
            identity: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: Vec<usize>) -> Self {
        self.identity = identity;
        self
    }

    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    pub fn col(&self, index: usize) -> Option<&ColumnDecl> {
        self.cols.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.cols.iter().position(|c| c.name == name)
    }

    pub fn has_identity(&self) -> bool {
        !self.identity.is_empty()
    }
}

/// One argument slot of an invocation, in declaration order. In and
/// inout slots carry their encoded pre-call value; out slots carry only
/// the declared kind and receive a value after the call.
#[derive(Debug, Clone)]
pub enum ArgSlot {
    In { value: Value },
    Out { kind: ColumnKind },
    InOut { value: Value },
}

impl ArgSlot {
    pub fn is_returning(&self) -> bool {
        matches!(self, ArgSlot::Out { .. } | ArgSlot::InOut { .. })
    }
}

/// What an invocation produced: a status code (data, not an error), the
/// post-call values of every out and inout slot in declaration order,
/// and at most one result buffer.
#[derive(Debug, Clone)]
pub struct RawOutcome {
    pub status: i32,
    pub outs: Vec<Value>,
    pub rows: Option<RowsetHandle>,
}

/// The native surface. All operations are synchronous; invalid handles
/// are contract violations reported as errors, never undefined behavior.
pub trait EngineApi: Send + Sync {
    fn open_db(&self) -> Result<DbHandle, BridgeError>;

    fn close_db(&self, db: DbHandle) -> Result<(), BridgeError>;

    fn invoke(
        &self,
        proc: &str,
        db: Option<DbHandle>,
        args: &[ArgSlot],
    ) -> Result<RawOutcome, BridgeError>;

    fn rowset_schema(&self, rows: RowsetHandle) -> Result<Schema, BridgeError>;

    fn rowset_count(&self, rows: RowsetHandle) -> Result<usize, BridgeError>;

    fn rowset_is_null(&self, rows: RowsetHandle, row: usize, col: usize)
    -> Result<bool, BridgeError>;

    /// Scalar cell in boundary form. Vaulted text columns come back as
    /// clear `Value::Text`; wrapping them is the bridge's job.
    fn rowset_value(&self, rows: RowsetHandle, row: usize, col: usize)
    -> Result<Value, BridgeError>;

    /// Child buffer named by a rows-kind cell. The engine retains the
    /// child, so the returned handle stays valid after the parent is
    /// released.
    fn rowset_child(
        &self,
        rows: RowsetHandle,
        row: usize,
        col: usize,
    ) -> Result<RowsetHandle, BridgeError>;

    fn rowset_row_hash(&self, rows: RowsetHandle, row: usize) -> Result<u64, BridgeError>;

    fn rowset_rows_eq(
        &self,
        a: RowsetHandle,
        row_a: usize,
        b: RowsetHandle,
        row_b: usize,
    ) -> Result<bool, BridgeError>;

    fn rowset_rows_same(
        &self,
        a: RowsetHandle,
        row_a: usize,
        b: RowsetHandle,
        row_b: usize,
    ) -> Result<bool, BridgeError>;

    /// Copies `count` rows starting at `from` into a fresh independent
    /// buffer.
    fn rowset_copy(
        &self,
        rows: RowsetHandle,
        from: usize,
        count: usize,
    ) -> Result<RowsetHandle, BridgeError>;

    fn rowset_release(&self, rows: RowsetHandle) -> Result<(), BridgeError>;

    fn blob_eq(&self, a: BlobRef, b: BlobRef) -> Result<bool, BridgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new(vec![
            ColumnDecl::new("name", ColumnKind::Text),
            ColumnDecl::new("age", ColumnKind::Long).nullable(),
            ColumnDecl::new("key2", ColumnKind::Text).vaulted(),
        ]);
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.index_of("age"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
        assert!(schema.col(1).unwrap().nullable);
        assert!(schema.col(2).unwrap().vaulted);
        assert!(!schema.has_identity());
    }

    #[test]
    fn test_schema_identity_columns() {
        let schema = Schema::new(vec![
            ColumnDecl::new("id", ColumnKind::Long),
            ColumnDecl::new("note", ColumnKind::Text),
        ])
        .with_identity(vec![0]);
        assert!(schema.has_identity());
        assert_eq!(schema.identity, vec![0]);
    }

    #[test]
    fn test_arg_slot_returning() {
        assert!(!ArgSlot::In { value: Value::Int(1) }.is_returning());
        assert!(ArgSlot::Out { kind: ColumnKind::Long }.is_returning());
        assert!(ArgSlot::InOut { value: Value::Null }.is_returning());
    }
}
