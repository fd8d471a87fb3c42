///
/// The reference engine.
///
/// `Engine` is a cheap-clone handle over shared state: the connection,
/// buffer, and blob registries plus the procedure table. It implements
/// the bridge's entry-point interface and adds the helpers procedure
/// handlers build on: blob storage, buffer storage, SQL execution, and
/// schema-driven query materialization.
///
/// Locking discipline: registry mutexes are taken per entry point and
/// never held across a handler call, so a handler is free to re-enter
/// the invocation protocol on the same engine. Where locks nest, the
/// order is connections, then buffers, then blobs.
///

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};
use tracing::{debug, trace};

use quern_bridge::{
    ArgSlot, BlobRef, BridgeError, ColumnKind, DbHandle, EngineApi, FromNative, IntoNative,
    RawOutcome, RowsetHandle, Schema, Value,
};

use crate::buffer::{Buffer, BufferBuilder, Cell};
use crate::registry::{BlobRegistry, BufferRegistry, ConnRegistry};

/// Where the engine keeps its SQLite storage.
#[derive(Debug, Clone)]
pub enum Storage {
    Memory,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub storage: Storage,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: Storage::Memory,
        }
    }
}

/// Read-side view of the argument slots handed to a procedure handler.
/// Indexes run over all declared slots; out slots have no readable
/// value.
pub struct ProcArgs<'a> {
    proc: &'a str,
    slots: &'a [ArgSlot],
}

impl<'a> ProcArgs<'a> {
    pub fn new(proc: &'a str, slots: &'a [ArgSlot]) -> Self {
        Self { proc, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn value_at(&self, index: usize) -> Result<&Value, BridgeError> {
        match self.slots.get(index) {
            Some(ArgSlot::In { value }) | Some(ArgSlot::InOut { value }) => Ok(value),
            Some(ArgSlot::Out { .. }) => Err(BridgeError::mismatch(
                "in value",
                "out slot",
                self.context(index),
            )),
            None => Err(BridgeError::mismatch(
                "argument",
                "missing slot",
                self.context(index),
            )),
        }
    }

    fn context(&self, index: usize) -> String {
        format!("'{}' argument {index}", self.proc)
    }

    pub fn get_bool(&self, index: usize) -> Result<bool, BridgeError> {
        bool::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_int(&self, index: usize) -> Result<i32, BridgeError> {
        i32::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_long(&self, index: usize) -> Result<i64, BridgeError> {
        i64::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_double(&self, index: usize) -> Result<f64, BridgeError> {
        f64::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_text(&self, index: usize) -> Result<String, BridgeError> {
        String::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_blob(&self, index: usize) -> Result<BlobRef, BridgeError> {
        BlobRef::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_nullable_bool(&self, index: usize) -> Result<Option<bool>, BridgeError> {
        Option::<bool>::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_nullable_int(&self, index: usize) -> Result<Option<i32>, BridgeError> {
        Option::<i32>::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_nullable_long(&self, index: usize) -> Result<Option<i64>, BridgeError> {
        Option::<i64>::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_nullable_double(&self, index: usize) -> Result<Option<f64>, BridgeError> {
        Option::<f64>::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_nullable_text(&self, index: usize) -> Result<Option<String>, BridgeError> {
        Option::<String>::from_native(self.value_at(index)?, &self.context(index))
    }

    pub fn get_nullable_blob(&self, index: usize) -> Result<Option<BlobRef>, BridgeError> {
        Option::<BlobRef>::from_native(self.value_at(index)?, &self.context(index))
    }
}

/// What a handler hands back: status, post-call out values in slot
/// order, and at most one result buffer.
pub struct ProcReply {
    pub status: i32,
    pub outs: Vec<Value>,
    pub rows: Option<RowsetHandle>,
}

impl ProcReply {
    pub fn ok() -> Self {
        Self::with_status(crate::status::OK)
    }

    pub fn with_status(status: i32) -> Self {
        Self {
            status,
            outs: Vec::new(),
            rows: None,
        }
    }

    pub fn out(mut self, value: impl IntoNative) -> Self {
        self.outs.push(value.into_native());
        self
    }

    pub fn rows(mut self, rows: RowsetHandle) -> Self {
        self.rows = Some(rows);
        self
    }
}

type ProcFn = Arc<dyn Fn(&Engine, Option<DbHandle>, &ProcArgs) -> Result<ProcReply, BridgeError> + Send + Sync>;

struct EngineInner {
    config: EngineConfig,
    conns: Mutex<ConnRegistry>,
    buffers: Mutex<BufferRegistry>,
    blobs: Mutex<BlobRegistry>,
    procs: Mutex<IndexMap<String, ProcFn>>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                conns: Mutex::new(ConnRegistry::new()),
                buffers: Mutex::new(BufferRegistry::new()),
                blobs: Mutex::new(BlobRegistry::new()),
                procs: Mutex::new(IndexMap::new()),
            }),
        }
    }

    /// The engine as the bridge sees it.
    pub fn api(&self) -> Arc<dyn EngineApi> {
        Arc::new(self.clone())
    }

    pub fn register(
        &self,
        name: &str,
        proc: impl Fn(&Engine, Option<DbHandle>, &ProcArgs) -> Result<ProcReply, BridgeError>
        + Send
        + Sync
        + 'static,
    ) {
        debug!(proc = name, "procedure registered");
        let mut procs = self.inner.procs.lock().unwrap();
        procs.insert(name.to_string(), Arc::new(proc));
    }

    /// Registered procedure names, in registration order.
    pub fn procedures(&self) -> Vec<String> {
        let procs = self.inner.procs.lock().unwrap();
        procs.keys().cloned().collect()
    }

    pub fn store_blob(&self, bytes: Vec<u8>) -> BlobRef {
        let mut blobs = self.inner.blobs.lock().unwrap();
        let id = blobs.insert(bytes);
        trace!(blob = id, "blob stored");
        BlobRef::from_raw(id)
    }

    /// Payload bytes of a stored blob. Engine-side only; the bridge
    /// never sees blob content.
    pub fn blob_bytes(&self, blob: BlobRef) -> Result<Vec<u8>, BridgeError> {
        let blobs = self.inner.blobs.lock().unwrap();
        blobs
            .blobs
            .get(&blob.raw())
            .cloned()
            .ok_or(BridgeError::Engine {
                message: format!("no blob {}", blob.raw()),
            })
    }

    pub fn store_buffer(&self, buffer: Buffer) -> RowsetHandle {
        let mut buffers = self.inner.buffers.lock().unwrap();
        let id = buffers.insert(buffer);
        trace!(buffer = id, "buffer stored");
        RowsetHandle::from_raw(id)
    }

    /// Runs a batch of statements on an open connection.
    pub fn exec(&self, db: DbHandle, sql: &str) -> Result<(), BridgeError> {
        let conns = self.inner.conns.lock().unwrap();
        let conn = conns
            .connections
            .get(&db.raw())
            .ok_or_else(|| no_connection(db))?;
        conn.execute_batch(sql).map_err(sql_err)
    }

    /// Runs a query and materializes the rows into a buffer of the
    /// given shape. Column order in the SELECT must match the shape;
    /// rows-kind columns cannot come from SQL and are attached by the
    /// handler through `BufferBuilder` instead.
    pub fn query_rows(
        &self,
        db: DbHandle,
        sql: &str,
        params: &[Value],
        schema: Schema,
    ) -> Result<RowsetHandle, BridgeError> {
        if schema.cols.iter().any(|c| c.kind == ColumnKind::Rows) {
            return Err(BridgeError::Engine {
                message: "rows columns cannot be materialized from sql".to_string(),
            });
        }
        let sql_params = self.sql_params(params)?;

        let materialized: Vec<Vec<Cell>> = {
            let conns = self.inner.conns.lock().unwrap();
            let conn = conns
                .connections
                .get(&db.raw())
                .ok_or_else(|| no_connection(db))?;
            let mut stmt = conn.prepare(sql).map_err(sql_err)?;
            let mut rows = stmt.query(params_from_iter(sql_params.iter())).map_err(sql_err)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(sql_err)? {
                let mut cells = Vec::with_capacity(schema.len());
                for (i, decl) in schema.cols.iter().enumerate() {
                    let value = match decl.kind {
                        ColumnKind::Bool => row
                            .get::<_, Option<i64>>(i)
                            .map_err(sql_err)?
                            .map(|v| Value::Bool(v != 0)),
                        ColumnKind::Int => {
                            row.get::<_, Option<i32>>(i).map_err(sql_err)?.map(Value::Int)
                        }
                        ColumnKind::Long => {
                            row.get::<_, Option<i64>>(i).map_err(sql_err)?.map(Value::Long)
                        }
                        ColumnKind::Double => row
                            .get::<_, Option<f64>>(i)
                            .map_err(sql_err)?
                            .map(Value::Double),
                        ColumnKind::Text => row
                            .get::<_, Option<String>>(i)
                            .map_err(sql_err)?
                            .map(Value::Text),
                        ColumnKind::Blob => row
                            .get::<_, Option<Vec<u8>>>(i)
                            .map_err(sql_err)?
                            .map(|b| Value::Blob(self.store_blob(b))),
                        ColumnKind::Rows => unreachable!("checked above"),
                    };
                    cells.push(Cell::Val(value.unwrap_or(Value::Null)));
                }
                out.push(cells);
            }
            out
        };

        let mut builder = BufferBuilder::new(schema);
        for cells in materialized {
            builder.push_row(cells)?;
        }
        Ok(self.store_buffer(builder.finish()))
    }

    fn sql_params(&self, params: &[Value]) -> Result<Vec<SqlValue>, BridgeError> {
        params
            .iter()
            .map(|v| {
                Ok(match v {
                    Value::Null => SqlValue::Null,
                    Value::Bool(b) => SqlValue::Integer(*b as i64),
                    Value::Int(i) => SqlValue::Integer(*i as i64),
                    Value::Long(l) => SqlValue::Integer(*l),
                    Value::Double(f) => SqlValue::Real(*f),
                    Value::Text(s) => SqlValue::Text(s.clone()),
                    Value::Blob(r) => SqlValue::Blob(self.blob_bytes(*r)?),
                })
            })
            .collect()
    }

    fn clone_row(&self, rows: RowsetHandle, row: usize) -> Result<Vec<Cell>, BridgeError> {
        let buffers = self.inner.buffers.lock().unwrap();
        let buffer = buffers
            .buffers
            .get(&rows.raw())
            .ok_or_else(|| no_buffer(rows.raw()))?;
        buffer.rows.get(row).cloned().ok_or(BridgeError::Engine {
            message: format!("no row {row} in buffer {}", rows.raw()),
        })
    }

    fn cells_eq(&self, a: &Cell, b: &Cell) -> Result<bool, BridgeError> {
        match (a, b) {
            (Cell::Val(Value::Blob(x)), Cell::Val(Value::Blob(y))) => {
                let blobs = self.inner.blobs.lock().unwrap();
                match (blobs.blobs.get(&x.raw()), blobs.blobs.get(&y.raw())) {
                    (Some(bx), Some(by)) => Ok(bx == by),
                    _ => Err(BridgeError::Engine {
                        message: "blob cell names no stored blob".to_string(),
                    }),
                }
            }
            (Cell::Rows(x), Cell::Rows(y)) => Ok(x == y),
            (Cell::Val(x), Cell::Val(y)) => Ok(x == y),
            _ => Ok(false),
        }
    }

    fn release_rec(buffers: &mut BufferRegistry, id: i64) {
        let freed = {
            let Some(buffer) = buffers.buffers.get_mut(&id) else {
                return;
            };
            buffer.refs -= 1;
            if buffer.refs > 0 {
                return;
            }
            buffers.buffers.remove(&id)
        };
        if let Some(buffer) = freed {
            trace!(buffer = id, "buffer freed");
            for row in &buffer.rows {
                for cell in row {
                    if let Cell::Rows(child) = cell {
                        Self::release_rec(buffers, *child);
                    }
                }
            }
        }
    }
}

fn no_connection(db: DbHandle) -> BridgeError {
    BridgeError::Engine {
        message: format!("no connection {}", db.raw()),
    }
}

fn no_buffer(id: i64) -> BridgeError {
    BridgeError::Engine {
        message: format!("no buffer {id}"),
    }
}

fn sql_err(e: rusqlite::Error) -> BridgeError {
    BridgeError::Engine {
        message: e.to_string(),
    }
}

fn fold(h: &mut u64, bytes: &[u8]) {
    for b in bytes {
        *h = h.wrapping_mul(33).wrapping_add(*b as u64);
    }
}

impl EngineApi for Engine {
    fn open_db(&self) -> Result<DbHandle, BridgeError> {
        let conn = match &self.inner.config.storage {
            Storage::Memory => Connection::open_in_memory(),
            Storage::File(path) => Connection::open(path),
        }
        .map_err(|e| BridgeError::EngineUnavailable {
            reason: e.to_string(),
        })?;
        let mut conns = self.inner.conns.lock().unwrap();
        let id = conns.insert(conn);
        debug!(db = id, "connection opened");
        Ok(DbHandle::from_raw(id))
    }

    fn close_db(&self, db: DbHandle) -> Result<(), BridgeError> {
        let mut conns = self.inner.conns.lock().unwrap();
        conns
            .connections
            .remove(&db.raw())
            .map(|_| debug!(db = db.raw(), "connection closed"))
            .ok_or_else(|| no_connection(db))
    }

    fn invoke(
        &self,
        proc: &str,
        db: Option<DbHandle>,
        args: &[ArgSlot],
    ) -> Result<RawOutcome, BridgeError> {
        // Clone the handler out so no lock is held while it runs; a
        // handler may invoke again on this engine.
        let handler = {
            let procs = self.inner.procs.lock().unwrap();
            procs.get(proc).cloned()
        }
        .ok_or_else(|| BridgeError::UnknownProcedure {
            name: proc.to_string(),
        })?;

        debug!(proc, args = args.len(), "dispatching procedure");
        let reply = handler(self, db, &ProcArgs::new(proc, args))?;
        Ok(RawOutcome {
            status: reply.status,
            outs: reply.outs,
            rows: reply.rows,
        })
    }

    fn rowset_schema(&self, rows: RowsetHandle) -> Result<Schema, BridgeError> {
        let buffers = self.inner.buffers.lock().unwrap();
        buffers
            .buffers
            .get(&rows.raw())
            .map(|b| b.schema.clone())
            .ok_or_else(|| no_buffer(rows.raw()))
    }

    fn rowset_count(&self, rows: RowsetHandle) -> Result<usize, BridgeError> {
        let buffers = self.inner.buffers.lock().unwrap();
        buffers
            .buffers
            .get(&rows.raw())
            .map(|b| b.rows.len())
            .ok_or_else(|| no_buffer(rows.raw()))
    }

    fn rowset_is_null(
        &self,
        rows: RowsetHandle,
        row: usize,
        col: usize,
    ) -> Result<bool, BridgeError> {
        let cells = self.clone_row(rows, row)?;
        cells.get(col).map(Cell::is_null).ok_or(BridgeError::Engine {
            message: format!("no cell {row}:{col}"),
        })
    }

    fn rowset_value(
        &self,
        rows: RowsetHandle,
        row: usize,
        col: usize,
    ) -> Result<Value, BridgeError> {
        let cells = self.clone_row(rows, row)?;
        match cells.get(col) {
            Some(Cell::Val(v)) => Ok(v.clone()),
            Some(Cell::Rows(_)) => Err(BridgeError::mismatch(
                "scalar",
                "rows",
                format!("cell {row}:{col}"),
            )),
            None => Err(BridgeError::Engine {
                message: format!("no cell {row}:{col}"),
            }),
        }
    }

    fn rowset_child(
        &self,
        rows: RowsetHandle,
        row: usize,
        col: usize,
    ) -> Result<RowsetHandle, BridgeError> {
        let mut buffers = self.inner.buffers.lock().unwrap();
        let child = {
            let buffer = buffers
                .buffers
                .get(&rows.raw())
                .ok_or_else(|| no_buffer(rows.raw()))?;
            match buffer.rows.get(row).and_then(|r| r.get(col)) {
                Some(Cell::Rows(child)) => *child,
                Some(Cell::Val(_)) => {
                    return Err(BridgeError::mismatch(
                        "rows",
                        "scalar",
                        format!("cell {row}:{col}"),
                    ));
                }
                None => {
                    return Err(BridgeError::Engine {
                        message: format!("no cell {row}:{col}"),
                    });
                }
            }
        };
        // Retain the child so it outlives its parent.
        let child_buffer = buffers
            .buffers
            .get_mut(&child)
            .ok_or_else(|| no_buffer(child))?;
        child_buffer.refs += 1;
        Ok(RowsetHandle::from_raw(child))
    }

    fn rowset_row_hash(&self, rows: RowsetHandle, row: usize) -> Result<u64, BridgeError> {
        let cells = self.clone_row(rows, row)?;
        let mut h: u64 = 5381;
        for cell in &cells {
            match cell {
                Cell::Val(Value::Null) => fold(&mut h, &[0]),
                Cell::Val(Value::Bool(b)) => fold(&mut h, &[1, *b as u8]),
                Cell::Val(Value::Int(i)) => {
                    fold(&mut h, &[2]);
                    fold(&mut h, &i.to_le_bytes());
                }
                Cell::Val(Value::Long(l)) => {
                    fold(&mut h, &[3]);
                    fold(&mut h, &l.to_le_bytes());
                }
                Cell::Val(Value::Double(f)) => {
                    fold(&mut h, &[4]);
                    fold(&mut h, &f.to_bits().to_le_bytes());
                }
                Cell::Val(Value::Text(s)) => {
                    fold(&mut h, &[5]);
                    fold(&mut h, &(s.len() as u32).to_le_bytes());
                    fold(&mut h, s.as_bytes());
                }
                Cell::Val(Value::Blob(r)) => {
                    let bytes = self.blob_bytes(*r)?;
                    fold(&mut h, &[6]);
                    fold(&mut h, &(bytes.len() as u32).to_le_bytes());
                    fold(&mut h, &bytes);
                }
                Cell::Rows(id) => {
                    fold(&mut h, &[7]);
                    fold(&mut h, &id.to_le_bytes());
                }
            }
        }
        Ok(h)
    }

    fn rowset_rows_eq(
        &self,
        a: RowsetHandle,
        row_a: usize,
        b: RowsetHandle,
        row_b: usize,
    ) -> Result<bool, BridgeError> {
        let ca = self.clone_row(a, row_a)?;
        let cb = self.clone_row(b, row_b)?;
        if ca.len() != cb.len() {
            return Ok(false);
        }
        for (x, y) in ca.iter().zip(cb.iter()) {
            if !self.cells_eq(x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn rowset_rows_same(
        &self,
        a: RowsetHandle,
        row_a: usize,
        b: RowsetHandle,
        row_b: usize,
    ) -> Result<bool, BridgeError> {
        let identity = self.rowset_schema(a)?.identity;
        if identity.is_empty() {
            return Err(BridgeError::Engine {
                message: "rows_same requires identity columns".to_string(),
            });
        }
        let ca = self.clone_row(a, row_a)?;
        let cb = self.clone_row(b, row_b)?;
        for &i in &identity {
            let (Some(x), Some(y)) = (ca.get(i), cb.get(i)) else {
                return Err(BridgeError::Engine {
                    message: format!("identity column {i} out of row bounds"),
                });
            };
            if !self.cells_eq(x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn rowset_copy(
        &self,
        rows: RowsetHandle,
        from: usize,
        count: usize,
    ) -> Result<RowsetHandle, BridgeError> {
        let mut buffers = self.inner.buffers.lock().unwrap();
        let (schema, copied) = {
            let buffer = buffers
                .buffers
                .get(&rows.raw())
                .ok_or_else(|| no_buffer(rows.raw()))?;
            if from.checked_add(count).is_none_or(|end| end > buffer.rows.len()) {
                return Err(BridgeError::Engine {
                    message: format!(
                        "copy range {from}+{count} exceeds {} rows",
                        buffer.rows.len()
                    ),
                });
            }
            (buffer.schema.clone(), buffer.rows[from..from + count].to_vec())
        };
        // The copy shares children; retain each once more.
        for row in &copied {
            for cell in row {
                if let Cell::Rows(child) = cell {
                    if let Some(buffer) = buffers.buffers.get_mut(child) {
                        buffer.refs += 1;
                    }
                }
            }
        }
        let id = buffers.insert(Buffer {
            schema,
            rows: copied,
            refs: 1,
        });
        Ok(RowsetHandle::from_raw(id))
    }

    fn rowset_release(&self, rows: RowsetHandle) -> Result<(), BridgeError> {
        let mut buffers = self.inner.buffers.lock().unwrap();
        if !buffers.buffers.contains_key(&rows.raw()) {
            return Err(no_buffer(rows.raw()));
        }
        Self::release_rec(&mut buffers, rows.raw());
        Ok(())
    }

    fn blob_eq(&self, a: BlobRef, b: BlobRef) -> Result<bool, BridgeError> {
        let blobs = self.inner.blobs.lock().unwrap();
        match (blobs.blobs.get(&a.raw()), blobs.blobs.get(&b.raw())) {
            (Some(ba), Some(bb)) => Ok(ba == bb),
            _ => Err(BridgeError::Engine {
                message: "blob equality on unknown handle".to_string(),
            }),
        }
    }
}
