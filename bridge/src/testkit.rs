///
/// In-memory stub engine for unit tests.
///
/// Implements just enough of `EngineApi` to exercise the bridge types
/// without the real engine crate: canned buffers with refcounts, a byte
/// blob store, and a handful of fixed procedures. Test-only.
///

use std::collections::HashMap;
use std::sync::Mutex;

use crate::blob::BlobRef;
use crate::engine::{ArgSlot, DbHandle, EngineApi, RawOutcome, RowsetHandle, Schema};
use crate::error::BridgeError;
use crate::value::{ColumnKind, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum StubCell {
    Val(Value),
    Child(i64),
}

pub struct StubBuffer {
    pub schema: Schema,
    pub rows: Vec<Vec<StubCell>>,
    pub refs: u32,
}

#[derive(Default)]
struct StubState {
    dbs: HashMap<i64, ()>,
    buffers: HashMap<i64, StubBuffer>,
    blobs: HashMap<i64, Vec<u8>>,
    next_id: i64,
}

impl StubState {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct StubEngine {
    state: Mutex<StubState>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState::default()),
        }
    }

    pub fn add_blob(&self, bytes: Vec<u8>) -> BlobRef {
        let mut st = self.state.lock().unwrap();
        let id = st.next();
        st.blobs.insert(id, bytes);
        BlobRef::from_raw(id)
    }

    pub fn add_rowset(&self, schema: Schema, rows: Vec<Vec<StubCell>>) -> RowsetHandle {
        let mut st = self.state.lock().unwrap();
        let id = st.next();
        st.buffers.insert(
            id,
            StubBuffer {
                schema,
                rows,
                refs: 1,
            },
        );
        RowsetHandle::from_raw(id)
    }

    pub fn buffer_alive(&self, rows: RowsetHandle) -> bool {
        self.state.lock().unwrap().buffers.contains_key(&rows.raw())
    }

    pub fn buffer_count(&self) -> usize {
        self.state.lock().unwrap().buffers.len()
    }

    fn release_rec(st: &mut StubState, id: i64) {
        let freed = {
            let Some(buf) = st.buffers.get_mut(&id) else {
                return;
            };
            buf.refs -= 1;
            if buf.refs > 0 {
                return;
            }
            st.buffers.remove(&id)
        };
        if let Some(buf) = freed {
            for row in &buf.rows {
                for cell in row {
                    if let StubCell::Child(child) = cell {
                        Self::release_rec(st, *child);
                    }
                }
            }
        }
    }

    fn with_buffer<T>(
        &self,
        rows: RowsetHandle,
        f: impl FnOnce(&StubBuffer) -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        let st = self.state.lock().unwrap();
        let buf = st.buffers.get(&rows.raw()).ok_or(BridgeError::Engine {
            message: format!("no buffer {}", rows.raw()),
        })?;
        f(buf)
    }
}

impl EngineApi for StubEngine {
    fn open_db(&self) -> Result<DbHandle, BridgeError> {
        let mut st = self.state.lock().unwrap();
        let id = st.next();
        st.dbs.insert(id, ());
        Ok(DbHandle::from_raw(id))
    }

    fn close_db(&self, db: DbHandle) -> Result<(), BridgeError> {
        let mut st = self.state.lock().unwrap();
        st.dbs.remove(&db.raw()).ok_or(BridgeError::Engine {
            message: format!("no connection {}", db.raw()),
        })
    }

    fn invoke(
        &self,
        proc: &str,
        _db: Option<DbHandle>,
        args: &[ArgSlot],
    ) -> Result<RawOutcome, BridgeError> {
        match proc {
            // inout long, incremented
            "bump_long" => {
                let n = match args {
                    [ArgSlot::InOut {
                        value: Value::Long(n),
                    }] => *n,
                    _ => {
                        return Err(BridgeError::mismatch("long", "other", "bump_long slot 0"));
                    }
                };
                Ok(RawOutcome {
                    status: 0,
                    outs: vec![Value::Long(n + 1)],
                    rows: None,
                })
            }
            // two ins, two outs, crossed over
            "swap" => {
                let (a, b) = match args {
                    [
                        ArgSlot::In { value: a },
                        ArgSlot::In { value: b },
                        ArgSlot::Out { .. },
                        ArgSlot::Out { .. },
                    ] => (a.clone(), b.clone()),
                    _ => {
                        return Err(BridgeError::mismatch("in,in,out,out", "other", "swap"));
                    }
                };
                Ok(RawOutcome {
                    status: 0,
                    outs: vec![b, a],
                    rows: None,
                })
            }
            // nullable out that stays absent
            "null_out" => Ok(RawOutcome {
                status: 0,
                outs: vec![Value::Null],
                rows: None,
            }),
            // business status, nothing else
            "status_7" => Ok(RawOutcome {
                status: 7,
                outs: Vec::new(),
                rows: None,
            }),
            // one long out declared, engine answers with text
            "bad_out_kind" => Ok(RawOutcome {
                status: 0,
                outs: vec![Value::Text("oops".into())],
                rows: None,
            }),
            // one out declared, engine forgets it
            "short_outs" => Ok(RawOutcome {
                status: 0,
                outs: Vec::new(),
                rows: None,
            }),
            // single row, single long column named n
            "give_rows" => {
                let schema = Schema::new(vec![crate::engine::ColumnDecl::new(
                    "n",
                    ColumnKind::Long,
                )]);
                let handle = self.add_rowset(schema, vec![vec![StubCell::Val(Value::Long(314))]]);
                Ok(RawOutcome {
                    status: 0,
                    outs: Vec::new(),
                    rows: Some(handle),
                })
            }
            other => Err(BridgeError::UnknownProcedure {
                name: other.to_string(),
            }),
        }
    }

    fn rowset_schema(&self, rows: RowsetHandle) -> Result<Schema, BridgeError> {
        self.with_buffer(rows, |buf| Ok(buf.schema.clone()))
    }

    fn rowset_count(&self, rows: RowsetHandle) -> Result<usize, BridgeError> {
        self.with_buffer(rows, |buf| Ok(buf.rows.len()))
    }

    fn rowset_is_null(
        &self,
        rows: RowsetHandle,
        row: usize,
        col: usize,
    ) -> Result<bool, BridgeError> {
        self.with_buffer(rows, |buf| match buf.rows.get(row).and_then(|r| r.get(col)) {
            Some(StubCell::Val(v)) => Ok(v.is_null()),
            Some(StubCell::Child(_)) => Ok(false),
            None => Err(BridgeError::Engine {
                message: format!("no cell {row}:{col}"),
            }),
        })
    }

    fn rowset_value(
        &self,
        rows: RowsetHandle,
        row: usize,
        col: usize,
    ) -> Result<Value, BridgeError> {
        self.with_buffer(rows, |buf| match buf.rows.get(row).and_then(|r| r.get(col)) {
            Some(StubCell::Val(v)) => Ok(v.clone()),
            Some(StubCell::Child(_)) => {
                Err(BridgeError::mismatch("scalar", "rows", format!("cell {row}:{col}")))
            }
            None => Err(BridgeError::Engine {
                message: format!("no cell {row}:{col}"),
            }),
        })
    }

    fn rowset_child(
        &self,
        rows: RowsetHandle,
        row: usize,
        col: usize,
    ) -> Result<RowsetHandle, BridgeError> {
        let mut st = self.state.lock().unwrap();
        let child = match st
            .buffers
            .get(&rows.raw())
            .and_then(|buf| buf.rows.get(row))
            .and_then(|r| r.get(col))
        {
            Some(StubCell::Child(child)) => *child,
            Some(StubCell::Val(_)) => {
                return Err(BridgeError::mismatch("rows", "scalar", format!("cell {row}:{col}")));
            }
            None => {
                return Err(BridgeError::Engine {
                    message: format!("no cell {row}:{col}"),
                });
            }
        };
        if let Some(buf) = st.buffers.get_mut(&child) {
            buf.refs += 1;
        }
        Ok(RowsetHandle::from_raw(child))
    }

    fn rowset_row_hash(&self, rows: RowsetHandle, row: usize) -> Result<u64, BridgeError> {
        self.with_buffer(rows, |buf| {
            let cells = buf.rows.get(row).ok_or(BridgeError::Engine {
                message: format!("no row {row}"),
            })?;
            let mut h: u64 = 5381;
            for cell in cells {
                for byte in format!("{cell:?}").bytes() {
                    h = h.wrapping_mul(33).wrapping_add(byte as u64);
                }
            }
            Ok(h)
        })
    }

    fn rowset_rows_eq(
        &self,
        a: RowsetHandle,
        row_a: usize,
        b: RowsetHandle,
        row_b: usize,
    ) -> Result<bool, BridgeError> {
        let st = self.state.lock().unwrap();
        let ra = st
            .buffers
            .get(&a.raw())
            .and_then(|buf| buf.rows.get(row_a))
            .ok_or(BridgeError::Engine {
                message: format!("no row {row_a}"),
            })?;
        let rb = st
            .buffers
            .get(&b.raw())
            .and_then(|buf| buf.rows.get(row_b))
            .ok_or(BridgeError::Engine {
                message: format!("no row {row_b}"),
            })?;
        Ok(ra == rb)
    }

    fn rowset_rows_same(
        &self,
        a: RowsetHandle,
        row_a: usize,
        b: RowsetHandle,
        row_b: usize,
    ) -> Result<bool, BridgeError> {
        let st = self.state.lock().unwrap();
        let buf_a = st.buffers.get(&a.raw()).ok_or(BridgeError::Engine {
            message: format!("no buffer {}", a.raw()),
        })?;
        if !buf_a.schema.has_identity() {
            return Err(BridgeError::Engine {
                message: "no identity columns".to_string(),
            });
        }
        let buf_b = st.buffers.get(&b.raw()).ok_or(BridgeError::Engine {
            message: format!("no buffer {}", b.raw()),
        })?;
        let ra = buf_a.rows.get(row_a).ok_or(BridgeError::Engine {
            message: format!("no row {row_a}"),
        })?;
        let rb = buf_b.rows.get(row_b).ok_or(BridgeError::Engine {
            message: format!("no row {row_b}"),
        })?;
        Ok(buf_a.schema.identity.iter().all(|&i| ra.get(i) == rb.get(i)))
    }

    fn rowset_copy(
        &self,
        rows: RowsetHandle,
        from: usize,
        count: usize,
    ) -> Result<RowsetHandle, BridgeError> {
        let mut st = self.state.lock().unwrap();
        let (schema, copied) = {
            let buf = st.buffers.get(&rows.raw()).ok_or(BridgeError::Engine {
                message: format!("no buffer {}", rows.raw()),
            })?;
            if from.checked_add(count).is_none_or(|end| end > buf.rows.len()) {
                return Err(BridgeError::Engine {
                    message: format!("copy range {from}+{count} out of {}", buf.rows.len()),
                });
            }
            (buf.schema.clone(), buf.rows[from..from + count].to_vec())
        };
        for row in &copied {
            for cell in row {
                if let StubCell::Child(child) = cell {
                    if let Some(buf) = st.buffers.get_mut(child) {
                        buf.refs += 1;
                    }
                }
            }
        }
        let id = st.next();
        st.buffers.insert(
            id,
            StubBuffer {
                schema,
                rows: copied,
                refs: 1,
            },
        );
        Ok(RowsetHandle::from_raw(id))
    }

    fn rowset_release(&self, rows: RowsetHandle) -> Result<(), BridgeError> {
        let mut st = self.state.lock().unwrap();
        if !st.buffers.contains_key(&rows.raw()) {
            return Err(BridgeError::Engine {
                message: format!("no buffer {}", rows.raw()),
            });
        }
        Self::release_rec(&mut st, rows.raw());
        Ok(())
    }

    fn blob_eq(&self, a: BlobRef, b: BlobRef) -> Result<bool, BridgeError> {
        let st = self.state.lock().unwrap();
        let ba = st.blobs.get(&a.raw()).ok_or(BridgeError::Engine {
            message: format!("no blob {}", a.raw()),
        })?;
        let bb = st.blobs.get(&b.raw()).ok_or(BridgeError::Engine {
            message: format!("no blob {}", b.raw()),
        })?;
        Ok(ba == bb)
    }
}
