///
/// Procedure invocation protocol.
///
/// A `ProcCall` accumulates the argument slots of one invocation in
/// declaration order, each in or inout value encoded as it is added.
/// `invoke` performs the single synchronous engine call, validates the
/// returned out slots against the declaration, and hands back a
/// `CallOutcome` holding the status code, the decoded-on-demand out
/// values, and at most one result buffer.
///
/// The protocol keeps no state between invocations, so an engine
/// procedure is free to re-enter it while servicing a call.
///

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::engine::{ArgSlot, DbHandle, EngineApi, RowsetHandle};
use crate::error::BridgeError;
use crate::rowset::Rowset;
use crate::value::{ColumnKind, FromNative, IntoNative, Value};

pub struct ProcCall {
    name: String,
    db: Option<DbHandle>,
    args: SmallVec<[ArgSlot; 8]>,
}

impl ProcCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db: None,
            args: SmallVec::new(),
        }
    }

    /// Targets the invocation at an open connection for procedures that
    /// touch storage.
    pub fn with_db(mut self, db: DbHandle) -> Self {
        self.db = Some(db);
        self
    }

    /// Appends an in slot, encoding the value now.
    pub fn arg(mut self, value: impl IntoNative) -> Self {
        self.args.push(ArgSlot::In {
            value: value.into_native(),
        });
        self
    }

    /// Appends an inout slot; the post-call value is read back through
    /// the outcome.
    pub fn inout(mut self, value: impl IntoNative) -> Self {
        self.args.push(ArgSlot::InOut {
            value: value.into_native(),
        });
        self
    }

    /// Reserves an out slot of the declared kind.
    pub fn out(mut self, kind: ColumnKind) -> Self {
        self.args.push(ArgSlot::Out { kind });
        self
    }

    pub fn invoke(&self, engine: &Arc<dyn EngineApi>) -> Result<CallOutcome, BridgeError> {
        debug!(proc = %self.name, args = self.args.len(), "invoking procedure");
        let raw = engine.invoke(&self.name, self.db, &self.args)?;

        let returning: Vec<&ArgSlot> = self.args.iter().filter(|s| s.is_returning()).collect();
        if raw.outs.len() != returning.len() {
            return Err(BridgeError::mismatch(
                "matching out slots",
                format!("{} of {}", raw.outs.len(), returning.len()),
                format!("invocation of '{}'", self.name),
            ));
        }
        for (index, (slot, value)) in returning.iter().zip(raw.outs.iter()).enumerate() {
            let declared = match slot {
                ArgSlot::Out { kind } => Some(kind.name()),
                ArgSlot::InOut { value: pre } if !pre.is_null() => Some(pre.kind_name()),
                _ => None,
            };
            if let Some(declared) = declared {
                if !value.is_null() && value.kind_name() != declared {
                    return Err(BridgeError::TypeMismatch {
                        expected: "declared out kind",
                        found: format!("{} where {declared} was declared", value.kind_name()),
                        context: format!("out slot {index} of '{}'", self.name),
                    });
                }
            }
        }

        Ok(CallOutcome {
            engine: engine.clone(),
            proc: self.name.clone(),
            status: raw.status,
            outs: raw.outs,
            rows: raw.rows,
        })
    }
}

/// Result of one invocation. The status code is data; interpreting it
/// belongs to the caller. An unclaimed result buffer is released when
/// the outcome drops.
pub struct CallOutcome {
    engine: Arc<dyn EngineApi>,
    proc: String,
    status: i32,
    outs: Vec<Value>,
    rows: Option<RowsetHandle>,
}

impl fmt::Debug for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOutcome")
            .field("proc", &self.proc)
            .field("status", &self.status)
            .field("outs", &self.outs)
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl CallOutcome {
    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn has_rows(&self) -> bool {
        self.rows.is_some()
    }

    /// Decodes the post-call value of the out or inout slot at `index`
    /// (counting only returning slots, in declaration order).
    pub fn out<T: FromNative>(&self, index: usize) -> Result<T, BridgeError> {
        let value = self.outs.get(index).ok_or(BridgeError::IndexOutOfRange {
            row: 0,
            col: index,
            rows: 1,
            cols: self.outs.len(),
        })?;
        T::from_native(value, &format!("out slot {index} of '{}'", self.proc))
    }

    /// Takes the result buffer as a typed rowset. Errors if the
    /// procedure produced none.
    pub fn into_rows(mut self) -> Result<Rowset, BridgeError> {
        match self.rows.take() {
            Some(handle) => Rowset::from_handle(self.engine.clone(), handle),
            None => Err(BridgeError::mismatch(
                "result set",
                "none",
                format!("invocation of '{}'", self.proc),
            )),
        }
    }
}

impl Drop for CallOutcome {
    fn drop(&mut self) {
        if let Some(handle) = self.rows.take() {
            let _ = self.engine.rowset_release(handle);
        }
    }
}
