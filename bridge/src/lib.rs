///
/// # quern-bridge — Typed result-set marshaling bridge
///
/// Host-side consumption of a compiled query/procedure engine: opaque
/// handles in, strongly typed values out. The engine is reached only
/// through the `EngineApi` trait; this crate never links or interprets
/// native memory itself.
///
/// ## Library Usage
///
/// ```rust,ignore
/// use quern_bridge::{ProcCall, Session, ColumnKind};
///
/// let session = Session::open(engine)?;
/// let outcome = ProcCall::new("fib")
///     .arg(10i64)
///     .out(ColumnKind::Long)
///     .invoke(session.engine())?;
/// assert_eq!(outcome.status(), 0);
/// let n: i64 = outcome.out(0)?;
/// ```
///
/// Procedures that produce rows hand back a `Rowset`, read through
/// typed accessors or a per-shape `ViewModel` facade. Sensitive columns
/// surface as `VaultedString`, blobs as opaque `BlobRef` tokens.
///

pub mod blob;
pub mod call;
pub mod engine;
pub mod error;
pub mod rowset;
pub mod session;
pub mod value;
pub mod vault;
pub mod view;

#[cfg(test)]
mod testkit;

pub use blob::{BlobRef, blobs_eq, opt_blobs_eq};
pub use call::{CallOutcome, ProcCall};
pub use engine::{ArgSlot, ColumnDecl, DbHandle, EngineApi, RawOutcome, RowsetHandle, Schema};
pub use error::BridgeError;
pub use rowset::Rowset;
pub use session::Session;
pub use value::{ColumnKind, FromNative, IntoNative, Value};
pub use vault::{REDACTED, VaultedString};
pub use view::ViewModel;
