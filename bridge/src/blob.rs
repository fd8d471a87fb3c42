///
/// Opaque blob handles.
///
/// A `BlobRef` names a binary payload held by the engine. The bridge
/// never copies or inspects the bytes; the only operation it offers is
/// content equality, delegated to the engine. Null pairings are resolved
/// host-side without a native call.
///

use crate::engine::EngineApi;
use crate::error::BridgeError;

/// Opaque token naming a native binary payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobRef(i64);

impl BlobRef {
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }
}

/// Content equality of two payloads, decided by the engine.
pub fn blobs_eq(engine: &dyn EngineApi, a: BlobRef, b: BlobRef) -> Result<bool, BridgeError> {
    engine.blob_eq(a, b)
}

/// Nullable content equality: two absent blobs are equal, an absent and
/// a present one are not, two present ones go to the engine.
pub fn opt_blobs_eq(
    engine: &dyn EngineApi,
    a: Option<BlobRef>,
    b: Option<BlobRef>,
) -> Result<bool, BridgeError> {
    match (a, b) {
        (None, None) => Ok(true),
        (Some(a), Some(b)) => engine.blob_eq(a, b),
        _ => Ok(false),
    }
}
