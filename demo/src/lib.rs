///
/// quern-demo - Sample procedure pack for the quern marshaling bridge
///
/// This crate registers a pack of demonstration procedures against an
/// in-process engine and exposes typed facades over their results. It
/// exists to exercise the full bridge surface from the caller's side:
///
/// - Scalar checks for every column kind, plain and nullable
/// - Out and inout slots, including slots that return null
/// - Status codes used as data rather than as errors
/// - Vaulted strings that cross the boundary without being readable
/// - Blob round trips compared by content
/// - Nested result sets with per-row child buffers
///
/// # Library Usage
///
/// ```rust
/// use quern_bridge::{ColumnKind, ProcCall};
/// use quern_demo::build_engine;
/// use quern_engine::EngineConfig;
///
/// let engine = build_engine(EngineConfig::default());
/// let api = engine.api();
///
/// let outcome = ProcCall::new("fib")
///     .arg(10i64)
///     .out(ColumnKind::Long)
///     .invoke(&api)
///     .unwrap();
/// assert_eq!(outcome.out::<i64>(0).unwrap(), 55);
/// ```
///

pub mod procs;
pub mod views;

use quern_engine::{Engine, EngineConfig};

/// Build an engine with the full demonstration pack registered.
pub fn build_engine(config: EngineConfig) -> Engine {
    let engine = Engine::new(config);
    procs::register_all(&engine);
    engine
}
