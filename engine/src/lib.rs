///
/// # quern-engine — Reference engine for the quern bridge
///
/// An in-process procedure runtime implementing the bridge's
/// entry-point interface. Result sets live as refcounted columnar
/// buffers in handle registries, blobs as registered byte payloads, and
/// storage-backed procedures run SQL through bundled SQLite.
///
/// ## Library Usage
///
/// ```rust,ignore
/// use quern_engine::{Engine, EngineConfig, ProcReply};
///
/// let engine = Engine::new(EngineConfig::default());
/// engine.register("double", |_, _, args| {
///     let n = args.get_long(0)?;
///     Ok(ProcReply::ok().out(n * 2))
/// });
/// let api = engine.api();
/// ```
///

pub mod buffer;
pub mod engine;
mod registry;
pub mod status;

pub use buffer::{Buffer, BufferBuilder, Cell};
pub use engine::{Engine, EngineConfig, ProcArgs, ProcReply, Storage};
