//! Visualization sinks.

#[cfg(feature = "rerun")]
pub mod rerun;

#[cfg(feature = "rerun")]
pub use self::rerun::RerunSink;
