//! Dataset input and map output.

pub mod euroc;
pub mod export;
pub mod point_log;

pub use euroc::EurocMonoDataset;
pub use export::{MapExport, export_map};
pub use point_log::PointLogSink;
