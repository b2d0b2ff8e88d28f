//! Local Mapping thread for the simulated engine.
//!
//! The Local Mapping thread is responsible for:
//! - Inserting new keyframes into the map
//! - Creating map points for landmarks seen for the first time
//! - Culling map points and redundant keyframes

mod local_mapper;

pub use local_mapper::{LocalMapper, LocalMapperStats};
