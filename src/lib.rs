pub mod atlas;
pub mod bridge;
pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod local_mapping;
pub mod loop_closing;
pub mod system;
pub mod tracking;
pub mod viz;
