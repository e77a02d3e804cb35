//! Core data types: the atomic content entity, its per-sector vectors, and
//! the directed waypoint edges that link memories together.

pub mod memory;
mod vector;
pub mod waypoint;

pub use memory::{clamp_unit, Memory};
pub use vector::VectorRecord;
pub use waypoint::{virtual_node, Waypoint};
