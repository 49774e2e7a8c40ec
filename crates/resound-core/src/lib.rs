//! Resound Core - Foundational types for the Resound audio runtime
//!
//! This crate provides the types that the other Resound crates share:
//! - `EntityId` - Stable identifiers for entities that own sounds
//! - `Vec3`, `Attributes3D` - Spatial types pushed to playing instances
//! - Error types and Result alias

mod error;
mod id;
mod types;

pub use error::{ResoundError, Result};
pub use id::EntityId;
pub use types::{Attributes3D, Vec3};
