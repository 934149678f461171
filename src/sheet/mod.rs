pub mod batcher;
pub mod client;
pub mod completeness;
pub mod coordinates;

pub use batcher::*;
pub use client::*;
pub use completeness::*;
pub use coordinates::*;
