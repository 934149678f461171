pub mod field_resolver;
pub mod match_table;
pub mod sync_engine;
pub mod value_adjuster;

pub use field_resolver::*;
pub use match_table::*;
pub use sync_engine::*;
pub use value_adjuster::*;
