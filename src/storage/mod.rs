pub mod flatfile_reader;
pub mod snapshot;

pub use flatfile_reader::*;
pub use snapshot::*;
