pub mod header;
pub mod reader;
pub mod record;
pub mod sanitize;

pub use header::*;
pub use reader::*;
pub use record::*;
pub use sanitize::*;
