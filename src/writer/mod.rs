pub mod import;
pub mod lookup;
pub mod schema_gen;
pub mod sqlite;

pub use import::*;
pub use lookup::*;
pub use sqlite::*;
