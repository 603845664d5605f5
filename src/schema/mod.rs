pub mod dependencies;
pub mod sources;
pub mod types;

pub use dependencies::*;
pub use sources::*;
pub use types::*;
