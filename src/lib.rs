pub mod cli;
pub mod download;
pub mod error;
pub mod logging;
pub mod parser;
pub mod schema;
pub mod search;
pub mod ui;
pub mod writer;

pub use cli::{Cli, Commands};
pub use error::{ImportError, PlanError, SearchError};
pub use search::{search_database, SearchFilters, SearchRow};
pub use ui::{LogUi, Phase, SilentUi, Ui, UiApp};
pub use writer::{run_import, ImportReport};
