pub use self::parser::{ArchiveOptions, Config, DatabaseConfig, DuplicatePolicy, LoggingConfig};

mod parser;
mod validator;
