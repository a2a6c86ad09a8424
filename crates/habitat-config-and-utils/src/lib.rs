//! Configuration, filesystem paths and logging for the Habitat client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_APP_DOMAIN, DEFAULT_LOG_LEVEL, DEFAULT_SERVER_DOMAIN,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
