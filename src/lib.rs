pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
