//! Runtime configuration.
//!
//! The only knob is the log level. It can be set programmatically or read
//! from the `OXIOBJ_LOG` environment variable.

use crate::error::{Error, Result};
use oxiobj_log::{Level, warn};

/// Environment variable holding the log level name.
pub const LOG_ENV: &str = "OXIOBJ_LOG";

/// Settings applied when a [`Runtime`](crate::runtime::Runtime) is created
/// with [`Runtime::with_config`](crate::runtime::Runtime::with_config).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Log level to install; `None` keeps the current one.
    pub log_level: Option<Level>,
}

impl RuntimeConfig {
    /// Reads the configuration from the environment.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when `OXIOBJ_LOG` is set to something that
    /// is not a level name.
    pub fn from_env() -> Result<Self> {
        Self::from_var(LOG_ENV)
    }

    fn from_var(var: &str) -> Result<Self> {
        let log_level = oxiobj_log::level_from_env(var).map_err(|msg| {
            warn!("{}", msg);
            Error::InvalidArgument
        })?;
        Ok(RuntimeConfig { log_level })
    }

    #[must_use]
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Installs the configuration.
    pub fn apply(&self) {
        if let Some(level) = self.log_level {
            oxiobj_log::set_level(level);
        }
    }
}
