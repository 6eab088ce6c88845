//! Runtime Configuration
//!
//! A [`RuntimeConfig`] is handed to [`Runtime::with_config`](crate::Runtime::with_config)
//! and stays fixed for the lifetime of that runtime. Every field has a default,
//! so a partial JSON document is enough:
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_json(r#"{ "max_effect_depth": 32 }"#)?;
//! let runtime = Runtime::with_config(config);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default limit on nested effect frames.
pub const DEFAULT_MAX_EFFECT_DEPTH: usize = 100;

/// Tunables for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of effect frames that may be stacked at once.
    ///
    /// Two effects that write each other's inputs re-trigger one another
    /// without bound; the run that would exceed this depth fails with
    /// [`ReactiveError::DepthExceeded`](crate::ReactiveError::DepthExceeded).
    pub max_effect_depth: usize,

    /// Skip notification when a field is overwritten with an equal value.
    ///
    /// The write itself still happens. Off by default: every write notifies.
    pub skip_unchanged_writes: bool,
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_effect_depth: DEFAULT_MAX_EFFECT_DEPTH,
            skip_unchanged_writes: false,
        }
    }
}
