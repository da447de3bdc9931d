//! Builder configuration.

use serde::{Deserialize, Serialize};

/// Options for a dataflow build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Convert sibling blocks of each tree level on the rayon pool
    pub parallel: bool,

    /// Run [`verify_block`](crate::verify_block) on every converted block
    pub verify: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            verify: true,
        }
    }
}

impl BuilderConfig {
    /// Set parallel conversion
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set post-conversion verification
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}
