//! Level estimator placeholder. The stage exists in the fixed stage list
//! but cannot be enabled.

use crate::audio_processing::Error;
use crate::stage::{Stage, StageKind, StreamContext};

/// Level estimator stage. Enabling it fails with
/// [`Error::UnsupportedComponent`].
#[derive(Debug)]
pub struct LevelEstimator {
    enabled: bool,
}

impl LevelEstimator {
    pub(crate) fn new() -> Self {
        Self { enabled: false }
    }
}

impl Stage for LevelEstimator {
    fn kind(&self) -> StageKind {
        StageKind::LevelEstimator
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, _ctx: &StreamContext) -> Result<(), Error> {
        if self.enabled {
            return Err(Error::UnsupportedComponent);
        }
        Ok(())
    }

    fn version(&self) -> &'static str {
        ""
    }
}
