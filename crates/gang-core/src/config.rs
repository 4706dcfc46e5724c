// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine tuning knobs.
use serde::{Deserialize, Serialize};

use crate::attrs::DEFAULT_MAX_EVAL_DEPTH;

/// Configuration shared by the matcher and the saturation graph.
///
/// Deserializes with defaults for missing fields, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Bound on nested attribute evaluation; deeper chains evaluate to `Error`.
    pub max_eval_depth: usize,
    /// Upper bound on saturation passes; `None` runs to the fixed point.
    pub max_saturation_passes: Option<usize>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_eval_depth: DEFAULT_MAX_EVAL_DEPTH,
            max_saturation_passes: None,
        }
    }
}
