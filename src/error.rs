//! Engine error type.
//!
//! The engine fails loudly only on internal invariant violations, which
//! indicate a trait defect rather than bad input. Invalid external input is
//! ignored at the boundary and never surfaces here.

use std::error::Error;
use std::fmt;

/// Fatal engine errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The effects chain failed to reach a fixed point within the pass cap,
    /// which signals a cyclic trait dependency. Carries the keys that were
    /// still toggling on the final pass and the number of passes run.
    EffectsDivergence {
        /// Keys that newly changed on the last pass before giving up.
        keys: Vec<String>,
        /// Number of chain passes executed.
        passes: usize,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::EffectsDivergence { keys, passes } => {
                write!(
                    f,
                    "state effects failed to converge after {} passes; still toggling: {}",
                    passes,
                    keys.join(", ")
                )
            }
        }
    }
}

impl Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divergence_display() {
        let err = EngineError::EffectsDivergence {
            keys: vec!["cursor".to_string(), "selection".to_string()],
            passes: 100,
        };
        let text = err.to_string();
        assert!(text.contains("100 passes"));
        assert!(text.contains("cursor, selection"));
    }
}
