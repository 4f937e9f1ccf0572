//! Error types for the analog circuit engine.
//!
//! Errors only surface at construction time (building a tree, deriving a
//! scattering matrix, precomputing NDK matrices) and in the CLI. The
//! per-sample paths never return errors: numerical trouble there is recovered
//! locally, see [`crate::ndk::NdkSolver`].

use thiserror::Error;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Unified error type for all engine operations.
#[derive(Error, Debug)]
pub enum SimError {
    // ============ Construction Errors ============
    /// Invalid component value
    #[error("Invalid parameter '{param}' for '{component}': {message}")]
    InvalidParameter {
        component: String,
        param: String,
        message: String,
    },

    /// Netlist matrices disagree with the solver's compile-time sizes
    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    // ============ Numerical Errors ============
    /// Matrix is singular and cannot be inverted
    #[error("Singular matrix while computing {context} - topology may contain a short circuit or floating node")]
    SingularMatrix { context: String },

    /// Sample rate is not usable for discretization
    #[error("Invalid sample rate {sample_rate} Hz")]
    InvalidSampleRate { sample_rate: f64 },

    // ============ I/O Errors ============
    /// Error reading audio input
    #[error("Audio input error: {message}")]
    AudioInputError { message: String },

    /// Error writing audio output
    #[error("Audio output error: {message}")]
    AudioOutputError { message: String },

    /// Unknown circuit name given on the command line or through bindings
    #[error("Unknown circuit '{name}'")]
    UnknownCircuit { name: String },
}

impl SimError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(
        component: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            component: component.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create a singular matrix error
    pub fn singular(context: impl Into<String>) -> Self {
        Self::SingularMatrix {
            context: context.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

/// Reject component values that are not strictly positive and finite.
pub(crate) fn require_positive(component: &str, param: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SimError::invalid_parameter(
            component,
            param,
            format!("must be positive and finite, got {value}"),
        ))
    }
}

/// Reject sample rates that cannot discretize a reactive element.
pub(crate) fn require_sample_rate(sample_rate: f64) -> Result<f64> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(sample_rate)
    } else {
        Err(SimError::InvalidSampleRate { sample_rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_positive() {
        assert!(require_positive("R1", "resistance", 1.0e3).is_ok());
        assert!(require_positive("R1", "resistance", 0.0).is_err());
        assert!(require_positive("C1", "capacitance", f64::NAN).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = SimError::singular("S0");
        assert!(err.to_string().contains("S0"));

        let err = SimError::dimension("Nr columns", 9, 8);
        assert_eq!(
            err.to_string(),
            "Dimension mismatch in Nr columns: expected 9, got 8"
        );
    }
}
