use snafu::Snafu;

/// A generic, type-erased error.
///
/// Used at the edges of the engine where the failure comes from a collaborator (such as an [`Explainer`][crate::Explainer])
/// and the only reasonable thing to do with it is to report it.
pub type GenericError = anyhow::Error;

/// Errors that prevent a simulation from starting.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ConfigurationError {
    /// No services were provided.
    #[snafu(display("no services were provided: at least one service is required to run a simulation"))]
    EmptyPopulation,

    /// The glitch threshold is outside of `(0, 1]`.
    #[snafu(display("glitch threshold must be within (0, 1], got {}", value))]
    InvalidThreshold {
        /// Configured threshold.
        value: f64,
    },

    /// The dampening factor is negative or not finite.
    #[snafu(display("dampening alpha must be finite and non-negative, got {}", value))]
    InvalidAlpha {
        /// Configured dampening factor.
        value: f64,
    },

    /// The degradation magnitude range is empty, negative, or not finite.
    #[snafu(display("degradation range [{}, {}) is invalid", min, max))]
    InvalidDegradationRange {
        /// Lower bound of the range.
        min: f64,

        /// Upper bound of the range.
        max: f64,
    },

    /// The incident buffer has no capacity.
    #[snafu(display("incident buffer capacity must be non-zero"))]
    ZeroBufferCapacity,

    /// A service declares a health value that is not a finite number.
    #[snafu(display("service '{}' has non-finite health {}", name, health))]
    InvalidHealth {
        /// Name of the offending service.
        name: String,

        /// Declared health.
        health: f64,
    },
}
