use thiserror::Error;

/// Configuration shared by the Krylov solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    max_iters: usize,
    abs_tol: f64,
    rel_tol: f64,
}

/// Errors that can occur when validating a Krylov solver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("abs_tol must be finite and non-negative")]
    AbsTol,

    #[error("rel_tol must be finite and non-negative")]
    RelTol,

    #[error("abs_tol and rel_tol cannot both be zero")]
    ZeroTolerance,
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(1000, 1e-14, 1e-12).unwrap()
    }
}

impl Config {
    /// Creates a new config with validated tolerances.
    ///
    /// # Errors
    ///
    /// Returns an error if any tolerance is negative or non-finite, or if both
    /// are zero.
    pub fn new(max_iters: usize, abs_tol: f64, rel_tol: f64) -> Result<Self, ConfigError> {
        if !abs_tol.is_finite() || abs_tol < 0.0 {
            return Err(ConfigError::AbsTol);
        }
        if !rel_tol.is_finite() || rel_tol < 0.0 {
            return Err(ConfigError::RelTol);
        }
        if abs_tol == 0.0 && rel_tol == 0.0 {
            return Err(ConfigError::ZeroTolerance);
        }

        Ok(Self {
            max_iters,
            abs_tol,
            rel_tol,
        })
    }

    /// Returns the maximum number of iterations.
    #[must_use]
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    /// Returns the absolute residual tolerance.
    #[must_use]
    pub fn abs_tol(&self) -> f64 {
        self.abs_tol
    }

    /// Returns the residual tolerance relative to `‖b‖`.
    #[must_use]
    pub fn rel_tol(&self) -> f64 {
        self.rel_tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_tolerances() {
        assert_eq!(Config::new(10, -1.0, 1e-8), Err(ConfigError::AbsTol));
        assert_eq!(Config::new(10, 1e-8, f64::NAN), Err(ConfigError::RelTol));
        assert_eq!(Config::new(10, 0.0, 0.0), Err(ConfigError::ZeroTolerance));
    }

    #[test]
    fn default_is_valid() {
        let config = Config::default();
        assert_eq!(config.max_iters(), 1000);
        assert!(config.abs_tol() > 0.0);
    }
}
