//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let temperature = self.model.temperature;
        if temperature.is_nan() || temperature <= 0.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.model.lambda) {
            return Err(ConfigError::ValidationError(
                "model.lambda must be between 0.0 and 1.0".into(),
            ));
        }
        if self.model.embedding_dim == 0 {
            return Err(ConfigError::ValidationError(
                "model.embedding_dim must be > 0".into(),
            ));
        }
        if self.model.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "model.image_size must be > 0".into(),
            ));
        }
        if self.model.max_length == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_length must be > 0".into(),
            ));
        }
        if self.prompts.per_class == Some(0) {
            return Err(ConfigError::ValidationError(
                "prompts.per_class must be > 0 (omit it to keep every candidate)".into(),
            ));
        }
        if self.prompts.sources.is_empty() {
            return Err(ConfigError::ValidationError(
                "prompts.sources must name at least one source".into(),
            ));
        }
        if self.evaluation.trials == 0 {
            return Err(ConfigError::ValidationError(
                "evaluation.trials must be > 0".into(),
            ));
        }
        if self.evaluation.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "evaluation.batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}
