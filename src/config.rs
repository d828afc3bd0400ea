use thiserror::*;

/// Default spacing of the sampling grid used to flatten controller envelopes.
pub const DEFAULT_CONTROLLER_UPDATE_INTERVAL_MS: u32 = 50;

/// Settings that shape how score data is turned into `Moment`s.
///
/// All of them are fixed for the lifetime of a loaded `Score`; changing the
/// speed means loading the score again.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScoreConfig {
    /// Distance between two sampled controller values, in ms.
    ///
    /// Defaults to 50.
    pub controller_update_interval_ms: u32,

    /// The shortest duration a `MidiObject` may have after speed scaling.
    ///
    /// Defaults to 1.
    pub min_duration_ms: u32,

    /// Speed factor applied to every score position: 2.0 plays twice as
    /// fast, 0.5 half as fast.
    ///
    /// Defaults to 1.0.
    pub speed: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("The controller update interval must be at least 1 ms.")]
    ZeroUpdateInterval,
    #[error("The minimum object duration must be at least 1 ms.")]
    ZeroMinimumDuration,
    #[error("Speed factor {0} is not a positive finite number.")]
    BadSpeed(f64),
}

impl Default for ScoreConfig {
    fn default() -> Self {
        ScoreConfig {
            controller_update_interval_ms: DEFAULT_CONTROLLER_UPDATE_INTERVAL_MS,
            min_duration_ms: 1,
            speed: 1.0,
        }
    }
}

impl ScoreConfig {
    pub fn with_update_interval(self, controller_update_interval_ms: u32) -> Self {
        ScoreConfig {
            controller_update_interval_ms,
            ..self
        }
    }

    pub fn with_speed(self, speed: f64) -> Self {
        ScoreConfig { speed, ..self }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller_update_interval_ms == 0 {
            return Err(ConfigError::ZeroUpdateInterval);
        }
        if self.min_duration_ms == 0 {
            return Err(ConfigError::ZeroMinimumDuration);
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(ConfigError::BadSpeed(self.speed));
        }
        Ok(())
    }

    /// Maps an unscaled score position to its position at this speed.
    ///
    /// Positions are scaled absolutely and rounded, so durations computed as
    /// differences of scaled positions never drift.
    pub fn scale(&self, ms_position: u32) -> u32 {
        if self.speed == 1.0 {
            return ms_position;
        }
        let scaled = (f64::from(ms_position) / self.speed).round();
        if scaled >= f64::from(u32::MAX - 1) {
            u32::MAX - 1
        } else {
            scaled as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert_eq!(Ok(()), ScoreConfig::default().validate());
        assert_eq!(
            Err(ConfigError::ZeroUpdateInterval),
            ScoreConfig::default().with_update_interval(0).validate()
        );
        assert_eq!(
            Err(ConfigError::BadSpeed(-1.0)),
            ScoreConfig::default().with_speed(-1.0).validate()
        );
        assert!(ScoreConfig::default()
            .with_speed(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_scale() {
        let normal = ScoreConfig::default();
        assert_eq!(1234, normal.scale(1234));
        let fast = ScoreConfig::default().with_speed(2.0);
        assert_eq!(500, fast.scale(1000));
        assert_eq!(2, fast.scale(3));
        let slow = ScoreConfig::default().with_speed(0.5);
        assert_eq!(2000, slow.scale(1000));
    }
}
