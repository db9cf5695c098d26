//! Synthetic signal source for the broadcast stream.
//!
//! [`FrameGenerator`] produces one [`Frame`] per call: a noisy sine wave
//! sampled over a `2π` window that slides forward by a fixed logical step
//! each time. The clock is logical, not wall time.

use std::f64::consts::TAU;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::ServerError;

/// Logical clock advance per generated frame.
pub const CLOCK_STEP: f64 = 0.1;

/// Generator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    /// Seconds between frames. Pacing only; not part of the frame.
    pub sample_rate: f64,
    /// Number of samples per frame. Must be at least 2.
    pub points_per_frame: usize,
    /// Amplitude of the gaussian noise added to every sample.
    pub noise_level: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 0.05,
            points_per_frame: 100,
            noise_level: 0.1,
        }
    }
}

impl GeneratorConfig {
    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] when `points_per_frame < 2`,
    /// when `noise_level` is negative or not finite, or when `sample_rate`
    /// is not a positive finite number of seconds.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.points_per_frame < 2 {
            return Err(ServerError::InvalidConfig(format!(
                "points_per_frame must be at least 2, got {}",
                self.points_per_frame
            )));
        }
        if !self.noise_level.is_finite() || self.noise_level < 0.0 {
            return Err(ServerError::InvalidConfig(format!(
                "noise_level must be a non-negative number, got {}",
                self.noise_level
            )));
        }
        self.sample_interval().map(|_| ())
    }

    /// Returns `sample_rate` as a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] if `sample_rate` is not a
    /// positive finite number of seconds.
    pub fn sample_interval(&self) -> Result<Duration, ServerError> {
        if self.sample_rate <= 0.0 {
            return Err(ServerError::InvalidConfig(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        Duration::try_from_secs_f64(self.sample_rate).map_err(|e| {
            ServerError::InvalidConfig(format!("sample_rate {}: {e}", self.sample_rate))
        })
    }
}

/// One generated unit of signal data.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Logical clock value at generation time.
    pub timestamp: f64,
    /// Sample positions.
    pub x: Vec<f64>,
    /// Sample values.
    pub y: Vec<f64>,
}

impl Frame {
    /// Shape of the sample arrays, always `[N]`.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        vec![self.y.len()]
    }
}

/// Stateful frame source.
///
/// The only mutable state is the logical clock (plus the noise RNG).
#[derive(Debug)]
pub struct FrameGenerator {
    config: GeneratorConfig,
    sample_interval: Duration,
    clock: f64,
    rng: StdRng,
}

impl FrameGenerator {
    /// Creates a generator seeded from OS entropy.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: GeneratorConfig) -> Result<Self, ServerError> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Creates a generator with a fixed noise seed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] if `config` fails validation.
    pub fn with_seed(config: GeneratorConfig, seed: u64) -> Result<Self, ServerError> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GeneratorConfig, rng: StdRng) -> Result<Self, ServerError> {
        config.validate()?;
        let sample_interval = config.sample_interval()?;
        Ok(Self {
            config,
            sample_interval,
            clock: 0.0,
            rng,
        })
    }

    /// Returns the generator settings.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Pause between frames.
    #[must_use]
    pub const fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Current logical clock value.
    #[must_use]
    pub const fn clock(&self) -> f64 {
        self.clock
    }

    /// Produces the next frame and advances the clock by [`CLOCK_STEP`].
    pub fn generate_next(&mut self) -> Frame {
        let n = self.config.points_per_frame;
        let x = linspace(self.clock, self.clock + TAU, n);
        let y = if self.config.noise_level == 0.0 {
            x.iter().map(|v| v.sin()).collect()
        } else {
            x.iter()
                .map(|v| {
                    let noise: f64 = self.rng.sample(StandardNormal);
                    v.sin() + self.config.noise_level * noise
                })
                .collect()
        };

        let frame = Frame {
            timestamp: self.clock,
            x,
            y,
        };
        self.clock += CLOCK_STEP;
        frame
    }

    /// Rewinds the clock to `0.0`. Settings are untouched.
    pub fn reset(&mut self) {
        self.clock = 0.0;
    }
}

/// `n` evenly spaced values over `[start, stop]`, both ends included.
fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![start; n];
    }
    let step = (stop - start) / (n - 1) as f64;
    let mut values: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
    if let Some(last) = values.last_mut() {
        *last = stop;
    }
    values
}
