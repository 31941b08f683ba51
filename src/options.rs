use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("min_ring_size must be at least 3, got {0}")]
    RingTooSmall(usize),
    #[error("min_ring_size {min} exceeds max_ring_size {max}")]
    RingBoundsInverted { min: usize, max: usize },
    #[error("{0} must be positive")]
    Zero(&'static str),
}

/// Which rings the aromaticity perceiver looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AromaticityOptions {
    pub min_ring_size: usize,
    pub max_ring_size: usize,
    /// Evaluate the perimeter of two fused rings when one of them fails alone.
    pub fused_envelopes: bool,
}

impl Default for AromaticityOptions {
    fn default() -> Self {
        Self {
            min_ring_size: 5,
            max_ring_size: 7,
            fused_envelopes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CanonicalOptions {
    /// Upper bound on refinement rounds per partition.
    pub max_iterations: usize,
}

impl Default for CanonicalOptions {
    fn default() -> Self {
        Self { max_iterations: 64 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KekulizeOptions {
    /// Backtracking steps before falling back to blossom matching.
    pub max_steps: usize,
}

impl Default for KekulizeOptions {
    fn default() -> Self {
        Self { max_steps: 100_000 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    pub canonical: bool,
    /// Write explicit single/double bonds instead of lowercase symbols.
    pub kekule: bool,
    /// Refinement bound for canonical ranking; taken from `[canonical]`.
    #[serde(skip)]
    pub ranking: CanonicalOptions,
    #[serde(skip)]
    pub kekulize: KekulizeOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub aromaticity: AromaticityOptions,
    pub kekulize: KekulizeOptions,
}

/// Every tunable in one place, loadable from TOML.
///
/// ```
/// let config = chemgraph::Config::from_toml_str(
///     "[aromaticity]\nmax_ring_size = 8\n[write]\ncanonical = true\n",
/// )
/// .unwrap();
/// assert_eq!(config.aromaticity.max_ring_size, 8);
/// assert_eq!(config.aromaticity.min_ring_size, 5);
/// assert!(config.write.canonical);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub aromaticity: AromaticityOptions,
    pub kekulize: KekulizeOptions,
    pub canonical: CanonicalOptions,
    pub write: WriteOptions,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let arom = &self.aromaticity;
        if arom.min_ring_size < 3 {
            return Err(ConfigError::RingTooSmall(arom.min_ring_size));
        }
        if arom.min_ring_size > arom.max_ring_size {
            return Err(ConfigError::RingBoundsInverted {
                min: arom.min_ring_size,
                max: arom.max_ring_size,
            });
        }
        if self.canonical.max_iterations == 0 {
            return Err(ConfigError::Zero("canonical.max_iterations"));
        }
        Ok(())
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            aromaticity: self.aromaticity,
            kekulize: self.kekulize,
        }
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            ranking: self.canonical,
            kekulize: self.kekulize,
            ..self.write
        }
    }
}
