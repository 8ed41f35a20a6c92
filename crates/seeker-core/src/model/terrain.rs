use crate::error::SearchError;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TerrainType {
    Flat = 0,
    Hilly = 1,
    Forested = 2,
    Caves = 3,
}

impl TerrainType {
    pub const ALL: [TerrainType; 4] = [
        TerrainType::Flat,
        TerrainType::Hilly,
        TerrainType::Forested,
        TerrainType::Caves,
    ];

    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(TerrainType::Flat),
            1 => Some(TerrainType::Hilly),
            2 => Some(TerrainType::Forested),
            3 => Some(TerrainType::Caves),
            _ => None,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Layout symbol: `F`, `H`, `W` (woods) or `C`.
    pub const fn symbol(self) -> char {
        match self {
            TerrainType::Flat => 'F',
            TerrainType::Hilly => 'H',
            TerrainType::Forested => 'W',
            TerrainType::Caves => 'C',
        }
    }

    pub const fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'F' | 'f' => Some(TerrainType::Flat),
            'H' | 'h' => Some(TerrainType::Hilly),
            'W' | 'w' => Some(TerrainType::Forested),
            'C' | 'c' => Some(TerrainType::Caves),
            _ => None,
        }
    }
}

impl fmt::Display for TerrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TerrainType::Flat => "flat",
            TerrainType::Hilly => "hilly",
            TerrainType::Forested => "forested",
            TerrainType::Caves => "caves",
        };
        f.write_str(label)
    }
}

/// Probability that searching the target's own cell still reports "not found".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureRates {
    pub flat: f64,
    pub hilly: f64,
    pub forested: f64,
    pub caves: f64,
}

impl Default for FailureRates {
    fn default() -> Self {
        Self {
            flat: 0.1,
            hilly: 0.3,
            forested: 0.7,
            caves: 0.9,
        }
    }
}

impl FailureRates {
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            flat: parse_env_rate("SEEKER_FN_FLAT", base.flat),
            hilly: parse_env_rate("SEEKER_FN_HILLY", base.hilly),
            forested: parse_env_rate("SEEKER_FN_FORESTED", base.forested),
            caves: parse_env_rate("SEEKER_FN_CAVES", base.caves),
        }
    }

    pub fn get(&self, terrain: TerrainType) -> f64 {
        match terrain {
            TerrainType::Flat => self.flat,
            TerrainType::Hilly => self.hilly,
            TerrainType::Forested => self.forested,
            TerrainType::Caves => self.caves,
        }
    }

    /// Every rate must sit strictly inside `(0, 1)`.
    pub fn validate(&self) -> Result<(), SearchError> {
        for terrain in TerrainType::ALL {
            let value = self.get(terrain);
            if !(value.is_finite() && value > 0.0 && value < 1.0) {
                return Err(SearchError::InvalidProbability {
                    name: rate_name(terrain),
                    value,
                });
            }
        }
        Ok(())
    }
}

fn rate_name(terrain: TerrainType) -> &'static str {
    match terrain {
        TerrainType::Flat => "failure_rates.flat",
        TerrainType::Hilly => "failure_rates.hilly",
        TerrainType::Forested => "failure_rates.forested",
        TerrainType::Caves => "failure_rates.caves",
    }
}

fn parse_env_rate(key: &str, fallback: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(0.01, 0.99))
        .unwrap_or(fallback)
}

/// Relative frequencies used when drawing a random grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainWeights {
    pub flat: f64,
    pub hilly: f64,
    pub forested: f64,
    pub caves: f64,
}

impl Default for TerrainWeights {
    fn default() -> Self {
        Self {
            flat: 0.2,
            hilly: 0.3,
            forested: 0.3,
            caves: 0.2,
        }
    }
}

impl TerrainWeights {
    /// Weights in [`TerrainType::ALL`] order.
    pub fn as_array(&self) -> [f64; 4] {
        [self.flat, self.hilly, self.forested, self.caves]
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        let weights = self.as_array();
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(SearchError::InvalidProbability {
                name: "terrain.weights",
                value: *bad,
            });
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(SearchError::InvalidProbability {
                name: "terrain.weights",
                value: total,
            });
        }
        Ok(())
    }
}
