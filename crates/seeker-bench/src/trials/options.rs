use seeker_bot::{DEFAULT_DISTANCE_THRESHOLD, DistanceAwarePolicy, SearchRule};
use thiserror::Error;

use crate::config::{PolicyConfig, PolicyKind};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid parameter for policy '{name}': {message}")]
    InvalidParam { name: String, message: String },
}

/// Validated policy entry, ready to spawn a search rule per trial.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyBlueprint {
    name: String,
    rule: SearchRule,
}

impl PolicyBlueprint {
    pub fn from_configs(configs: &[PolicyConfig]) -> Result<Vec<Self>, PolicyError> {
        configs.iter().map(Self::from_config).collect()
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyError> {
        let rule = match config.kind {
            PolicyKind::MaxContainment => SearchRule::MaxContainment,
            PolicyKind::MaxDetection => SearchRule::MaxDetection,
            PolicyKind::DistanceAware => {
                let threshold = parse_threshold(&config.name, &config.params)?;
                SearchRule::DistanceAware { threshold }
            }
        };

        Ok(Self {
            name: config.name.clone(),
            rule,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule(&self) -> SearchRule {
        self.rule
    }
}

fn parse_threshold(name: &str, params: &serde_yaml::Value) -> Result<f64, PolicyError> {
    if params.is_null() {
        return Ok(DEFAULT_DISTANCE_THRESHOLD);
    }

    let mapping = params
        .as_mapping()
        .ok_or_else(|| PolicyError::InvalidParam {
            name: name.to_string(),
            message: "expected mapping for distance-aware params".to_string(),
        })?;

    let Some(value) = mapping
        .iter()
        .find_map(|(key, value)| (key.as_str() == Some("threshold")).then_some(value))
    else {
        return Ok(DEFAULT_DISTANCE_THRESHOLD);
    };

    let threshold = value.as_f64().ok_or_else(|| PolicyError::InvalidParam {
        name: name.to_string(),
        message: "threshold must be a number".to_string(),
    })?;

    DistanceAwarePolicy::new(threshold).map_err(|err| PolicyError::InvalidParam {
        name: name.to_string(),
        message: err.to_string(),
    })?;

    Ok(threshold)
}
