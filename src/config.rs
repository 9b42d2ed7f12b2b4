use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top level configuration.
///
/// Every field has a default, so an empty document is a valid configuration
/// targeting Amazon SES:
///
/// ```toml
/// [relay]
/// enabled = true
/// host_domain = "amazonaws.com"
/// id_domain = "amazonses.com"
///
/// [bounce]
/// annotate = true
/// report_label = "SES Report"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub relay: RelayConfig,
    pub bounce: BounceConfig,
}

/// How the relay is recognised and how it names the messages it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Capture relay ids at send time
    pub enabled: bool,
    /// Trailing two labels of the relay's submission host,
    /// e.g. `email-smtp.us-east-1.amazonaws.com`
    pub host_domain: String,
    /// Domain the relay uses in the ids it issues; prefixed with the region
    pub id_domain: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host_domain: "amazonaws.com".to_string(),
            id_domain: "amazonses.com".to_string(),
        }
    }
}

impl RelayConfig {
    /// A relay that submits and issues ids under the same domain.
    #[must_use]
    pub fn for_domain(domain: &str) -> Self {
        Self {
            host_domain: domain.to_string(),
            id_domain: domain.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BounceConfig {
    /// Prepend the report classification to the bounce description
    pub annotate: bool,
    pub report_label: String,
}

impl Default for BounceConfig {
    fn default() -> Self {
        Self {
            annotate: true,
            report_label: "SES Report".to_string(),
        }
    }
}

impl TrackingConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// If the document is not valid TOML or a field has the wrong type.
    pub fn from_toml(config: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config)?)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// If the file doesn't exist, is not readable, or is not a valid
    /// configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = fs::read_to_string(path)?;
        Self::from_toml(&config)
    }
}
