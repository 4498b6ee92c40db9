//! Cloud environments and their Resource Manager endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// A named Azure cloud, or a custom one with an explicit endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CloudEnvironment {
    #[default]
    AzureCloud,
    AzureChinaCloud,
    AzureUSGovernment,
    AzureGermanCloud,
    /// Endpoint supplied by configuration (Azure Stack, emulators, tests).
    #[serde(rename = "custom")]
    Custom,
}

impl CloudEnvironment {
    /// Well-known Resource Manager endpoint, `None` for [`Custom`](Self::Custom).
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Self::AzureCloud => Some("https://management.azure.com/"),
            Self::AzureChinaCloud => Some("https://management.chinacloudapi.cn/"),
            Self::AzureUSGovernment => Some("https://management.usgovcloudapi.net/"),
            Self::AzureGermanCloud => Some("https://management.microsoftazure.de/"),
            Self::Custom => None,
        }
    }

    /// Resolve the endpoint, letting an explicit override win.
    pub fn resource_manager_endpoint(&self, override_endpoint: Option<&str>) -> Result<Url, String> {
        let raw = match (override_endpoint, self.default_endpoint()) {
            (Some(endpoint), _) => endpoint,
            (None, Some(endpoint)) => endpoint,
            (None, None) => {
                return Err(format!(
                    "cloud environment '{}' requires resource_manager_endpoint",
                    self
                ))
            }
        };
        let mut url = Url::parse(raw).map_err(|e| format!("invalid endpoint '{}': {}", raw, e))?;
        if url.cannot_be_a_base() {
            return Err(format!("invalid endpoint '{}': not a base URL", raw));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

impl fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AzureCloud => "AzureCloud",
            Self::AzureChinaCloud => "AzureChinaCloud",
            Self::AzureUSGovernment => "AzureUSGovernment",
            Self::AzureGermanCloud => "AzureGermanCloud",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

impl FromStr for CloudEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "azurecloud" | "azurepubliccloud" | "public" => Ok(Self::AzureCloud),
            "azurechinacloud" | "china" => Ok(Self::AzureChinaCloud),
            "azureusgovernment" | "azureusgovernmentcloud" | "usgov" => {
                Ok(Self::AzureUSGovernment)
            }
            "azuregermancloud" | "germany" => Ok(Self::AzureGermanCloud),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown cloud environment '{}'", other)),
        }
    }
}
