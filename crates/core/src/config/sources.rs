//! Upstream endpoints for each rate source.

use serde::{Deserialize, Serialize};

/// Endpoint settings for one protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Include this protocol in aggregation
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// API base URL (may contain `${VAR}` placeholders)
    pub base_url: String,
    /// Lending market identifier, for protocols with several markets
    #[serde(default)]
    pub market: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    fn new(base_url: &str) -> Self {
        Self {
            enabled: true,
            base_url: base_url.to_string(),
            market: None,
        }
    }

    /// Base URL still contains a placeholder with no matching variable.
    pub fn has_unresolved_url(&self) -> bool {
        placeholder_pattern().map_or(false, |re| re.is_match(&self.base_url))
    }
}

/// Endpoints for every known protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_kamino")]
    pub kamino: SourceConfig,
    #[serde(default = "default_marginfi")]
    pub marginfi: SourceConfig,
    #[serde(default = "default_solend")]
    pub solend: SourceConfig,
}

fn default_kamino() -> SourceConfig {
    SourceConfig {
        market: Some(lendwatch_api::KAMINO_MAIN_MARKET.to_string()),
        ..SourceConfig::new("https://api.kamino.finance")
    }
}

// No public default; set MARGINFI_API_URL to enable
fn default_marginfi() -> SourceConfig {
    SourceConfig::new("${MARGINFI_API_URL}")
}

fn default_solend() -> SourceConfig {
    SourceConfig::new("https://api.solend.fi")
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            kamino: default_kamino(),
            marginfi: default_marginfi(),
            solend: default_solend(),
        }
    }
}

impl SourcesConfig {
    /// Look up a protocol's settings by id.
    pub fn get(&self, protocol: &str) -> Option<&SourceConfig> {
        match protocol {
            "kamino" => Some(&self.kamino),
            "marginfi" => Some(&self.marginfi),
            "solend" => Some(&self.solend),
            _ => None,
        }
    }

    /// Expand environment variables in every URL.
    pub fn expand_env_vars(&mut self) {
        for source in [&mut self.kamino, &mut self.marginfi, &mut self.solend] {
            source.base_url = expand_env(&source.base_url);
            if let Some(ref mut market) = source.market {
                *market = expand_env(market);
            }
        }
    }
}

fn placeholder_pattern() -> Option<regex_lite::Regex> {
    regex_lite::Regex::new(r"\$\{([^}]+)\}").ok()
}

/// Expand ${VAR_NAME} patterns with environment variable values.
///
/// Unset variables are left in place.
pub(crate) fn expand_env(s: &str) -> String {
    let Some(re) = placeholder_pattern() else {
        return s.to_string();
    };

    re.replace_all(s, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
