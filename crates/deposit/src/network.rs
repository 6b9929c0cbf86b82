//! Network configuration registry.
//!
//! Profiles are layered with figment: built-in defaults, then an optional
//! TOML file, then `DIO_`-prefixed environment variables (nested keys are
//! separated by `__`, e.g. `DIO_NETWORKS__GOERLI__RPC_URL`).

use std::{
    collections::BTreeMap,
    fmt,
    path::Path,
};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DepositError, Result};

/// The default name for the network configuration file.
pub const CONFIG_FILENAME: &str = "Dio.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DIO_";

/// Identifier of the built-in rehearsal profile.
pub const LOCALHOST: &str = "localhost";

/// Default RPC endpoint of a local fork (Anvil or Hardhat).
pub const LOCALHOST_RPC_URL: &str = "http://127.0.0.1:8545";

/// Whether a network is a disposable fork or a real chain.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkKind {
    /// Local fork where accounts can be impersonated.
    Rehearsal,
    /// Real network; only key-signed transactions.
    #[default]
    Live,
}

/// Gas limit policy for submitted transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GasPolicy {
    /// Ask the node to estimate each transaction.
    #[default]
    Auto,
    /// Use this gas limit for every transaction.
    Fixed(u64),
}

impl fmt::Display for GasPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasPolicy::Auto => write!(f, "auto"),
            GasPolicy::Fixed(limit) => write!(f, "{limit}"),
        }
    }
}

impl Serialize for GasPolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            GasPolicy::Auto => serializer.serialize_str("auto"),
            GasPolicy::Fixed(limit) => serializer.serialize_u64(*limit),
        }
    }
}

impl<'de> Deserialize<'de> for GasPolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Limit(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Limit(limit) => Ok(GasPolicy::Fixed(limit)),
            Raw::Text(text) if text.eq_ignore_ascii_case("auto") => Ok(GasPolicy::Auto),
            // Env values always arrive as strings.
            Raw::Text(text) => text
                .parse()
                .map(GasPolicy::Fixed)
                .map_err(|_| serde::de::Error::custom(format!("invalid gas policy '{text}'"))),
        }
    }
}

/// A secret that must never show up in logs or rendered config.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Raw per-network settings as written in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub kind: NetworkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<Credential>,
    pub gas: GasPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

/// Block-explorer verification settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<Credential>,
}

/// Whether the caller intends to sign transactions with a held key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningRequirement {
    Required,
    NotRequired,
}

/// Connection parameters for one network, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub identifier: String,
    pub kind: NetworkKind,
    pub rpc_url: Url,
    pub signing_credential: Option<Credential>,
    pub gas: GasPolicy,
    pub chain_id: Option<u64>,
    pub explorer_api_key: Option<Credential>,
}

impl NetworkProfile {
    pub fn is_rehearsal(&self) -> bool {
        self.kind == NetworkKind::Rehearsal
    }
}

/// Every configured network, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkRegistry {
    pub networks: BTreeMap<String, NetworkSettings>,
    pub explorer: ExplorerSettings,
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            LOCALHOST.to_string(),
            NetworkSettings {
                kind: NetworkKind::Rehearsal,
                rpc_url: Some(LOCALHOST_RPC_URL.to_string()),
                ..Default::default()
            },
        );

        Self {
            networks,
            explorer: ExplorerSettings::default(),
        }
    }
}

impl NetworkRegistry {
    /// Build the figment used by [`NetworkRegistry::load`].
    ///
    /// A missing file is not an error: defaults and the environment still
    /// apply.
    pub fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(NetworkRegistry::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the registry from `config_path` and the process environment.
    pub fn load(config_path: &Path) -> Result<Self> {
        Self::from_figment(Self::figment(config_path))
    }

    /// Extract a registry from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let registry: Self = figment
            .extract()
            .map_err(|e| DepositError::Configuration(e.to_string()))?;

        tracing::debug!(
            networks = ?registry.networks.keys().collect::<Vec<_>>(),
            "Network registry loaded"
        );

        Ok(registry)
    }

    /// Resolve `identifier` into a validated profile.
    pub fn resolve(&self, identifier: &str, signing: SigningRequirement) -> Result<NetworkProfile> {
        let settings = self.networks.get(identifier).ok_or_else(|| {
            DepositError::Configuration(format!(
                "unknown network '{}' (configured: {})",
                identifier,
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        let rpc_url = settings
            .rpc_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                DepositError::Configuration(format!("network '{identifier}' has no rpc_url"))
            })?;
        let rpc_url = Url::parse(rpc_url).map_err(|e| {
            DepositError::Configuration(format!("network '{identifier}' has an invalid rpc_url: {e}"))
        })?;

        let signing_credential = settings.private_key.clone().filter(|key| !key.is_blank());
        if signing == SigningRequirement::Required && signing_credential.is_none() {
            return Err(DepositError::Configuration(format!(
                "network '{identifier}' has no private_key but signing is required"
            )));
        }

        Ok(NetworkProfile {
            identifier: identifier.to_string(),
            kind: settings.kind,
            rpc_url,
            signing_credential,
            gas: settings.gas,
            chain_id: settings.chain_id,
            explorer_api_key: self.explorer.api_key.clone().filter(|key| !key.is_blank()),
        })
    }

    /// Render the registry as TOML with every credential redacted.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        for settings in redacted.networks.values_mut() {
            if settings.private_key.is_some() {
                settings.private_key = Some(Credential::new("<redacted>"));
            }
        }
        if redacted.explorer.api_key.is_some() {
            redacted.explorer.api_key = Some(Credential::new("<redacted>"));
        }

        toml::to_string_pretty(&redacted)
            .map_err(|e| DepositError::Configuration(format!("failed to render registry: {e}")))
    }
}
