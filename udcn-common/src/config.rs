//! Forwarder-wide configuration.
//!
//! Loaded through the `config` crate from an optional TOML file, then
//! environment variables (`UDCN_*` prefix), then CLI flags — each
//! source overriding the previous, in that order.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// UDP listen port for the LinkLayer.
    pub port: u16,
    /// TCP listen port for the management socket (`newface` et al).
    pub management_port: u16,
    /// Payload bytes per chunk in the ChunkLayer.
    pub chunk_size: usize,
    /// How long a PIT entry may sit unanswered before ageing evicts it.
    pub pit_timeout_ms: u64,
    /// Time-to-live applied to freshly inserted CS entries.
    pub cs_ttl_ms: u64,
    /// Maximum number of entries held in the Content Store.
    pub cs_capacity: usize,
    /// How long a keep-alive may go unrefreshed before the upstream is
    /// presumed gone. Must be >= `ageing_interval_ms`.
    pub keepalive_timeout_interval_ms: u64,
    /// Period of every layer's ageing tick.
    pub ageing_interval_ms: u64,
    /// How long ChunkLayer reassembly waits for a missing chunk.
    pub chunk_timeout_ms: u64,
    /// Language tag -> executor binding recognized by the NFN layer.
    pub executors: HashMap<String, String>,
    /// Whether unmatched NFN Interests with no FIB route are handed to
    /// the local NFN layer instead of being Nacked.
    pub interest_to_app: bool,
    /// Whether the Content Store caches unsolicited Content (Content
    /// with no matching PIT entry).
    pub cache_unsolicited: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        let mut executors = HashMap::new();
        executors.insert("PYTHON".to_string(), "python".to_string());

        Self {
            port: 9000,
            management_port: 9001,
            chunk_size: 4096,
            pit_timeout_ms: 4_000,
            cs_ttl_ms: 10_000,
            cs_capacity: 4096,
            keepalive_timeout_interval_ms: 2_000,
            ageing_interval_ms: 1_000,
            chunk_timeout_ms: 4_000,
            executors,
            interest_to_app: true,
            cache_unsolicited: false,
        }
    }
}

impl ForwarderConfig {
    /// Loads configuration from an optional TOML file, then `UDCN_*`
    /// environment variables, falling back to [`Default::default`] for
    /// anything neither source sets.
    pub fn load(file_path: Option<&Path>) -> Result<Self, Error> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(config_err)?);

        if let Some(path) = file_path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("UDCN").separator("__"));

        let settings = builder.build().map_err(config_err)?;
        settings.try_deserialize().map_err(config_err)
    }

    /// Sanity-checks cross-field invariants noted in the specification
    /// (`keepalive_timeout_interval` >= `ageing_interval`).
    pub fn validate(&self) -> Result<(), Error> {
        if self.keepalive_timeout_interval_ms < self.ageing_interval_ms {
            return Err(Error::Config(format!(
                "keepalive_timeout_interval_ms ({}) must be >= ageing_interval_ms ({})",
                self.keepalive_timeout_interval_ms, self.ageing_interval_ms
            )));
        }
        Ok(())
    }
}

fn config_err(e: impl std::fmt::Display) -> Error {
    Error::Config(e.to_string())
}
