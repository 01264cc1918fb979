// Copyright (c) 2025 Rajan Panneer Selvam
//
// Licensed under the Business Source License 1.1 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.mariadb.com/bsl11
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use config::{Config as ConfigFile, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub aws: AwsIdentityConfig,
    #[serde(default)]
    pub streams: StreamServiceConfig,
    #[serde(default)]
    pub persist: PersistConfig,
    /// Streams created on boot, keyed by region.
    #[serde(default)]
    pub initialize_streams: HashMap<String, Vec<InitialStreamConfig>>,
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub plain_port: u16,
    pub tls_port: u16,
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            plain_port: 4567,
            tls_port: 4568,
            tls: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsIdentityConfig {
    pub account_id: String,
    pub region: String,
}

impl Default for AwsIdentityConfig {
    fn default() -> Self {
        Self {
            account_id: "000000000000".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamServiceConfig {
    /// Delay before a new stream flips CREATING -> ACTIVE.
    pub create_stream_duration_ms: u64,
    /// Delay before a DELETING stream is removed.
    pub delete_stream_duration_ms: u64,
    /// Delay before UPDATING flips back to ACTIVE.
    pub update_stream_duration_ms: u64,
    pub register_consumer_duration_ms: u64,
    pub deregister_consumer_duration_ms: u64,
    /// Per-account open shard limit.
    pub shard_limit: usize,
    pub on_demand_stream_count_limit: usize,
    pub iterator_ttl_seconds: u64,
    pub retention_sweep_interval_ms: u64,
}

impl Default for StreamServiceConfig {
    fn default() -> Self {
        Self {
            create_stream_duration_ms: 500,
            delete_stream_duration_ms: 500,
            update_stream_duration_ms: 500,
            register_consumer_duration_ms: 500,
            deregister_consumer_duration_ms: 500,
            shard_limit: 50,
            on_demand_stream_count_limit: 10,
            iterator_ttl_seconds: 300,
            retention_sweep_interval_ms: 30_000,
        }
    }
}

impl StreamServiceConfig {
    pub fn create_stream_duration(&self) -> Duration {
        Duration::from_millis(self.create_stream_duration_ms)
    }

    pub fn delete_stream_duration(&self) -> Duration {
        Duration::from_millis(self.delete_stream_duration_ms)
    }

    pub fn update_stream_duration(&self) -> Duration {
        Duration::from_millis(self.update_stream_duration_ms)
    }

    pub fn register_consumer_duration(&self) -> Duration {
        Duration::from_millis(self.register_consumer_duration_ms)
    }

    pub fn deregister_consumer_duration(&self) -> Duration {
        Duration::from_millis(self.deregister_consumer_duration_ms)
    }

    pub fn iterator_ttl(&self) -> Duration {
        Duration::from_secs(self.iterator_ttl_seconds)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.retention_sweep_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    pub should_persist: bool,
    pub interval_ms: u64,
    pub path: String,
    pub load_if_exists: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            should_persist: false,
            interval_ms: 5_000,
            path: "kinesim-data.snapshot".to_string(),
            load_if_exists: true,
        }
    }
}

impl PersistConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// One entry of `initialize_streams`; mirrors the CreateStream request shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialStreamConfig {
    pub stream_name: String,
    pub shard_count: Option<i32>,
    pub stream_mode: Option<String>,
}

pub fn load_config() -> Result<Config, Box<dyn Error>> {
    // Load .env file if it exists
    dotenv::dotenv().ok();

    let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config".to_string());

    let config = ConfigFile::builder()
        // Start with default settings
        .add_source(File::with_name(&format!("{}.default", config_path)).required(false))
        // Add config file settings
        .add_source(File::with_name(&config_path).required(false))
        // Add environment variables (with prefix KINESIM_)
        .add_source(Environment::with_prefix("KINESIM").separator("__"))
        .build()?;

    let config: Config = config.try_deserialize()?;

    Ok(config)
}
