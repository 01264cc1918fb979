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


use actix_web::{web, App, HttpServer};
use anyhow::Context;
use rustls::{Certificate, PrivateKey};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::routes;
use crate::config::{Config, TlsConfig};
use crate::services::cache::Cache;
use crate::services::{init, snapshot};
use crate::utils::clock::{SharedClock, SystemClock};

pub struct AppState {
    pub cache: Arc<Cache>,
}

/// Bring the engine up leaf-first (restore, scheduler, pre-init,
/// persistence) and serve until shutdown, then take a final snapshot.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let clock: SharedClock = Arc::new(SystemClock);

    let restored = if config.persist.load_if_exists {
        snapshot::load_snapshot(Path::new(&config.persist.path))?
    } else {
        None
    };
    let cache = match restored {
        Some(loaded) => {
            info!(path = %config.persist.path, "restoring engine state from snapshot");
            Cache::with_snapshot(config.clone(), clock, loaded)
        }
        None => Cache::new(config.clone(), clock),
    };

    tokio::spawn(cache.scheduler().run(cache.clone()));

    init::initialize_streams(&cache, &config).await;

    if config.persist.should_persist {
        tokio::spawn(snapshot::persistence_loop(
            cache.clone(),
            config.persist.clone(),
        ));
    }

    let state = web::Data::new(AppState {
        cache: cache.clone(),
    });
    let host = config.server.host.clone();

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind((host.as_str(), config.server.plain_port))
    .with_context(|| format!("binding plain listener on port {}", config.server.plain_port))?;
    info!(host = %host, port = config.server.plain_port, "listening for plain HTTP");

    if let Some(tls) = &config.server.tls {
        let tls_config = load_rustls_config(tls)?;
        server = server
            .bind_rustls_021((host.as_str(), config.server.tls_port), tls_config)
            .with_context(|| format!("binding TLS listener on port {}", config.server.tls_port))?;
        info!(host = %host, port = config.server.tls_port, "listening for TLS");
    } else {
        warn!("no TLS certificate configured; TLS listener disabled");
    }

    server.run().await?;

    if config.persist.should_persist {
        info!("writing final snapshot");
        snapshot::persist_now(&cache, &config.persist).await?;
    }
    Ok(())
}

fn load_rustls_config(tls: &TlsConfig) -> anyhow::Result<rustls::ServerConfig> {
    let cert_file = &mut BufReader::new(
        File::open(&tls.cert_path)
            .with_context(|| format!("opening TLS certificate {}", tls.cert_path))?,
    );
    let key_file = &mut BufReader::new(
        File::open(&tls.key_path)
            .with_context(|| format!("opening TLS key {}", tls.key_path))?,
    );

    let certs: Vec<Certificate> = rustls_pemfile::certs(cert_file)?
        .into_iter()
        .map(Certificate)
        .collect();
    let mut keys = rustls_pemfile::pkcs8_private_keys(key_file)?;
    if keys.is_empty() {
        anyhow::bail!("no PKCS#8 private key found in {}", tls.key_path);
    }

    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, PrivateKey(keys.remove(0)))?;
    Ok(config)
}
