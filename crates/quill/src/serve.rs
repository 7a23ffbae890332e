// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `quill serve` command implementation.
//!
//! Opens the job database, wires the HTTP generator (and the optional
//! enrichment lookup) into a dispatcher, serves the gateway next to it,
//! and drains in-flight jobs on SIGINT/SIGTERM.

use std::sync::Arc;

use quill_config::QuillConfig;
use quill_core::{ContextEnricher, PluginAdapter, QuillError};
use quill_dispatch::{
    CachingEnricher, DispatchSettings, Dispatcher, FrameHub, install_signal_handler,
};
use quill_gateway::{GatewayState, start_server};
use quill_http::{HttpEnricher, HttpGenerator};
use quill_storage::SqliteStorage;
use tracing::{error, info};

/// Runs the `quill serve` command.
pub async fn run_serve(config: QuillConfig) -> Result<(), QuillError> {
    info!(name = %config.service.name, "starting quill serve");

    let storage = SqliteStorage::new(config.storage.clone())
        .with_default_max_retries(config.dispatch.max_retries);
    storage.initialize().await?;
    let storage = Arc::new(storage);

    let generator = Arc::new(HttpGenerator::new(&config.generator)?);
    info!(endpoint = generator.endpoint(), "generator configured");

    let mut dispatcher = Dispatcher::new(
        storage.clone(),
        generator,
        storage.clone(),
        storage.clone(),
        DispatchSettings::from_config(&config.dispatch),
    )
    .with_hub(Arc::new(FrameHub::new(config.gateway.stream_grace())));
    if let Some(endpoint) = &config.enrichment.endpoint {
        let lookup: Arc<dyn ContextEnricher> = Arc::new(HttpEnricher::new(endpoint.clone())?);
        dispatcher = dispatcher.with_enricher(Arc::new(CachingEnricher::new(
            lookup,
            config.enrichment.cache_ttl(),
        )));
        info!(endpoint = %endpoint, "context enrichment enabled");
    }
    let dispatcher = Arc::new(dispatcher);

    let shutdown = install_signal_handler();

    let gateway = config.gateway.enabled.then(|| {
        let state = GatewayState::new(dispatcher.clone());
        let gateway_config = config.gateway.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let result = start_server(&gateway_config, state, token.clone()).await;
            if let Err(e) = &result {
                error!(error = %e, "gateway failed, shutting down");
                token.cancel();
            }
            result
        })
    });

    log_allocator_stats();
    dispatcher.run(shutdown.clone()).await?;

    // The dispatcher only returns once shutdown fired; make sure the
    // gateway sees it too.
    shutdown.cancel();
    if let Some(handle) = gateway {
        handle
            .await
            .map_err(|e| QuillError::Internal(format!("gateway task panicked: {e}")))??;
    }

    storage.shutdown().await?;
    log_allocator_stats();
    info!("quill serve shutdown complete");
    Ok(())
}

#[cfg(not(target_env = "msvc"))]
fn log_allocator_stats() {
    if tikv_jemalloc_ctl::epoch::advance().is_err() {
        return;
    }
    let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
    let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
    tracing::debug!(
        allocated_mb = allocated / (1024 * 1024),
        resident_mb = resident / (1024 * 1024),
        "allocator stats"
    );
}

#[cfg(target_env = "msvc")]
fn log_allocator_stats() {}
