//! `nabd serve`: run the device server until Ctrl-C.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nabd_config::{BunnyEntry, Config};
use nabd_core::proto::Throttle;
use nabd_core::{Burrow, ChoreographyLibrary, MicroServer, PluginRegistry, StateStore};

use crate::cli::{GlobalOpts, ServeArgs};
use crate::error::CliError;

pub async fn handle(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut config = nabd_config::load_config(global.config.as_deref())?;
    apply_overrides(&mut config, &args);
    let mut server_config = config.to_server_config()?;
    if args.no_throttle {
        server_config.throttle = Throttle::none();
    }

    let registry = PluginRegistry::builtin();
    let burrow = Arc::new(Burrow::with_default_ping_interval(
        server_config.default_ping_interval,
    ));
    let library = Arc::new(ChoreographyLibrary::new());
    let store = StateStore::new(server_config.state_root.clone());

    if !args.no_persist {
        store.load(&burrow, &library, &registry).await?;
    }
    provision(&burrow, &config.bunnies, &registry).await?;

    let server = MicroServer::new(server_config, Arc::clone(&burrow), Arc::clone(&library));
    let listen = server.config().listen;
    let listener = server.bind().await.map_err(|source| CliError::Bind {
        addr: listen.to_string(),
        source,
    })?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C, stop the process to exit");
            return;
        }
        info!("interrupt received");
        shutdown.cancel();
    });

    server.serve(listener, cancel).await?;

    if !args.no_persist {
        store.save(&burrow, &library).await?;
    }
    Ok(())
}

// ── Private helpers ─────────────────────────────────────────────────

fn apply_overrides(config: &mut Config, args: &ServeArgs) {
    if let Some(listen) = &args.listen {
        config.server.listen.clone_from(listen);
    }
    if let Some(advertise) = &args.advertise {
        config.server.advertise = Some(advertise.clone());
    }
    if let Some(resources) = &args.resources {
        config.paths.resources.clone_from(resources);
    }
    if let Some(state) = &args.state {
        config.paths.state.clone_from(state);
    }
}

/// Create configured devices and attach their plugins. Devices restored from
/// state keep their plugins; configured parameters are applied on top.
async fn provision(
    burrow: &Burrow,
    entries: &[BunnyEntry],
    registry: &PluginRegistry,
) -> Result<(), CliError> {
    for entry in entries {
        let bunny = burrow.get_or_add(&entry.serial);
        if let Some(name) = &entry.name {
            bunny.set_name(name.clone()).await;
        }
        if let Some(secs) = entry.ping_interval {
            bunny.set_ping_interval(secs).await;
        }

        for plugin in &entry.plugins {
            if !bunny.has_plugin(&plugin.name).await {
                bunny.attach(registry.create(&plugin.name)?).await;
            }
            for (key, value) in &plugin.parameters {
                bunny
                    .set_plugin_parameter(&plugin.name, key, value.clone())
                    .await?;
            }
        }
        info!(serial = %bunny.serial(), plugins = entry.plugins.len(), "bunny provisioned");
    }
    Ok(())
}
