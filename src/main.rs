use std::sync::Arc;

use clap::Parser;
use egressd::{
    cli::{Args, SettingsLoader},
    error::EgressError,
    nftables::{NftCommand, NftManager},
    server::{PolicyServer, SharedPolicyStore, serve},
};
use tokio::{
    net::TcpListener,
    signal::unix::{SignalKind, signal},
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), EgressError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = SettingsLoader::load(&args)?;

    log::info!(
        "Starting egressd (mode {}, listen {}, auth {}, {} DoH blocklist entries)",
        settings.mode,
        settings.http_addr,
        if settings.token.is_some() { "token" } else { "none" },
        settings.doh_blocklist.len()
    );

    let shutdown = CancellationToken::new();
    let store = Arc::new(SharedPolicyStore::new());
    let mut server = PolicyServer::new(store, settings.mode)
        .with_token(settings.token.clone())
        .with_shutdown(shutdown.clone());

    if settings.mode.uses_nft() {
        if !nix::unistd::geteuid().is_root() {
            log::warn!("Not running as root; nft will likely refuse to apply the ruleset");
        }
        let manager = NftManager::new(NftCommand::new())
            .with_doh_blocklist(settings.doh_blocklist.clone())
            .with_timeout(settings.apply_timeout);
        server = server.with_enforcer(Arc::new(manager));
    } else if !settings.doh_blocklist.is_empty() {
        log::warn!("DoH blocklist is only enforced in dns+nft mode");
    }

    let server = Arc::new(server);
    server.bootstrap(settings.initial_policy.clone()).await?;

    let listener = TcpListener::bind(settings.http_addr).await?;
    log::info!("Policy server listening on http://{}", settings.http_addr);

    tokio::spawn(cancel_on_signal(shutdown.clone()));
    serve(listener, server, shutdown).await?;

    log::info!("Policy server stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn cancel_on_signal(shutdown: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            log::warn!("Failed to install SIGTERM handler: {err}");
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT, shutting down"),
        _ = terminate.recv() => log::info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
