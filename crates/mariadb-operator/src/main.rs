use futures::StreamExt;
use kube::Client;
use mariadb_operator::{
    config::OperatorConfig,
    mariadb_controller::{self as ctl, Ctx},
    store::KubeStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = OperatorConfig::from_env()?;
    info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        "mariadb-operator starting up"
    );

    let client = Client::try_default().await?;
    let ctx = Arc::new(Ctx {
        store: KubeStore::new(client.clone()),
        config: config.clone(),
    });
    let controller = ctl::controller(client, &config)
        .run(
            ctl::reconcile::<KubeStore>,
            ctl::error_policy::<KubeStore>,
            ctx,
        )
        .for_each(|res| async move {
            if let Err(e) = res {
                tracing::warn!(error = ?e, "mariadb reconcile error");
            }
        });

    tokio::select! {
        _ = controller => {},
        _ = tokio::signal::ctrl_c() => { info!("shutdown signal received"); }
    }
    Ok(())
}
