use std::convert::TryFrom;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::configuration::KubeSettings;
use crate::errors::ConnectionError;

/// Create a new Kubernetes client with the given settings
///
/// The cluster configuration comes from, in order: the explicit kubeconfig
/// file, the default kubeconfig when a context is named, or the usual
/// inference (in-cluster service account, then `$KUBECONFIG`).
pub async fn create_client(settings: &KubeSettings) -> Result<Client, ConnectionError> {
    let options = KubeConfigOptions {
        context: settings.context.clone(),
        ..Default::default()
    };

    let mut config = match (&settings.kubeconfig, &settings.context) {
        (Some(path), _) => {
            tracing::debug!("Loading kubeconfig from {}", path.display());
            let kubeconfig = Kubeconfig::read_from(path)?;
            Config::from_custom_kubeconfig(kubeconfig, &options).await?
        }
        (None, Some(context)) => {
            tracing::debug!("Using kubeconfig context {}", context);
            Config::from_kubeconfig(&options).await?
        }
        (None, None) => Config::infer().await?,
    };

    if settings.accept_invalid_certs {
        tracing::warn!("TLS certificate verification is disabled");
        config.accept_invalid_certs = true;
    }

    let timeout = Duration::from_secs(settings.timeout_secs);
    config.connect_timeout = Some(timeout);
    config.read_timeout = Some(timeout);
    config.write_timeout = Some(timeout);

    let client = Client::try_from(config)?;

    test_connection(&client).await?;

    Ok(client)
}

/// Test the connection to the Kubernetes API
async fn test_connection(client: &Client) -> Result<(), ConnectionError> {
    let version = client.apiserver_version().await?;

    tracing::debug!(
        "Connected to Kubernetes API: version={}, platform={}",
        version.git_version,
        version.platform
    );

    Ok(())
}
