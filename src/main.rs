#![deny(clippy::unwrap_used)]

use std::process::ExitCode;
use std::sync::Arc;

use dotenv::dotenv;
use fossology_bridge::fossology::credentials::CredentialStore;
use fossology_bridge::fossology::hostkey::{MemoryFingerprintRepository, RepositoryHostKeyVerifier};
use fossology_bridge::fossology::{
    BridgeConfig, CommandExecutor, SessionPool, SshConfig, TransportKind, client::RusshConnector,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let reachable = match (config.transport, config.ssh, config.rest) {
        (TransportKind::Ssh, Some(ssh), _) => check_ssh(ssh).await,
        #[cfg(feature = "rest")]
        (TransportKind::Rest, _, Some(rest)) => {
            info!("Checking FOSSology REST API at {}", rest.base_url);
            fossology_bridge::fossology::rest::RestClient::new(rest)
                .check_connection()
                .await
        }
        (transport, _, _) => {
            error!("Transport {} is not available in this build", transport);
            false
        }
    };

    if reachable {
        info!("Scanning host is reachable");
        ExitCode::SUCCESS
    } else {
        error!("Scanning host is not reachable");
        ExitCode::FAILURE
    }
}

/// Open a session and run `true` on the scanning host.
async fn check_ssh(ssh: SshConfig) -> bool {
    info!("Checking SSH access to {}@{}", ssh.user, ssh.address());

    let repository =
        MemoryFingerprintRepository::with_trusted(&ssh.host, ssh.trusted_fingerprints.clone());
    let verifier = Arc::new(RepositoryHostKeyVerifier::new(repository));
    let connector = Arc::new(RusshConnector::new(ssh.address(), ssh.user.clone(), verifier));

    let credentials = Arc::new(CredentialStore::new(
        ssh.key_path.clone(),
        ssh.key_passphrase.clone(),
    ));
    if let Err(e) = credentials.preload().await {
        error!("{}", e);
        return false;
    }

    let pool = Arc::new(SessionPool::new(connector, credentials, ssh.pool_size));
    let executor = CommandExecutor::new(pool.clone(), ssh.connect_timeout);

    let result = executor
        .run("true", None, None, ssh.execution_timeout)
        .await;
    pool.shutdown().await;

    match result {
        Ok(0) => true,
        Ok(code) => {
            error!("Remote check command exited with {}", code);
            false
        }
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}
