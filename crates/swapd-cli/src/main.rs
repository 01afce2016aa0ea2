//! The `swapd` binary.
//!
//! `swapd run` starts the deploy agent on this host with secrets taken from
//! the process environment. `swapd sign` is the publisher-side companion:
//! it signs a request body with the shared secret so a CI job (or a curl
//! invocation) can produce a valid `X-Signature` header.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use swapd_core::store::{EnvStore, Store, KEY_HMAC_SECRET, KEY_METHOD};
use swapd_core::webhook::{sign, SignatureValidator};
use swapd_core::Config;
use swapd_daemon::{DaemonState, DeliverySet, WebhookDelivery};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swapd", version, about = "Continuous-deployment hot-swap agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the deploy agent.
    Run {
        /// Path to the agent configuration file.
        #[arg(long, default_value = "deploy.yaml")]
        config: PathBuf,
    },

    /// Sign a request body with the shared HMAC secret.
    ///
    /// Reads the body from --file or stdin and prints the value for the
    /// X-Signature header.
    Sign {
        /// File holding the request body; stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Secret to sign with; DEPLOY_HMAC_SECRET from the environment
        /// when omitted.
        #[arg(long)]
        secret: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run { config } => run(&config).await,
        Command::Sign { file, secret } => sign_body(file.as_deref(), secret),
    }
}

async fn run(config_path: &std::path::Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let store: Arc<dyn Store> = Arc::new(EnvStore);

    let secret = store
        .get(KEY_HMAC_SECRET)
        .context("reading HMAC secret from store")?
        .context("HMAC secret not configured (set DEPLOY_HMAC_SECRET)")?;
    let validator = SignatureValidator::new(secret);

    let method = match store.get(KEY_METHOD)? {
        Some(method) => method.expose_secret().to_string(),
        None => "webhook".to_string(),
    };

    let state = Arc::new(DaemonState::new(
        config,
        Some(config_path.to_path_buf()),
        validator,
        store,
    ));

    let deliveries = DeliverySet::new(vec![Arc::new(WebhookDelivery)]);
    let delivery = deliveries
        .get(&method)
        .with_context(|| format!("available delivery methods: {:?}", deliveries.available()))?;

    tracing::info!(method = delivery.name(), "starting deploy agent");
    delivery.run(state).await?;
    Ok(())
}

fn sign_body(file: Option<&std::path::Path>, secret: Option<String>) -> Result<()> {
    let secret = match secret {
        Some(secret) => SecretString::from(secret),
        None => match EnvStore.get(KEY_HMAC_SECRET)? {
            Some(secret) => secret,
            None => bail!("no secret: pass --secret or set DEPLOY_HMAC_SECRET"),
        },
    };

    let body = match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut body = Vec::new();
            std::io::stdin()
                .read_to_end(&mut body)
                .context("reading body from stdin")?;
            body
        }
    };

    println!("{}", sign(&secret, &body));
    Ok(())
}
