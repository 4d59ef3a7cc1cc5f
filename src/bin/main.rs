// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result, bail};
use brief_ledger_rs::server::{AppState, Collaborators, create_router};
use brief_ledger_rs::{
    BlobStore, Config, CreditPolicy, HttpBlobStore, InMemoryDocumentStore, InMemoryLedger,
    LocalBlobStore, OpenAiClient, PayPalGateway, PayPalSettings, PdfTextExtractor,
};
use clap::Parser;
use rust_decimal::Decimal;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Brief Ledger - paid PDF brief analysis backend
///
/// Serves the upload, checkout and analysis API. Every flag can also be set
/// through the environment variable named in its help.
#[derive(Parser, Debug)]
#[command(name = "brief-ledger")]
#[command(about = "Credit-gated PDF brief analysis service", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Externally reachable base URL of this service, used for the gateway
    /// return URL. Defaults to http://localhost:<port>.
    #[arg(long, env = "PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Frontend base URL; buyers land on <url>/success after paying
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:5173")]
    frontend_url: String,

    #[arg(long, env = "PAYPAL_CLIENT_ID", default_value = "")]
    paypal_client_id: String,

    #[arg(long, env = "PAYPAL_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    paypal_client_secret: String,

    #[arg(long, env = "PAYPAL_API_BASE", default_value = "https://api-m.sandbox.paypal.com")]
    paypal_api_base: String,

    #[arg(long, env = "PAYPAL_CURRENCY", default_value = "USD")]
    currency: String,

    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    openai_api_key: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    openai_base_url: String,

    /// Upper bound on the analysis reply length
    #[arg(long, env = "OPENAI_MAX_TOKENS", default_value_t = 2000)]
    max_tokens: u32,

    /// Directory uploads are written to when no blob service is configured
    #[arg(long, env = "BLOB_DIR", default_value = "uploads")]
    blob_dir: PathBuf,

    /// Remote blob service; takes precedence over --blob-dir
    #[arg(long, env = "BLOB_BASE_URL", requires = "blob_token")]
    blob_base_url: Option<String>,

    #[arg(long, env = "BLOB_TOKEN", hide_env_values = true)]
    blob_token: Option<String>,

    /// Price of the reference credit bundle
    #[arg(long, env = "CREDIT_PRICE", default_value = "15.00")]
    credit_price: Decimal,

    /// Credits in the reference bundle
    #[arg(long, env = "CREDIT_BUNDLE", default_value_t = 50)]
    credit_bundle: u64,

    /// Credits charged per analysis
    #[arg(long, env = "ANALYSIS_COST", default_value_t = 1)]
    analysis_cost: u64,

    /// Deadline in seconds for every outbound call
    #[arg(long, env = "OUTBOUND_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Maximum upload size in MiB
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 25)]
    max_upload_mb: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let frontend = args.frontend_url.trim_end_matches('/').to_string();
    let public_base = args
        .public_base_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", args.port))
        .trim_end_matches('/')
        .to_string();

    let config = Config {
        credit_policy: CreditPolicy::new(args.credit_price, args.credit_bundle),
        analysis_cost: args.analysis_cost,
        outbound_timeout: Duration::from_secs(args.timeout_secs),
        max_upload_bytes: upload_limit_bytes(args.max_upload_mb)?,
        success_url: format!("{frontend}/success"),
        ..Config::default()
    };
    config.validate().context("Invalid configuration")?;

    if args.paypal_client_id.is_empty() || args.paypal_client_secret.is_empty() {
        warn!("PayPal credentials are not set; checkout will fail");
    }
    if args.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set; analysis will fail");
    }

    let gateway = PayPalGateway::new(
        PayPalSettings {
            base_url: args.paypal_api_base.clone(),
            client_id: args.paypal_client_id.clone(),
            client_secret: args.paypal_client_secret.clone(),
            currency: args.currency.clone(),
            return_url: format!("{public_base}/api/capture-order"),
            cancel_url: format!("{frontend}/cancel"),
        },
        config.outbound_timeout,
    )
    .context("Failed to build payment gateway client")?;

    let analysis_client = OpenAiClient::new(
        &args.openai_base_url,
        &args.openai_api_key,
        &args.openai_model,
        args.max_tokens,
        config.outbound_timeout,
    )
    .context("Failed to build analysis client")?;

    let blobs = blob_store(&args, config.outbound_timeout)?;

    let state = AppState::new(
        config,
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemoryDocumentStore::new()),
        Collaborators {
            gateway: Arc::new(gateway),
            analysis_client: Arc::new(analysis_client),
            blobs,
            extractor: Arc::new(PdfTextExtractor::new()),
        },
    )
    .context("Failed to initialise application state")?;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

fn upload_limit_bytes(megabytes: usize) -> Result<usize> {
    match megabytes.checked_mul(1024 * 1024) {
        Some(bytes) => Ok(bytes),
        None => bail!("MAX_UPLOAD_MB={} is too large", megabytes),
    }
}

fn blob_store(args: &Args, timeout: Duration) -> Result<Arc<dyn BlobStore>> {
    match (&args.blob_base_url, &args.blob_token) {
        (Some(base_url), Some(token)) => {
            info!("Storing uploads at {}", base_url);
            let store = HttpBlobStore::new(base_url, token, timeout)
                .context("Failed to build blob store client")?;
            Ok(Arc::new(store))
        }
        (Some(_), None) => bail!("BLOB_BASE_URL requires BLOB_TOKEN"),
        _ => {
            std::fs::create_dir_all(&args.blob_dir).with_context(|| {
                format!("Failed to create upload directory '{}'", args.blob_dir.display())
            })?;
            info!("Storing uploads under {}", args.blob_dir.display());
            Ok(Arc::new(LocalBlobStore::new(&args.blob_dir)))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
