use clap::Subcommand;
use futures::{stream, StreamExt};
use serde_json::json;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use walletgate_core::{
    backend::{Backend, HttpClient},
    types::JsonRpcRequest,
};

use super::utils::{load_config, print_error, print_info, print_success, CliError, CliResult};

#[derive(Subcommand)]
pub enum BackendCommands {
    /// List configured backends
    List {
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Send a `status` call to every configured backend
    Check {
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Per-backend timeout in seconds
        #[arg(long, default_value = "5")]
        timeout: u64,

        /// Number of backends probed at once
        #[arg(long, default_value = "8")]
        concurrency: usize,
    },
}

/// Result of probing a single backend.
#[derive(Debug)]
pub struct ProbeResult {
    pub name: String,
    pub url: String,
    pub latency: Duration,
    pub outcome: Result<(), String>,
}

pub async fn handle_backend_command(command: BackendCommands) -> CliResult<()> {
    match command {
        BackendCommands::List { file } => {
            let config = load_config(&file)?;
            print_info(&format!("{} backend(s) in {file}", config.backends.servers.len()));
            for backend in &config.backends.servers {
                println!("  {:<20} {}", backend.name, backend.url);
            }
            Ok(())
        }
        BackendCommands::Check { file, timeout, concurrency } => {
            let config = load_config(&file)?;
            let results = probe_backends(
                config.backends.servers,
                Duration::from_secs(timeout.max(1)),
                concurrency,
            )
            .await?;
            report(&results)
        }
    }
}

/// Probes every backend with a `status` call, `concurrency` at a time.
///
/// Results come back in configuration order.
pub async fn probe_backends(
    backends: Vec<Backend>,
    timeout: Duration,
    concurrency: usize,
) -> CliResult<Vec<ProbeResult>> {
    let client = Arc::new(HttpClient::new()?);
    let request = Arc::new(JsonRpcRequest::new("status", Some(json!({})), json!(1)));

    let mut results: Vec<(usize, ProbeResult)> = stream::iter(backends.into_iter().enumerate())
        .map(|(index, backend)| {
            let client = Arc::clone(&client);
            let request = Arc::clone(&request);
            async move {
                let started = Instant::now();
                let outcome = match client.call(&backend.url, &request, timeout).await {
                    Ok(response) => match response.error {
                        Some(error) => Err(format!("RPC error {}: {}", error.code, error.message)),
                        None => Ok(()),
                    },
                    Err(e) => Err(e.to_string()),
                };
                let result = ProbeResult {
                    name: backend.name,
                    url: backend.url,
                    latency: started.elapsed(),
                    outcome,
                };
                (index, result)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, result)| result).collect())
}

fn report(results: &[ProbeResult]) -> CliResult<()> {
    let mut failed = 0;
    for result in results {
        match &result.outcome {
            Ok(()) => print_success(&format!(
                "{} ({}) answered in {}ms",
                result.name,
                result.url,
                result.latency.as_millis()
            )),
            Err(e) => {
                failed += 1;
                print_error(&format!("{} ({}): {e}", result.name, result.url));
            }
        }
    }

    if failed > 0 {
        return Err(CliError::Network(format!("{failed} of {} backend(s) unhealthy", results.len())));
    }
    print_info(&format!("All {} backend(s) healthy", results.len()));
    Ok(())
}
