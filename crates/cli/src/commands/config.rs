use clap::Subcommand;
use std::path::Path;
use walletgate_core::{config::AppConfig, hooks::builtin::BUILTIN_HOOKS};

use super::utils::{load_config, print_info, print_success, CliError, CliResult};

pub const SAMPLE_CONFIG: &str = r#"# walletgate configuration

[server]
bind_address = "127.0.0.1"
bind_port = 5279
max_concurrent_requests = 500
max_body_bytes = 2097152
request_timeout_seconds = 30

# SDK daemons behind the proxy. Reload with SIGHUP.
[[backends.servers]]
name = "sdk-1"
url = "http://127.0.0.1:5280"

[[backends.servers]]
name = "sdk-2"
url = "http://127.0.0.1:5281"

[cache]
enabled = true
default_ttl_seconds = 5
max_entries = 10000
purge_interval_seconds = 30

[cache.rules."status"]
ttl_seconds = 5

[cache.rules."resolve"]
ttl_seconds = 30

[cache.rules."claim_search"]
ttl_seconds = 30

[cache.rules."wallet_balance"]
ttl_seconds = 3
scope = "per_user"

[auth]
token_header = "X-Lbry-Auth-Token"
# remote_resolver_url = "https://auth.example.com/user/me"
resolver_cache_ttl_seconds = 60

[auth.static_tokens]
"change-me" = 1

[auth.policies]
"publish" = "requires_wallet"

[hooks]
enabled = ["remote_ip_log", "wallet_send_audit", "call_log"]

[metrics]
enabled = true

[logging]
level = "info"
format = "pretty"
"#;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Show the effective configuration
    Show {
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Show sensitive values (static tokens, resolver URL)
        #[arg(long)]
        show_sensitive: bool,
    },

    /// Generate a sample configuration file
    Generate {
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file, show_sensitive } => show_config(&file, show_sensitive),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn validate_config(file: &str) -> CliResult<()> {
    print_info(&format!("Loading configuration from {file}..."));
    let config = load_config(file)?;
    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Server: {}:{}", config.server.bind_address, config.server.bind_port);
    println!("  Backends: {}", config.backends.servers.len());
    println!("  Cache: {} ({} rules)", enabled(config.cache.enabled), config.cache.rules.len());
    println!(
        "  Auth: {}",
        if config.auth.remote_resolver_url.is_some() { "remote resolver" } else { "static tokens" }
    );
    println!("  Hooks: {}", config.hooks.enabled.join(", "));
    println!("  Metrics: {}", enabled(config.metrics.enabled));

    Ok(())
}

fn show_config(file: &str, show_sensitive: bool) -> CliResult<()> {
    let config = load_config(file)?;
    print!("{}", render_config(&config, show_sensitive));
    Ok(())
}

fn render_config(config: &AppConfig, show_sensitive: bool) -> String {
    use std::fmt::Write;

    let hidden = "[hidden - use --show-sensitive to reveal]";
    let mut out = String::new();

    let _ = writeln!(out, "[Server]");
    let _ = writeln!(out, "  Bind: {}:{}", config.server.bind_address, config.server.bind_port);
    let _ = writeln!(out, "  Max Concurrent Requests: {}", config.server.max_concurrent_requests);
    let _ = writeln!(out, "  Max Body: {} bytes", config.server.max_body_bytes);
    let _ = writeln!(out, "  Request Timeout: {}s", config.server.request_timeout_seconds);

    let _ = writeln!(out, "\n[Backends] ({})", config.backends.servers.len());
    for backend in &config.backends.servers {
        let _ = writeln!(out, "  {}: {}", backend.name, backend.url);
    }

    let _ = writeln!(out, "\n[Cache]");
    let _ = writeln!(out, "  Enabled: {}", config.cache.enabled);
    let _ = writeln!(out, "  Default TTL: {}s", config.cache.default_ttl_seconds);
    let _ = writeln!(out, "  Max Entries: {}", config.cache.max_entries);
    let mut rules: Vec<_> = config.cache.rules.iter().collect();
    rules.sort_by_key(|(matcher, _)| matcher.to_string());
    for (matcher, rule) in rules {
        let ttl = rule.ttl_seconds.unwrap_or(config.cache.default_ttl_seconds);
        let _ = writeln!(out, "  {matcher}: {ttl}s ({:?})", rule.scope);
    }

    let _ = writeln!(out, "\n[Auth]");
    let _ = writeln!(out, "  Token Header: {}", config.auth.token_header);
    match (&config.auth.remote_resolver_url, show_sensitive) {
        (Some(url), true) => {
            let _ = writeln!(out, "  Remote Resolver: {url}");
        }
        (Some(_), false) => {
            let _ = writeln!(out, "  Remote Resolver: {hidden}");
        }
        (None, _) => {}
    }
    if show_sensitive {
        let mut tokens: Vec<_> = config.auth.static_tokens.iter().collect();
        tokens.sort();
        for (token, user) in tokens {
            let _ = writeln!(out, "  Token {token} -> user {user}");
        }
    } else {
        let _ = writeln!(out, "  Static Tokens: {} {hidden}", config.auth.static_tokens.len());
    }
    let mut policies: Vec<_> = config.auth.policies.iter().collect();
    policies.sort_by_key(|(matcher, _)| matcher.to_string());
    for (matcher, policy) in policies {
        let _ = writeln!(out, "  Policy {matcher}: {policy:?}");
    }

    let _ = writeln!(out, "\n[Hooks]");
    for hook in &config.hooks.enabled {
        let _ = writeln!(out, "  {hook}");
    }

    let _ = writeln!(out, "\n[Metrics]");
    let _ = writeln!(out, "  Enabled: {}", config.metrics.enabled);

    let _ = writeln!(out, "\n[Logging]");
    let _ = writeln!(out, "  Level: {}", config.logging.level);
    let _ = writeln!(out, "  Format: {}", config.logging.format);

    out
}

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, SAMPLE_CONFIG)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Remember to:");
    print_info("  1. Point [[backends.servers]] at your SDK daemons");
    print_info("  2. Replace the sample static token or configure remote_resolver_url");
    print_info(&format!("  3. Pick hooks from: {}", BUILTIN_HOOKS.join(", ")));

    Ok(())
}
