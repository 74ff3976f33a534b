use clap::{Parser, Subcommand};

mod commands;
use commands::{
    handle_backend_command, handle_config_command, utils::print_error, BackendCommands,
    ConfigCommands,
};

#[derive(Parser)]
#[command(name = "walletgate-cli")]
#[command(about = "Walletgate CLI - configuration and backend tooling for the wallet proxy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// SDK daemon backends
    #[command(subcommand)]
    Backends(BackendCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config(command) => handle_config_command(command),
        Commands::Backends(command) => handle_backend_command(command).await,
    };

    if let Err(e) = result {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}
