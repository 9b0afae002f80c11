use clap::{Parser, Subcommand};
use mock_docker_registry::{logging, RegistryConfig, RegistryServer};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Mock Docker Registry (V2 API) serving pre-seeded data")]
struct Cli {
    /// Config file path.
    #[arg(short = 'f', long = "file", value_name = "CONFIG-PATH", global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the registry until interrupted (the default).
    Serve,
    /// Print the merged config, or the value at a dotted KEY.
    Config { key: Option<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match RegistryConfig::load(cli.file.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("mock-docker-registry: error: {err}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Config { key } => print_config(&config, key.as_deref()),
        Command::Serve => serve(config).await,
    }
}

async fn serve(config: RegistryConfig) -> ExitCode {
    logging::init(&config.logging);
    info!("Serving data from {}", config.data_dir.display());

    let server = match RegistryServer::new(config).await {
        Ok(server) => server,
        Err(err) => {
            error!("Failed to start registry: {}", err);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        _ = server.wait() => ExitCode::FAILURE,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            ExitCode::SUCCESS
        }
    }
}

fn print_config(config: &RegistryConfig, key: Option<&str>) -> ExitCode {
    let value = match serde_json::to_value(config) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("mock-docker-registry: error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let value = match key {
        Some(key) => match dotted_lookup(&value, key) {
            Some(value) => value,
            None => {
                eprintln!("mock-docker-registry: error: no property {key} found");
                return ExitCode::FAILURE;
            }
        },
        None => &value,
    };

    match value {
        Value::String(s) => println!("{s}"),
        other => match serde_json::to_string_pretty(other) {
            Ok(s) => println!("{s}"),
            Err(err) => {
                eprintln!("mock-docker-registry: error: {err}");
                return ExitCode::FAILURE;
            }
        },
    }
    ExitCode::SUCCESS
}

fn dotted_lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(value, |node, part| node.get(part))
}
