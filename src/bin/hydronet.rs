use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hydronet::io::loader::load_model;
use hydronet::misc::configuration::Configuration;

#[derive(Parser)]
#[command(name = "hydronet")]
#[command(about = "Simulate water movement through a network of basins and hydraulic structures")]
#[command(version = env!("HYDRONET_VERSION"))]
struct Cli {
    /// Path to the TOML configuration file
    toml_path: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(&cli.toml_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(toml_path: &str) -> Result<(), String> {
    let configuration = Configuration::from_file(toml_path).map_err(|e| e.to_string())?;
    let config_dir = Path::new(toml_path).parent().unwrap_or(Path::new("."));

    let mut model = load_model(configuration, config_dir).map_err(|e| e.to_string())?;
    let result = model.run();

    // Flush whatever was produced, also on a failed run
    let write_result = model.write_outputs();
    result.map_err(|e| e.to_string())?;
    write_result.map_err(|e| e.to_string())?;
    Ok(())
}
