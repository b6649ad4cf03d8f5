mod bridge;
mod emit;
mod logging;

use std::fs;
use std::rc::Rc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tether_runtime::config::ConfigLoadError;
use tether_runtime::{
    FileStore, KeyValueStore, LoadOutcome, RenderBridge, Runtime, SettingsOutcome, TetherConfig,
};
use tracing::{info, warn};

use crate::bridge::LogBridge;
use crate::emit::SimulatedEvent;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Also write logs to the data directory
    #[arg(long)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a main script, replay simulated device events and exit
    Run {
        /// Main script URL (default: config, then the last one loaded)
        url: Option<String>,

        /// Event to deliver after loading, e.g. click:up, tap:x:1,
        /// accel:0,0,-1000, select:0:2
        #[arg(short, long = "emit", value_name = "EVENT")]
        emit: Vec<SimulatedEvent>,
    },
    /// Print the settings page URL for the configured or last loaded script
    Settings {
        /// Percent-encoded response to hand back, as the page would on close
        #[arg(long, value_name = "RESPONSE")]
        close: Option<String>,
    },
    /// Write an example config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

const EXAMPLE_CONFIG: &str = r#"# Tether configuration

[runtime]
# main_script_url = "http://example.com/app.js"
settings_url = "http://meiguro.com/simplyjs/settings.html"

[accel]
rate = 100
samples = 25

[storage]
# path = "/path/to/store.json"

[logging]
file = false
"#;

fn create_example_config(force: bool) -> anyhow::Result<()> {
    let config_path = TetherConfig::config_path();
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, EXAMPLE_CONFIG)?;
    eprintln!("Config file created at: {}", config_path.display());
    Ok(())
}

fn load_config() -> anyhow::Result<TetherConfig> {
    match TetherConfig::load() {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound) => Ok(TetherConfig::default()),
        Err(e) => Err(e).context("Failed to load config"),
    }
}

/// URL given on the command line, else the configured one. `None` lets the
/// runtime fall back to the last loaded script.
fn script_url(arg: Option<String>, config: &TetherConfig) -> Option<String> {
    arg.or_else(|| config.runtime.main_script_url.clone())
}

fn build_runtime(config: &TetherConfig) -> anyhow::Result<Runtime> {
    let store = FileStore::open(config.storage.path());
    info!("Using store {}", store.path().display());

    Ok(Runtime::builder()
        .with_bridge(Rc::new(LogBridge) as Rc<dyn RenderBridge>)
        .with_store(Rc::new(store) as Rc<dyn KeyValueStore>)
        .with_config(config)
        .build()?)
}

async fn run(
    runtime: &mut Runtime,
    url: Option<String>,
    events: Vec<SimulatedEvent>,
) -> anyhow::Result<()> {
    match runtime.load_main_script(url.as_deref()).await {
        LoadOutcome::Loaded { url } => info!("Loaded {}", url),
        LoadOutcome::NoScript => {
            bail!("No main script: pass a URL or set runtime.main_script_url in the config")
        }
        LoadOutcome::Failed { url, error } => {
            return Err(error).with_context(|| format!("Failed to load {}", url));
        }
    }
    runtime.settle().await;

    for event in events {
        let session = runtime.session();
        let outcome = event.apply(&session);
        info!("{} -> {:?}", event, outcome);
        runtime.settle().await;
    }
    Ok(())
}

async fn settings(
    runtime: &mut Runtime,
    url: Option<String>,
    close: Option<String>,
) -> anyhow::Result<()> {
    if let LoadOutcome::Failed { url, error } = runtime.load_main_script(url.as_deref()).await {
        warn!("Failed to load {}: {}", url, error);
    }

    println!("{}", runtime.open_settings());

    if let Some(response) = close {
        match runtime.close_settings(Some(&response)).await {
            SettingsOutcome::Handled => info!("Settings handled by script"),
            SettingsOutcome::Reload(url) => info!("Reloaded from {}", url),
            SettingsOutcome::Ignored => info!("Settings response ignored"),
        }
        runtime.settle().await;
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::InitConfig { force } = cli.command {
        return create_example_config(force);
    }

    let config = load_config()?;
    let _guard = logging::init_logging("tether", cli.log_file || config.logging.file)?;

    let mut runtime = build_runtime(&config)?;

    match cli.command {
        Command::Run { url, emit } => run(&mut runtime, script_url(url, &config), emit).await,
        Command::Settings { close } => settings(&mut runtime, script_url(None, &config), close).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_url_prefers_argument_then_config() {
        let mut config = TetherConfig::default();
        assert_eq!(script_url(None, &config), None);

        config.runtime.main_script_url = Some("http://example.com/app.js".to_string());
        assert_eq!(
            script_url(None, &config).as_deref(),
            Some("http://example.com/app.js")
        );
        assert_eq!(
            script_url(Some("file:///tmp/other.js".to_string()), &config).as_deref(),
            Some("file:///tmp/other.js")
        );
    }

    #[test]
    fn test_example_config_parses() {
        let config = TetherConfig::parse(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.accel.rate, 100);
        assert!(config.runtime.main_script_url.is_none());
    }
}
