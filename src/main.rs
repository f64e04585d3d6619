use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use parlance::cli::{Cli, Commands, ModelsAction};
use parlance::config::Config;
use parlance::models::catalog::list_models;
use parlance::models::download::{format_model_info, list_installed_models, models_dir};
use parlance::{AudioAsset, ErrorBody, ParlanceError, build_orchestrator};
use std::path::Path;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    parlance::logging::init(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Transcribe {
            file,
            mime,
            timeout,
            backends,
            report,
            pretty,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if !backends.is_empty() {
                config.pipeline.backends = backends;
            }
            if let Some(timeout) = timeout {
                apply_timeout(&mut config, timeout);
            }

            let code = run_transcribe(&config, &file, mime.as_deref(), report, pretty).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Models { action } => {
            handle_models_command(action).await?;
        }
        Commands::Config => {
            let config = load_config(cli.config.as_deref())?;
            print!("{}", config.redacted().to_toml()?);
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/parlance/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides apply on top of all three.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        if !path.is_file() {
            return Err(ParlanceError::ConfigFileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// Use the same timeout for every backend. Sub-second values round up.
fn apply_timeout(config: &mut Config, timeout: Duration) {
    let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
    config.remote.timeout_secs = secs;
    config.subprocess.timeout_secs = secs;
    config.in_process.timeout_secs = secs;
}

/// Run the fallback chain and print the result. Returns the process exit code.
async fn run_transcribe(
    config: &Config,
    file: &Path,
    mime: Option<&str>,
    report: bool,
    pretty: bool,
) -> Result<i32> {
    let outcome = async {
        let orchestrator = build_orchestrator(config)?;
        let asset = AudioAsset::from_path(file, mime, config.audio.max_upload_bytes)?;
        orchestrator.transcribe(asset).await
    }
    .await;

    match outcome {
        Ok(result) => {
            let json = if report {
                to_json(&result, pretty)?
            } else {
                to_json(&result.transcript, pretty)?
            };
            println!("{json}");
            Ok(0)
        }
        Err(e) => {
            print_error(&e);
            println!("{}", to_json(&ErrorBody::from(&e), pretty)?);
            Ok(1)
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn print_error(err: &ParlanceError) {
    eprintln!("{} {}", "Error:".red().bold(), err);
    for attempt in err.attempts() {
        eprintln!("  {} {}", "-".dimmed(), attempt);
    }
}

/// Handle model management commands.
async fn handle_models_command(action: ModelsAction) -> Result<()> {
    match action {
        ModelsAction::List => {
            println!("Available models:");
            for model in list_models() {
                println!("  {}", format_model_info(model));
            }
            let installed = list_installed_models();
            if !installed.is_empty() {
                println!();
                println!("Installed in {}: {}", models_dir().display(), installed.join(", "));
            }
        }
        ModelsAction::Install { name } => {
            install_model(&name).await?;
        }
    }
    Ok(())
}

#[cfg(feature = "model-download")]
async fn install_model(name: &str) -> Result<()> {
    let path = parlance::models::download::download_model(name, true).await?;
    println!("Model '{}' installed successfully", name);
    println!("Location: {}", path.display());
    Ok(())
}

#[cfg(not(feature = "model-download"))]
async fn install_model(name: &str) -> Result<()> {
    anyhow::bail!(
        "cannot install '{name}': this binary was built without the model-download feature"
    )
}
