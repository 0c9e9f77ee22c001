use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use nestcheck_lib::cli::{App, Services};
use nestcheck_lib::gemini::{resolve_api_key, GeminiClient};
use nestcheck_lib::{logging, settings};

/// UK property area reports in the terminal
#[derive(Debug, Parser)]
#[command(name = "nestcheck", version, about)]
struct Args {
    /// Settings file (default: <config dir>/nestcheck/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `nestcheck_lib::live=trace`
    #[arg(long)]
    log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Gemini API key (falls back to GEMINI_API_KEY, then API_KEY)
    #[arg(long, hide_env_values = true)]
    api_key: Option<String>,

    /// Identity service web API key
    #[arg(long, env = "FIREBASE_API_KEY", hide_env_values = true)]
    firebase_api_key: Option<String>,

    /// Open the search form without signing in (development only)
    #[arg(long)]
    skip_auth: bool,

    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (for development convenience)
    // Silently ignore if not found - production uses system env vars
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(args.log_level.as_deref(), args.log_file.as_deref());

    // tokio-tungstenite and reqwest both sit on rustls; pick the provider once
    let _ = rustls::crypto::ring::default_provider().install_default();

    let settings_path = match args.config.clone() {
        Some(path) => path,
        None => settings::default_settings_path()?,
    };
    let app_settings = settings::load_from(&settings_path);
    log::info!("Settings loaded from {:?}", settings_path);

    if args.write_config {
        settings::save_to(&settings_path, &app_settings)?;
        println!("Wrote {}", settings_path.display());
        return Ok(());
    }

    let api_key = args
        .api_key
        .clone()
        .or_else(resolve_api_key)
        .context("No Gemini API key. Set GEMINI_API_KEY or pass --api-key.")?;
    let client = GeminiClient::new(app_settings.api_base_url.clone(), api_key)?;

    let firebase_api_key = args
        .firebase_api_key
        .clone()
        .or_else(|| app_settings.resolve_firebase_api_key());
    if firebase_api_key.is_none() && !args.skip_auth {
        log::warn!("FIREBASE_API_KEY not set; sign-in is unavailable");
    }

    let services = Services::new(&app_settings, client, firebase_api_key);
    App::new(services, args.skip_auth).run().await;
    Ok(())
}
