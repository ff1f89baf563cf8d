//! Point d'entrée CLI pour mapnotes

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use mapnotes::ViewportSize;
use mapnotes_cli::cli::{self, Commands, PermalinkAction};
use mapnotes_cli::config::{ApiConfig, Config};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Parcourir et annoter des couches tuilées depuis la ligne de commande
#[derive(Parser)]
#[command(name = "mapnotes")]
#[command(author, version)]
#[command(about = "Client en ligne de commande pour un serveur d'annotations cartographiques")]
#[command(long_about = "Consulter le catalogue de couches, manipuler les permaliens de vue et \
échanger les annotations d'une vue avec le serveur au format GeoJSON.\n\n\
L'URL du serveur vient de --api-url, sinon de MAPNOTES_API_URL, sinon du preset.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config preset name (default/responsive) or path to a JSON config
    #[arg(long, default_value = "default", global = true)]
    config: String,

    /// Annotation server URL (défaut : env MAPNOTES_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Secret sent with delete requests (défaut : env MAPNOTES_SECRET)
    #[arg(long, global = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    let config = Config::resolve(&cli.config)?;
    let mut api_config = ApiConfig::from_env(&config.api);
    api_config.apply_overrides(cli.api_url, cli.secret);
    let api = cli::connect(&api_config)?;
    info!(url = %api_config.base_url, config = %cli.config, "Using annotation server");

    match cli.command {
        Commands::Layers => cli::cmd_layers(&api).await?,
        Commands::Permalink { action } => match action {
            PermalinkAction::Encode {
                lon,
                lat,
                zoom,
                date,
                layer,
                projection,
            } => {
                let link = cli::encode_permalink(
                    lon,
                    lat,
                    zoom,
                    date.as_deref(),
                    layer.as_deref(),
                    projection.as_deref(),
                )?;
                println!("{}", link);
            }
            PermalinkAction::Decode { fragment, resolve } => {
                cli::cmd_permalink_decode(&api, &config, &fragment, resolve).await?
            }
        },
        Commands::Pull {
            permalink,
            output,
            width,
            height,
        } => {
            let default = config.viewport_size();
            let size = ViewportSize::new(
                width.unwrap_or(default.width),
                height.unwrap_or(default.height),
            );
            info!(output = %output.display(), "Pull annotations");
            cli::cmd_pull(&api, &config, &permalink, &output, size).await?;
        }
        Commands::Push {
            permalink,
            input,
            report,
        } => {
            info!(input = %input.display(), "Push annotations");
            cli::cmd_push(&api, &config, &permalink, &input, report.as_deref()).await?;
        }
        Commands::Delete { id } => cli::cmd_delete(&api, &id).await?,
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
