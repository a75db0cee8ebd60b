use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use reqwest::blocking::Client;
use std::{fs, path::PathBuf, time::Duration};

use crate::{
    app::{Services, build_http_client},
    config::{Config, Secrets},
    domain::{secret::Secret, track::TrackDescriptor},
    http::server::HttpServer,
    spotify::{
        auth::authorize_url,
        playlist::{PlaylistClient, playlist_id_from_url},
    },
};

#[derive(Parser)]
#[command(name = "playlist-dl")]
#[command(version)]
#[command(about = "Download playlist tracks as audio and bundle them into an archive")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run http server with the download endpoints
    Serve,
    /// Download tracks listed in a JSON file into a local ZIP archive
    Download {
        /// JSON array of {"name", "artist"} objects
        #[arg(short, long)]
        tracks: PathBuf,
        /// Where to write the archive
        #[arg(short, long, default_value = "playlist.zip")]
        output: PathBuf,
    },
    /// Print the tracks of a playlist as JSON
    Playlist {
        /// Playlist share URL, URI or bare id
        url: String,
        /// OAuth access token
        #[arg(short, long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Print the login URL that starts the OAuth flow
    AuthorizeUrl,
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)?;
    let secrets = Secrets::from_env();

    match cli.command {
        Commands::Serve => {
            let services = Services::from_config(&cfg, &secrets)?;
            info!("Audio source: {}", services.fetcher.source_name());
            let http_server = HttpServer::new(services, cfg.http.clone());

            info!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::Download { tracks, output } => {
            let raw = fs::read_to_string(&tracks)
                .with_context(|| format!("Failed to read track list {}", tracks.display()))?;
            let descriptors: Vec<TrackDescriptor> = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid track list in {}", tracks.display()))?;

            let services = Services::from_config(&cfg, &secrets)?;
            let archive = services.archiver().assemble(&descriptors)?;

            fs::write(&output, &archive.bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "Archive with {} tracks written to {}",
                archive.entries,
                output.display()
            );
        }

        Commands::Playlist { url, token } => {
            let playlist_id = playlist_id_from_url(&url)?;
            let client: Client =
                build_http_client(Duration::from_secs(cfg.http.client_timeout_secs))?;
            let tracks = PlaylistClient::new(client, cfg.spotify.api_base_url.clone())
                .fetch_tracks(&Secret::new(token), &playlist_id)?;

            info!("Playlist {playlist_id} has {} tracks", tracks.len());
            println!("{}", serde_json::to_string_pretty(&tracks)?);
        }

        Commands::AuthorizeUrl => {
            let credentials = secrets.oauth_credentials()?;
            let url = authorize_url(
                &cfg.spotify.authorize_url,
                &credentials.client_id,
                &credentials.redirect_uri,
                &cfg.spotify.scopes,
            )?;
            println!("{url}");
        }
    }

    Ok(())
}
