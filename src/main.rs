/*
 *  main.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Entry point: config, authorization, then the display loop
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::io;

#[cfg(unix)] // Only compile this block on Unix-like systems
use tokio::signal::unix::{signal, SignalKind}; // Import specific Unix signals

use spotiscreen::app::{App, LoopSettings};
use spotiscreen::artwork::ArtworkCache;
use spotiscreen::config::{self, Cli, Command};
use spotiscreen::constants::TOKEN_FILE_NAME;
use spotiscreen::credential::{AuthError, Session, TokenStore};
use spotiscreen::display::{DisplayDriverFactory, Screen};
use spotiscreen::oauth::OAuthClient;
use spotiscreen::poller::Poller;
use spotiscreen::spotify::SpotifyClient;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
#[cfg(unix)]
async fn signal_handler() -> io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal_handler().await {
        error!("Cannot listen for signals: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_dir = config::app_config_dir()?;
    let (mut cfg, cfg_path) = config::load_with_dir(&cli, &app_dir)
        .context("loading configuration")?;

    if cli.dump_config {
        print!("{}", serde_yaml::to_string(&cfg)?);
        return Ok(());
    }

    let level = if cli.debug { "debug" } else { cfg.log_level.as_deref().unwrap_or("info") };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} - now playing, on the desk", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    if config::prompt_client_id(&mut cfg, io::stdin().lock(), io::stdout())? {
        let mut on_disk = config::load_file(&cfg_path)?;
        on_disk.client_id = cfg.client_id.clone();
        on_disk.save(&cfg_path)
            .with_context(|| format!("saving {}", cfg_path.display()))?;
        info!("Client ID saved to {}", cfg_path.display());
    }
    let client_id = cfg.client_id().context("no Spotify client ID configured")?;

    let oauth = OAuthClient::new(client_id, cfg.redirect_uri(), cfg.request_timeout())?;
    let store = TokenStore::new(app_dir.join(TOKEN_FILE_NAME));

    if cli.command == Some(Command::Auth) {
        oauth.authorize_interactive(&store, cfg.auth_timeout()).await?;
        return Ok(());
    }

    let credential = match store.load() {
        Ok(c) => c,
        Err(AuthError::NotAuthenticated) => {
            info!("No stored token, starting browser authorization");
            oauth.authorize_interactive(&store, cfg.auth_timeout()).await?
        }
        Err(e) => return Err(e).context("reading the stored token"),
    };
    let mut session = Session::new(store.clone(), oauth, credential);

    // make sure the account works before touching the panel
    match session.ensure_valid().await.map(|_| ()) {
        Ok(()) => {}
        Err(AuthError::Rejected(reason)) => {
            warn!("Stored token rejected ({}), authorizing again", reason);
            let fresh = session.endpoint().authorize_interactive(&store, cfg.auth_timeout()).await?;
            session.replace_credential(fresh);
        }
        Err(e) if e.is_recoverable() => warn!("Token check failed, will retry: {}", e),
        Err(e) => return Err(e.into()),
    }

    let api = SpotifyClient::new(cfg.request_timeout())?;
    let artwork = ArtworkCache::new(cfg.request_timeout())?;

    let display = cfg.display();
    let driver = DisplayDriverFactory::create_from_config(&display, &app_dir)?;
    let screen = Screen::new(driver, display.brightness());

    let app = App::new(Poller::new(session, api, artwork), screen, LoopSettings::from_config(&cfg));
    if let Err(e) = app.run(shutdown_signal()).await {
        error!("{}", e);
        if e.is_fatal() {
            error!("Run `{} auth` to authorize again", env!("CARGO_PKG_NAME"));
        }
        return Err(e.into());
    }
    Ok(())
}
