/*
 *  config.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Layered configuration: defaults, YAML file, command line
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

use clap::{ArgAction, Parser, Subcommand, ValueHint};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::time::Duration;
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;
use url::Url;

use crate::constants::*;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. Every field is optional so files and
/// command line flags can be layered; accessors supply the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Spotify application client id (PKCE, no secret needed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Must match one of the redirect URIs registered for the app
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_off_when_idle: Option<bool>,
    /// panel selection & behavior
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DisplayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverKind>,
    /// Serial device, or "AUTO" to scan USB ports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,     // 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Where the simulated driver writes its PNG
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Turing,
    Simulated,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "spotiscreen", version, about = "Spotify now playing on a USB smart screen")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
    /// Path to a YAML config file (overrides search)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub client_id: Option<String>,
    #[arg(long, global = true)]
    pub redirect_uri: Option<String>,
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    /// Serial port of the panel
    #[arg(long, global = true)]
    pub port: Option<String>,
    #[arg(long, global = true)]
    pub brightness: Option<u8>,
    #[arg(long, global = true)]
    pub poll_ms: Option<u64>,
    /// Render to a PNG instead of the USB panel
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub simulated: bool,
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub debug: bool,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Poll and display what is playing (default)
    Run,
    /// Run the browser authorization again and exit
    Auth,
}

impl Config {
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_deref().unwrap_or(DEFAULT_REDIRECT_URI)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms.unwrap_or(DEFAULT_IDLE_INTERVAL_MS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs.unwrap_or(DEFAULT_AUTH_TIMEOUT_SECS))
    }

    pub fn screen_off_when_idle(&self) -> bool {
        self.screen_off_when_idle.unwrap_or(true)
    }

    pub fn display(&self) -> DisplayConfig {
        self.display.clone().unwrap_or_default()
    }

    /// Persist the config, creating the folder on first use.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

impl DisplayConfig {
    pub fn driver(&self) -> DriverKind {
        self.driver.unwrap_or(DriverKind::Turing)
    }

    pub fn port(&self) -> &str {
        self.port.as_deref().unwrap_or("AUTO")
    }

    pub fn brightness(&self) -> u8 {
        self.brightness.unwrap_or(DEFAULT_BRIGHTNESS)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width.unwrap_or(DISPLAY_WIDTH), self.height.unwrap_or(DISPLAY_HEIGHT))
    }
}

/// The per-user folder holding config and token, e.g. ~/.config/spotiscreen
pub fn app_config_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs_next::config_dir()
        .or_else(|| dirs_next::home_dir().map(|h| h.join(".config")))
        .ok_or_else(|| ConfigError::Validation("cannot locate a configuration directory".into()))?;
    let dir = base.join(APP_DIR_NAME);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Read YAML from `app_dir` (or `--config`), merge CLI, validate.
///
/// Returns the effective config and the file it should be saved back to.
pub fn load_with_dir(cli: &Cli, app_dir: &Path) -> Result<(Config, PathBuf), ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    let path = if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            merge(&mut cfg, read_yaml(p)?);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
        p.clone()
    } else if let Some(p) = find_config_file(app_dir) {
        merge(&mut cfg, read_yaml(&p)?);
        p
    } else {
        app_dir.join(CONFIG_FILE_NAME)
    };

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;

    Ok((cfg, path))
}

/// Just what is in the file at `path`; a missing file is an empty config.
///
/// Used when saving back, so command line overrides don't end up on disk.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    read_yaml(path)
}

/// Try common locations in order (first hit wins).
fn find_config_file(app_dir: &Path) -> Option<PathBuf> {
    let p = app_dir.join(CONFIG_FILE_NAME);
    if p.exists() { return Some(p) }
    // project local
    let p = PathBuf::from(format!("{}.yaml", APP_DIR_NAME));
    if p.exists() { return Some(p) }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    // an empty file is a valid, empty config
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.client_id.is_some()            { dst.client_id = src.client_id; }
    if src.redirect_uri.is_some()         { dst.redirect_uri = src.redirect_uri; }
    if src.log_level.is_some()            { dst.log_level = src.log_level; }
    if src.poll_interval_ms.is_some()     { dst.poll_interval_ms = src.poll_interval_ms; }
    if src.idle_interval_ms.is_some()     { dst.idle_interval_ms = src.idle_interval_ms; }
    if src.request_timeout_ms.is_some()   { dst.request_timeout_ms = src.request_timeout_ms; }
    if src.auth_timeout_secs.is_some()    { dst.auth_timeout_secs = src.auth_timeout_secs; }
    if src.screen_off_when_idle.is_some() { dst.screen_off_when_idle = src.screen_off_when_idle; }
    match (&mut dst.display, src.display) {
        (None, Some(c)) => dst.display = Some(c),
        (Some(d), Some(s)) => merge_display(d, s),
        _ => {}
    }
}

fn merge_display(dst: &mut DisplayConfig, src: DisplayConfig) {
    if src.driver.is_some()      { dst.driver = src.driver; }
    if src.port.is_some()        { dst.port = src.port; }
    if src.brightness.is_some()  { dst.brightness = src.brightness; }
    if src.width.is_some()       { dst.width = src.width; }
    if src.height.is_some()      { dst.height = src.height; }
    if src.output.is_some()      { dst.output = src.output; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.client_id.is_some()    { cfg.client_id = cli.client_id.clone(); }
    if cli.redirect_uri.is_some() { cfg.redirect_uri = cli.redirect_uri.clone(); }
    if cli.log_level.is_some()    { cfg.log_level = cli.log_level.clone(); }
    if cli.poll_ms.is_some()      { cfg.poll_interval_ms = cli.poll_ms; }

    let any_display = cli.port.is_some() || cli.brightness.is_some() || cli.simulated;
    if any_display && cfg.display.is_none() {
        cfg.display = Some(DisplayConfig::default());
    }
    if let Some(display) = cfg.display.as_mut() {
        if cli.port.is_some()       { display.port = cli.port.clone(); }
        if cli.brightness.is_some() { display.brightness = cli.brightness; }
        if cli.simulated            { display.driver = Some(DriverKind::Simulated); }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(ms) = cfg.poll_interval_ms {
        if ms < MIN_POLL_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "poll_interval_ms must be >= {}", MIN_POLL_INTERVAL_MS
            )));
        }
    }
    if let Some(ms) = cfg.idle_interval_ms {
        if ms < MIN_POLL_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "idle_interval_ms must be >= {}", MIN_POLL_INTERVAL_MS
            )));
        }
    }
    if cfg.request_timeout_ms == Some(0) {
        return Err(ConfigError::Validation("request_timeout_ms must be > 0".into()));
    }

    let uri = Url::parse(cfg.redirect_uri())
        .map_err(|e| ConfigError::Validation(format!("redirect_uri is not a URL: {}", e)))?;
    if uri.scheme() != "http" {
        return Err(ConfigError::Validation("redirect_uri must use http on a loopback address".into()));
    }
    match uri.host_str() {
        Some("127.0.0.1") | Some("localhost") | Some("[::1]") => {}
        _ => return Err(ConfigError::Validation("redirect_uri must point at this machine (127.0.0.1)".into())),
    }

    if let Some(display) = cfg.display.as_ref() {
        if let (Some(w), Some(h)) = (display.width, display.height) {
            if w == 0 || h == 0 {
                return Err(ConfigError::Validation("display width/height must be > 0".into()));
            }
        }
        if let Some(b) = display.brightness {
            if b > 100 {
                return Err(ConfigError::Validation("display brightness must be 0..=100".into()));
            }
        }
    }
    Ok(())
}

/// Ask for the client id when none is configured.
///
/// Returns true when the config was changed and should be saved.
pub fn prompt_client_id<R: BufRead, W: Write>(
    cfg: &mut Config,
    mut input: R,
    mut output: W,
) -> Result<bool, ConfigError> {
    if cfg.client_id().is_some() {
        return Ok(false);
    }
    write!(output, "Please enter your Spotify app's client ID: ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let id = line.trim();
    if id.is_empty() {
        return Err(ConfigError::Validation("a Spotify client ID is required".into()));
    }
    cfg.client_id = Some(id.to_string());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["spotiscreen"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let (cfg, path) = load_with_dir(&cli(&[]), dir.path()).unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
        assert_eq!(cfg.redirect_uri(), DEFAULT_REDIRECT_URI);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(1000));
        assert_eq!(cfg.idle_interval(), Duration::from_millis(5000));
        assert!(cfg.screen_off_when_idle());
        assert_eq!(cfg.display().driver(), DriverKind::Turing);
        assert_eq!(cfg.display().port(), "AUTO");
        assert_eq!(cfg.display().brightness(), 25);
        assert_eq!(cfg.display().size(), (480, 320));
    }

    #[test]
    fn test_yaml_then_cli_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "client_id: abc\npoll_interval_ms: 2000\ndisplay:\n  port: /dev/ttyACM0\n  brightness: 40\n",
        ).unwrap();

        let (cfg, _) = load_with_dir(&cli(&["--brightness", "10", "--poll-ms", "500"]), dir.path()).unwrap();
        assert_eq!(cfg.client_id(), Some("abc"));
        assert_eq!(cfg.poll_interval_ms, Some(500));
        let display = cfg.display();
        assert_eq!(display.port(), "/dev/ttyACM0");
        assert_eq!(display.brightness(), 10);
    }

    #[test]
    fn test_simulated_flag_creates_display_section() {
        let dir = TempDir::new().unwrap();
        let (cfg, _) = load_with_dir(&cli(&["--simulated"]), dir.path()).unwrap();
        assert_eq!(cfg.display().driver(), DriverKind::Simulated);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.yaml");
        let res = load_with_dir(&cli(&["--config", missing.to_str().unwrap()]), dir.path());
        assert!(matches!(res, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation() {
        let dir = TempDir::new().unwrap();
        assert!(load_with_dir(&cli(&["--poll-ms", "10"]), dir.path()).is_err());
        assert!(load_with_dir(&cli(&["--brightness", "101"]), dir.path()).is_err());
        assert!(load_with_dir(&cli(&["--redirect-uri", "https://example.com/cb"]), dir.path()).is_err());
        assert!(load_with_dir(&cli(&["--redirect-uri", "not a url"]), dir.path()).is_err());
        assert!(load_with_dir(&cli(&["--redirect-uri", "http://localhost:8888/"]), dir.path()).is_ok());
    }

    #[test]
    fn test_save_round_trip_skips_unset_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join(CONFIG_FILE_NAME);
        let cfg = Config { client_id: Some("xyz".into()), ..Default::default() };
        cfg.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("client_id: xyz"));
        assert!(!text.contains("redirect_uri"));
        assert_eq!(read_yaml(&path).unwrap(), cfg);
    }

    #[test]
    fn test_prompt_client_id() {
        let mut cfg = Config::default();
        let mut out = Vec::new();
        let changed = prompt_client_id(&mut cfg, "  my-id \n".as_bytes(), &mut out).unwrap();
        assert!(changed);
        assert_eq!(cfg.client_id(), Some("my-id"));
        assert!(String::from_utf8(out).unwrap().contains("client ID"));

        // already set, nothing asked
        let changed = prompt_client_id(&mut cfg, "".as_bytes(), Vec::new()).unwrap();
        assert!(!changed);

        let mut empty = Config::default();
        assert!(prompt_client_id(&mut empty, "\n".as_bytes(), Vec::new()).is_err());
    }

    #[test]
    fn test_subcommand_parsing() {
        assert_eq!(cli(&[]).command, None);
        assert_eq!(cli(&["auth"]).command, Some(Command::Auth));
        assert!(cli(&["run", "--debug"]).debug);
    }
}
