/*
 *  credential.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Persisted OAuth token set and the session that keeps it fresh
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

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::constants::{MAX_TOKEN_LIFETIME_SECS, TOKEN_EXPIRY_MARGIN_SECS};

/// Everything that can go wrong getting or keeping a usable token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No stored token; the browser flow has to run.
    #[error("not authenticated, run `spotiscreen auth`")]
    NotAuthenticated,
    /// The accounts service refused the grant or refresh token.
    #[error("authorization rejected: {0}")]
    Rejected(String),
    /// Accounts service unreachable; worth another try later.
    #[error("accounts service unreachable: {0}")]
    Network(#[from] reqwest::Error),
    #[error("authorization callback failed: {0}")]
    Callback(String),
    #[error("token file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("token file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// Only a network hiccup is retried by the loop; everything else needs the user.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

/// OAuth token set as stored on disk.
///
/// Field names follow the common token cache layout so an existing cache
/// written by other Spotify tools can be picked up as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    /// True when the token is expired, or will be within `margin_secs`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        self.expires_at - ChronoDuration::seconds(margin_secs) <= now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_within(now, TOKEN_EXPIRY_MARGIN_SECS)
    }

    /// Build a credential from a token endpoint answer.
    ///
    /// Refresh answers may omit the refresh token, the previous one stays valid then.
    pub fn from_response(resp: TokenResponse, previous_refresh: Option<&str>, now: DateTime<Utc>) -> Result<Self, AuthError> {
        let refresh_token = match (resp.refresh_token, previous_refresh) {
            (Some(r), _) if !r.is_empty() => r,
            (_, Some(prev)) => prev.to_string(),
            _ => return Err(AuthError::Rejected("token response carried no refresh token".into())),
        };
        Ok(Credential {
            access_token: resp.access_token,
            refresh_token,
            expires_at: now + ChronoDuration::seconds(resp.expires_in.min(MAX_TOKEN_LIFETIME_SECS) as i64),
            scope: resp.scope.unwrap_or_default(),
            token_type: resp.token_type.unwrap_or_else(default_token_type),
        })
    }
}

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Anything that can trade a refresh token for a new token set.
#[allow(async_fn_in_trait)]
pub trait TokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

/// Reads and atomically writes the token file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored credential, or `NotAuthenticated` when there is none worth using.
    pub fn load(&self) -> Result<Credential, AuthError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(AuthError::NotAuthenticated),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Credential>(&text) {
            Ok(c) if !c.refresh_token.is_empty() => Ok(c),
            Ok(_) => Err(AuthError::NotAuthenticated),
            Err(e) => {
                debug!("Ignoring unreadable token file {}: {}", self.path.display(), e);
                Err(AuthError::NotAuthenticated)
            }
        }
    }

    /// Write via a temp file in the same folder then rename over the target,
    /// a crash mid-write leaves the old token intact.
    pub fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(credential)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| AuthError::Io(e.error))?;

        debug!("Token saved to {}", self.path.display());
        Ok(())
    }
}

/// The one credential the process works with, kept valid on demand.
pub struct Session<E: TokenEndpoint> {
    store: TokenStore,
    endpoint: E,
    credential: Credential,
}

impl<E: TokenEndpoint> Session<E> {
    pub fn new(store: TokenStore, endpoint: E, credential: Credential) -> Self {
        Self { store, endpoint, credential }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Refresh and persist if the token is (nearly) expired.
    pub async fn ensure_valid(&mut self) -> Result<&Credential, AuthError> {
        self.ensure_valid_at(Utc::now()).await
    }

    pub async fn ensure_valid_at(&mut self, now: DateTime<Utc>) -> Result<&Credential, AuthError> {
        if self.credential.is_expired(now) {
            debug!("Access token expires at {}, refreshing", self.credential.expires_at);
            let resp = self.endpoint.refresh(&self.credential.refresh_token).await?;
            let fresh = Credential::from_response(resp, Some(&self.credential.refresh_token), now)?;
            self.store.save(&fresh)?;
            self.credential = fresh;
            info!("Access token refreshed, valid until {}", self.credential.expires_at);
        }
        Ok(&self.credential)
    }

    /// Adopt a credential obtained elsewhere, e.g. a fresh browser grant.
    pub fn replace_credential(&mut self, credential: Credential) {
        self.credential = credential;
    }

    /// Force a refresh on next use, e.g. after the API answered 401.
    pub fn invalidate(&mut self) {
        self.credential.expires_at = DateTime::UNIX_EPOCH;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Counts refreshes; hands out numbered tokens.
    pub struct FakeEndpoint {
        pub calls: Cell<u32>,
        pub reject: bool,
        pub rotate_refresh: bool,
    }

    impl FakeEndpoint {
        pub fn new() -> Self {
            Self { calls: Cell::new(0), reject: false, rotate_refresh: false }
        }
    }

    impl TokenEndpoint for FakeEndpoint {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
            self.calls.set(self.calls.get() + 1);
            if self.reject {
                return Err(AuthError::Rejected("invalid_grant".into()));
            }
            Ok(TokenResponse {
                access_token: format!("access-{}", self.calls.get()),
                token_type: Some("Bearer".into()),
                scope: Some("user-read-playback-state".into()),
                expires_in: 3600,
                refresh_token: self.rotate_refresh.then(|| format!("{}-next", refresh_token)),
            })
        }
    }

    pub fn credential(expires_at: DateTime<Utc>) -> Credential {
        Credential {
            access_token: "access-0".into(),
            refresh_token: "refresh-0".into(),
            expires_at,
            scope: "user-read-playback-state".into(),
            token_type: "Bearer".into(),
        }
    }

    #[test]
    fn test_load_missing_is_not_authenticated() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        assert!(matches!(store.load(), Err(AuthError::NotAuthenticated)));
    }

    #[test]
    fn test_load_garbage_is_not_authenticated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(TokenStore::new(&path).load(), Err(AuthError::NotAuthenticated)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("token.json"));
        let now = Utc::now();
        let cred = credential(DateTime::from_timestamp(now.timestamp(), 0).unwrap());
        store.save(&cred).unwrap();
        assert_eq!(store.load().unwrap(), cred);

        // only the token file is left behind, no temp files
        let entries: Vec<_> = fs::read_dir(store.path().parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_reads_foreign_cache_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, r#"{"access_token": "a", "token_type": "Bearer", "expires_in": 3600,
            "scope": "user-read-playback-state", "expires_at": 1700000000, "refresh_token": "r"}"#).unwrap();
        let cred = TokenStore::new(&path).load().unwrap();
        assert_eq!(cred.refresh_token, "r");
        assert_eq!(cred.expires_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_expiry_margin() {
        let now = Utc::now();
        assert!(credential(now - ChronoDuration::seconds(1)).is_expired(now));
        assert!(credential(now + ChronoDuration::seconds(30)).is_expired(now));
        assert!(!credential(now + ChronoDuration::seconds(600)).is_expired(now));
    }

    #[test]
    fn test_response_keeps_previous_refresh_token() {
        let now = Utc::now();
        let resp = TokenResponse {
            access_token: "a".into(),
            token_type: None,
            scope: None,
            expires_in: 60,
            refresh_token: None,
        };
        let cred = Credential::from_response(resp.clone(), Some("old"), now).unwrap();
        assert_eq!(cred.refresh_token, "old");
        assert_eq!(cred.token_type, "Bearer");
        assert_eq!(cred.expires_at, now + ChronoDuration::seconds(60));
        assert!(Credential::from_response(resp, None, now).is_err());
    }

    #[test]
    fn test_absurd_lifetime_is_capped() {
        let now = Utc::now();
        for expires_in in [100_000_000_000_000_000, u64::MAX] {
            let resp = TokenResponse {
                access_token: "a".into(),
                token_type: None,
                scope: None,
                expires_in,
                refresh_token: Some("r".into()),
            };
            let cred = Credential::from_response(resp, None, now).unwrap();
            assert_eq!(cred.expires_at, now + ChronoDuration::days(1));
            assert!(!cred.is_expired(now));
        }
    }

    #[tokio::test]
    async fn test_ensure_valid_refreshes_once() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        let now = Utc::now();
        let mut session = Session::new(store.clone(), FakeEndpoint::new(), credential(now + ChronoDuration::seconds(10)));

        let first = session.ensure_valid_at(now).await.unwrap().clone();
        assert_eq!(first.access_token, "access-1");
        assert_eq!(session.endpoint().calls.get(), 1);
        assert_eq!(store.load().unwrap(), first);

        // reused, no second refresh
        let second = session.ensure_valid_at(now + ChronoDuration::seconds(5)).await.unwrap().clone();
        assert_eq!(second, first);
        assert_eq!(session.endpoint().calls.get(), 1);
    }

    #[tokio::test]
    async fn test_ensure_valid_leaves_fresh_token_alone() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        let now = Utc::now();
        let mut session = Session::new(store.clone(), FakeEndpoint::new(), credential(now + ChronoDuration::hours(1)));
        assert_eq!(session.ensure_valid_at(now).await.unwrap().access_token, "access-0");
        assert_eq!(session.endpoint().calls.get(), 0);
        // nothing written either
        assert!(matches!(store.load(), Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_persisted() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        let now = Utc::now();
        let mut endpoint = FakeEndpoint::new();
        endpoint.rotate_refresh = true;
        let mut session = Session::new(store.clone(), endpoint, credential(now));
        session.ensure_valid_at(now).await.unwrap();
        assert_eq!(store.load().unwrap().refresh_token, "refresh-0-next");
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_fatal() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut endpoint = FakeEndpoint::new();
        endpoint.reject = true;
        let mut session = Session::new(TokenStore::new(dir.path().join("t.json")), endpoint, credential(now));
        let err = session.ensure_valid_at(now).await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut session = Session::new(
            TokenStore::new(dir.path().join("t.json")),
            FakeEndpoint::new(),
            credential(now + ChronoDuration::hours(1)),
        );
        session.invalidate();
        session.ensure_valid_at(now).await.unwrap();
        assert_eq!(session.endpoint().calls.get(), 1);
    }
}
