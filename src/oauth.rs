/*
 *  oauth.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Authorization code + PKCE against the Spotify accounts service
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

use axum::{extract::Query, response::Html, routing::get, Router};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::future::IntoFuture;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use crate::constants::{ACCOUNTS_BASE_URL, OAUTH_SCOPE};
use crate::deutils::is_loopback_url;
use crate::credential::{AuthError, Credential, TokenEndpoint, TokenResponse, TokenStore};

const VERIFIER_LEN: usize = 64;
const STATE_LEN: usize = 16;
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

const CALLBACK_OK: &str = "<html><body><h3>SpotiScreen is authorized.</h3><p>You can close this tab.</p></body></html>";
const CALLBACK_FAILED: &str = "<html><body><h3>Authorization failed.</h3><p>Check the terminal for details.</p></body></html>";

fn random_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| UNRESERVED[rng.random_range(0..UNRESERVED.len())] as char)
        .collect()
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        Self::from_verifier(random_string(VERIFIER_LEN))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}

/// Query parameters the accounts service appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// The authorization code, once the state has been checked.
    pub fn into_code(self, expected_state: &str) -> Result<String, AuthError> {
        if let Some(err) = self.error {
            return Err(AuthError::Rejected(err));
        }
        if self.state.as_deref() != Some(expected_state) {
            return Err(AuthError::Callback("state mismatch, ignoring callback".into()));
        }
        self.code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::Callback("callback carried no code".into()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Accounts service client for a public (secret-less) app.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client_id: String,
    redirect_uri: Url,
    authorize_endpoint: Url,
    token_endpoint: String,
    client: Client,
}

impl OAuthClient {
    pub fn new(client_id: &str, redirect_uri: &str, timeout: Duration) -> Result<Self, AuthError> {
        Self::with_base_url(client_id, redirect_uri, ACCOUNTS_BASE_URL, timeout)
    }

    pub fn with_base_url(client_id: &str, redirect_uri: &str, base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let redirect_uri = Url::parse(redirect_uri)
            .map_err(|e| AuthError::Callback(format!("bad redirect URI: {}", e)))?;
        let base_url = base_url.trim_end_matches('/');
        let authorize_endpoint = Url::parse(&format!("{}/authorize", base_url))
            .map_err(|e| AuthError::Callback(format!("bad accounts URL: {}", e)))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(VERSION));
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let mut builder = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .default_headers(headers);
        if is_loopback_url(base_url) {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;

        Ok(Self {
            client_id: client_id.to_string(),
            redirect_uri,
            authorize_endpoint,
            token_endpoint: format!("{}/api/token", base_url),
            client,
        })
    }

    /// Where the user has to go to grant access.
    pub fn authorize_url(&self, pkce: &Pkce, state: &str) -> Url {
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("scope", OAUTH_SCOPE)
            .append_pair("state", state);
        url
    }

    pub async fn exchange_code(&self, code: &str, pkce: &Pkce) -> Result<TokenResponse, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
        ];
        self.post_token(&form).await
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self.client.post(&self.token_endpoint).form(form).send().await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let text = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TokenErrorBody>(&text) {
                Ok(body) => match body.error_description {
                    Some(d) => format!("{}: {}", body.error, d),
                    None => body.error,
                },
                Err(_) => format!("HTTP {}", status.as_u16()),
            };
            return Err(AuthError::Rejected(reason));
        }
        let response = response.error_for_status()?;
        Ok(response.json::<TokenResponse>().await?)
    }

    /// Run the browser round trip and persist the resulting credential.
    ///
    /// Prints the authorize URL, then serves the redirect URI on loopback
    /// until the accounts service calls back or `timeout` runs out.
    pub async fn authorize_interactive(&self, store: &TokenStore, timeout: Duration) -> Result<Credential, AuthError> {
        let pkce = Pkce::generate();
        let state = random_string(STATE_LEN);
        let url = self.authorize_url(&pkce, &state);

        info!("Waiting for authorization on {}", self.redirect_uri);
        println!("Open this URL in a browser to authorize SpotiScreen:\n\n  {}\n", url);

        let params = self.wait_for_callback(timeout).await?;
        let code = params.into_code(&state)?;
        debug!("Authorization code received, exchanging");

        let resp = self.exchange_code(&code, &pkce).await?;
        let credential = Credential::from_response(resp, None, Utc::now())?;
        store.save(&credential)?;
        info!("Authorized, token stored in {}", store.path().display());
        Ok(credential)
    }

    async fn wait_for_callback(&self, timeout: Duration) -> Result<CallbackParams, AuthError> {
        let host = match self.redirect_uri.host_str() {
            // browsers resolve localhost to IPv4 first
            Some("127.0.0.1" | "localhost") => "127.0.0.1".to_string(),
            Some("[::1]") => "::1".to_string(),
            other => {
                return Err(AuthError::Callback(format!(
                    "redirect URI host {:?} is not a loopback address", other
                )));
            }
        };
        let port = self.redirect_uri.port_or_known_default().unwrap_or(80);
        let path = match self.redirect_uri.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
        let (tx, mut rx) = mpsc::channel::<CallbackParams>(1);

        let app = Router::new().route(
            &path,
            get(move |Query(params): Query<CallbackParams>| {
                let tx = tx.clone();
                async move {
                    let ok = params.error.is_none() && params.code.is_some();
                    if tx.send(params).await.is_err() {
                        warn!("Callback arrived after the listener gave up");
                    }
                    Html(if ok { CALLBACK_OK } else { CALLBACK_FAILED })
                }
            }),
        );

        // dropping the server future stops it once the callback is in
        tokio::select! {
            res = axum::serve(listener, app).into_future() => {
                Err(AuthError::Callback(match res {
                    Ok(()) => "callback listener stopped".to_string(),
                    Err(e) => format!("callback listener failed: {}", e),
                }))
            }
            params = rx.recv() => {
                params.ok_or_else(|| AuthError::Callback("callback channel closed".into()))
            }
            _ = tokio::time::sleep(timeout) => {
                Err(AuthError::Callback(format!("no authorization within {}s", timeout.as_secs())))
            }
        }
    }
}

impl TokenEndpoint for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        self.post_token(&form).await
    }
}
