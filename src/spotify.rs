/*
 *  spotify.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Spotify Web API client, playback state endpoint only
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

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{API_BASE_URL, DEFAULT_RETRY_AFTER_SECS, MAX_RETRY_AFTER_SECS};
use crate::deutils::{deserialize_null_default, is_loopback_url};

/// Failures talking to the Web API. All of them are worth another tick.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network issues, timeouts, invalid URL.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    /// Body arrived but didn't parse.
    #[error("JSON deserialization error: {0}")]
    Decode(#[from] serde_json::Error),
    /// Access token no longer accepted.
    #[error("access token rejected (401)")]
    Unauthorized,
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("unexpected HTTP status {0}")]
    Status(u16),
}

/// `GET /me/player` body, reduced to what the screen shows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentPlayback {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub item: Option<PlayableItem>,
}

/// A track, or an episode when `show` is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayableItem {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
    #[serde(default)]
    pub show: Option<ShowRef>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistRef {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumRef {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    #[serde(default)]
    pub total_tracks: u32,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowRef {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub publisher: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// The playback endpoint as the poller sees it.
#[allow(async_fn_in_trait)]
pub trait NowPlayingApi {
    /// `Ok(None)` when there is no active playback session at all.
    async fn current_playback(&self, access_token: &str) -> Result<Option<CurrentPlayback>, FetchError>;
}

/// Web API client with populated headers and timeouts.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    base_url: String,
    client: Client,
}

impl SpotifyClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_base_url(API_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

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
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn retry_after(headers: &header::HeaderMap) -> Duration {
    let secs = headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS))
}

impl NowPlayingApi for SpotifyClient {
    async fn current_playback(&self, access_token: &str) -> Result<Option<CurrentPlayback>, FetchError> {
        let url = format!("{}/me/player", self.base_url);
        let response = self.client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("additional_types", "track,episode")])
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => return Ok(None),
            StatusCode::UNAUTHORIZED => return Err(FetchError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(FetchError::RateLimited { retry_after: retry_after(response.headers()) });
            }
            s if !s.is_success() => return Err(FetchError::Status(s.as_u16())),
            _ => {}
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str::<CurrentPlayback>(&text)?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::{header as h, HeaderMap, StatusCode as Code};
    use axum::response::{IntoResponse, Response};
    use axum::{routing::get, Router};

    pub(crate) const TRACK: &str = r#"{
        "device": {"id": "d", "name": "Desk", "volume_percent": 40},
        "shuffle_state": false,
        "repeat_state": "off",
        "timestamp": 1700000000000,
        "progress_ms": 61000,
        "is_playing": true,
        "currently_playing_type": "track",
        "item": {
            "name": "Song A",
            "duration_ms": 200000,
            "track_number": 3,
            "artists": [{"name": "Artist X"}, {"name": "Artist Y"}],
            "album": {
                "name": "Album Z",
                "total_tracks": 12,
                "images": [
                    {"url": "https://i.scdn.co/640", "width": 640, "height": 640},
                    {"url": "https://i.scdn.co/300", "width": 300, "height": 300},
                    {"url": "https://i.scdn.co/64", "width": 64, "height": 64}
                ]
            }
        }
    }"#;

    #[test]
    fn test_parse_track() {
        let pb: CurrentPlayback = serde_json::from_str(TRACK).unwrap();
        assert!(pb.is_playing);
        assert_eq!(pb.progress_ms, Some(61_000));
        let item = pb.item.unwrap();
        assert_eq!(item.name, "Song A");
        assert_eq!(item.artists.len(), 2);
        let album = item.album.unwrap();
        assert_eq!(album.total_tracks, 12);
        assert_eq!(album.images[1].width, Some(300));
    }

    #[test]
    fn test_parse_nulls_and_missing() {
        let pb: CurrentPlayback = serde_json::from_str(
            r#"{"is_playing": false, "progress_ms": null, "item": {"name": null, "artists": null, "album": {"name": "L", "images": null}}}"#,
        ).unwrap();
        let item = pb.item.unwrap();
        assert_eq!(item.name, "");
        assert!(item.artists.is_empty());
        assert!(item.album.unwrap().images.is_empty());

        let pb: CurrentPlayback = serde_json::from_str(r#"{"is_playing": true, "item": null}"#).unwrap();
        assert!(pb.item.is_none());
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = header::HeaderMap::new();
        assert_eq!(retry_after(&headers), Duration::from_secs(DEFAULT_RETRY_AFTER_SECS));
        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Duration::from_secs(12));
        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("18446744073709551615"));
        assert_eq!(retry_after(&headers), Duration::from_secs(MAX_RETRY_AFTER_SECS));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_an_error() {
        let client = SpotifyClient::with_base_url("http://127.0.0.1:9/v1", Duration::from_millis(200)).unwrap();
        assert!(client.current_playback("token").await.is_err());
    }

    /// Local stand-in for `/me/player`, the bearer token picks the answer.
    async fn player(headers: HeaderMap) -> Response {
        let auth = headers.get(h::AUTHORIZATION).and_then(|v| v.to_str().ok()).unwrap_or("");
        match auth.trim_start_matches("Bearer ") {
            "idle" => Code::NO_CONTENT.into_response(),
            "expired" => Code::UNAUTHORIZED.into_response(),
            "busy" => (Code::TOO_MANY_REQUESTS, [(h::RETRY_AFTER, "7")]).into_response(),
            "busy-forever" => (Code::TOO_MANY_REQUESTS, [(h::RETRY_AFTER, "18446744073709551615")]).into_response(),
            "broken" => Code::BAD_GATEWAY.into_response(),
            "empty" => Code::OK.into_response(),
            "garbage" => (Code::OK, "{not json").into_response(),
            _ => (Code::OK, TRACK).into_response(),
        }
    }

    async fn local_api() -> SpotifyClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/v1/me/player", get(player));
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        SpotifyClient::with_base_url(&format!("http://{}/v1", addr), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_playing_body() {
        let api = local_api().await;
        let pb = api.current_playback("playing").await.unwrap().unwrap();
        assert!(pb.is_playing);
        assert_eq!(pb.item.unwrap().name, "Song A");
    }

    #[tokio::test]
    async fn test_nothing_playing_is_none() {
        let api = local_api().await;
        assert!(api.current_playback("idle").await.unwrap().is_none());
        assert!(api.current_playback("empty").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let api = local_api().await;
        assert!(matches!(api.current_playback("expired").await, Err(FetchError::Unauthorized)));
        assert!(matches!(api.current_playback("broken").await, Err(FetchError::Status(502))));
        assert!(matches!(api.current_playback("garbage").await, Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let api = local_api().await;
        match api.current_playback("busy").await {
            Err(FetchError::RateLimited { retry_after }) => assert_eq!(retry_after, Duration::from_secs(7)),
            other => panic!("expected rate limit, got {:?}", other),
        }
        match api.current_playback("busy-forever").await {
            Err(FetchError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(MAX_RETRY_AFTER_SECS))
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }
}
