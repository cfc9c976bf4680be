/*
 *  constants.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

/// Name of the per-user configuration folder.
pub const APP_DIR_NAME: &str = "spotiscreen";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const TOKEN_FILE_NAME: &str = "token.json";
pub const SIMULATED_FILE_NAME: &str = "simulated.png";

// Spotify endpoints
pub const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:3000/callback";
/// Only the playback state is read.
pub const OAUTH_SCOPE: &str = "user-read-playback-state";

/// Refresh this long before the token actually expires.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;
/// Token lifetimes above a day are treated as a day.
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

// Loop timing
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 5000;
pub const MIN_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 300;
/// Pause before re-opening a device that stopped answering.
pub const DEVICE_RETRY_SECS: u64 = 5;
/// Used when a 429 arrives without a Retry-After header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
/// Longest Retry-After honoured, larger values are cut down to this.
pub const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Album art cache entries (decoded, so keep it small).
pub const ARTWORK_CACHE_ENTRIES: u64 = 32;
/// A URL that failed to download is left alone this long.
pub const ARTWORK_RETRY_SECS: u64 = 60;

// Panel geometry, landscape
pub const DISPLAY_WIDTH: u32 = 480;
pub const DISPLAY_HEIGHT: u32 = 320;
pub const DEFAULT_BRIGHTNESS: u8 = 25;

// Now playing layout
/// Album art is drawn square at the origin.
pub const ART_SIZE: u32 = 255;
/// Left edge and width of the text column next to the art.
pub const TEXT_COLUMN_X: i32 = 265;
pub const TEXT_COLUMN_WIDTH: u32 = 215;
pub const ALBUM_Y: i32 = 2;
/// Gap between the album block and the artist block.
pub const ALBUM_ARTIST_GAP: i32 = 18;
/// Bottom edge of the title block.
pub const TITLE_BOTTOM_Y: i32 = 255;

pub const PROGRESS_BAR_Y: i32 = 270;
pub const PROGRESS_BAR_HEIGHT: u32 = 5;
/// Top of the elapsed | track n/total | duration line.
pub const TRACK_INFO_Y: i32 = 290;
pub const TRACK_INFO_MARGIN: i32 = 5;

pub const PAUSED_LABEL: &str = "PAUSED";
pub const IDLE_LABEL: &str = "Nothing playing";
