/*
 *  nowplaying.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Playback state as the screen sees it
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
use std::sync::Arc;

use crate::artwork::Artwork;
use crate::constants::ART_SIZE;
use crate::deutils::ms_to_min_secs;
use crate::spotify::{CurrentPlayback, ImageRef};

/// Normalized snapshot of what is playing, everything the screen needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackState {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
    pub artwork: Option<Arc<Artwork>>,
    pub is_playing: bool,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub track_number: u32,
    pub total_tracks: u32,
}

/// Smallest image that still fills the art box, else the biggest there is.
pub fn pick_image(images: &[ImageRef], min_size: u32) -> Option<&ImageRef> {
    let width = |i: &ImageRef| i.width.unwrap_or(0);
    images
        .iter()
        .filter(|i| width(i) >= min_size)
        .min_by_key(|i| width(i))
        .or_else(|| images.iter().max_by_key(|i| width(i)))
}

impl PlaybackState {
    /// `None` when the player has nothing loaded (ads, between sessions).
    pub fn from_playback(pb: CurrentPlayback) -> Option<Self> {
        let item = pb.item?;

        let (artist, album, total_tracks, images) = match (item.album, item.show) {
            (Some(album), _) => {
                let artist = item.artists
                    .iter()
                    .map(|a| a.name.as_str())
                    .filter(|n| !n.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                (artist, album.name, album.total_tracks, album.images)
            }
            // podcast episode
            (None, Some(show)) => {
                let artist = if show.publisher.is_empty() { show.name.clone() } else { show.publisher };
                (artist, show.name, 0, item.images)
            }
            (None, None) => (String::new(), String::new(), 0, item.images),
        };

        let artwork_url = pick_image(&images, ART_SIZE).map(|i| i.url.clone());
        let duration_ms = item.duration_ms;
        let progress_ms = pb.progress_ms.unwrap_or(0);
        let progress_ms = if duration_ms > 0 { progress_ms.min(duration_ms) } else { progress_ms };

        Some(PlaybackState {
            title: item.name,
            artist,
            album,
            artwork_url,
            artwork: None,
            is_playing: pb.is_playing,
            progress_ms,
            duration_ms,
            track_number: item.track_number,
            total_tracks,
        })
    }

    pub fn with_artwork(mut self, artwork: Option<Arc<Artwork>>) -> Self {
        self.artwork = artwork;
        self
    }

    /// 0.0 ..= 100.0, zero for unknown durations.
    pub fn progress_percent(&self) -> f32 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.progress_ms as f32 / self.duration_ms as f32 * 100.0).clamp(0.0, 100.0)
    }

    pub fn elapsed(&self) -> String {
        ms_to_min_secs(self.progress_ms)
    }

    pub fn duration(&self) -> String {
        ms_to_min_secs(self.duration_ms)
    }

    /// "3 / 12", empty when the position is unknown.
    pub fn track_position(&self) -> String {
        match (self.track_number, self.total_tracks) {
            (0, _) => String::new(),
            (n, 0) => n.to_string(),
            (n, total) => format!("{} / {}", n, total),
        }
    }

    pub fn same_track(&self, other: &PlaybackState) -> bool {
        self.title == other.title && self.artist == other.artist && self.album == other.album
    }
}
