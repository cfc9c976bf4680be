/*
 *  artwork.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Album art download, decode and cache
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

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use image::imageops::FilterType;
use log::{debug, warn};
use mini_moka::sync::Cache;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{ARTWORK_CACHE_ENTRIES, ARTWORK_RETRY_SECS, ART_SIZE};

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("artwork download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("artwork could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

/// Square album art, already scaled and converted for the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    size: u32,
    pixels: Vec<Rgb565>,
}

impl Artwork {
    /// Decode a JPEG/PNG and scale it to `size` x `size`.
    pub fn from_encoded(bytes: &[u8], size: u32) -> Result<Self, ArtworkError> {
        let img = image::load_from_memory(bytes)?
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();
        let pixels = img
            .pixels()
            .map(|p| Rgb565::from(Rgb888::new(p[0], p[1], p[2])))
            .collect();
        Ok(Self { size, pixels })
    }

    /// Flat color artwork; handy as a placeholder.
    pub fn solid(size: u32, color: Rgb565) -> Self {
        Self { size, pixels: vec![color; (size * size) as usize] }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb565> {
        if x >= self.size || y >= self.size {
            return None;
        }
        self.pixels.get((y * self.size + x) as usize).copied()
    }

    pub fn draw<D: DrawTarget<Color = Rgb565>>(&self, target: &mut D, top_left: Point) -> Result<(), D::Error> {
        let area = Rectangle::new(top_left, Size::new(self.size, self.size));
        target.fill_contiguous(&area, self.pixels.iter().copied())
    }
}

/// Where the poller gets decoded artwork from.
#[allow(async_fn_in_trait)]
pub trait ArtworkSource {
    /// `None` when the image can't be had; the state is shown without art then.
    async fn artwork(&self, url: &str) -> Option<Arc<Artwork>>;
}

/// No artwork at all, e.g. for tests or slow links.
pub struct NoArtwork;

impl ArtworkSource for NoArtwork {
    async fn artwork(&self, _url: &str) -> Option<Arc<Artwork>> {
        None
    }
}

/// Downloads artwork once per URL and keeps the decoded result around.
///
/// Failed URLs are remembered for a while so a track with broken art
/// doesn't stall every tick on the download timeout.
#[derive(Clone)]
pub struct ArtworkCache {
    client: Client,
    cache: Arc<Cache<String, Arc<Artwork>>>,
    failed: Arc<Cache<String, ()>>,
    size: u32,
}

impl ArtworkCache {
    pub fn new(timeout: Duration) -> Result<Self, ArtworkError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            cache: Arc::new(Cache::new(ARTWORK_CACHE_ENTRIES)),
            failed: Arc::new(
                Cache::builder()
                    .max_capacity(ARTWORK_CACHE_ENTRIES)
                    .time_to_live(Duration::from_secs(ARTWORK_RETRY_SECS))
                    .build(),
            ),
            size: ART_SIZE,
        })
    }

    async fn download(&self, url: &str) -> Result<Artwork, ArtworkError> {
        let bytes = self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Artwork::from_encoded(&bytes, self.size)
    }
}

impl ArtworkSource for ArtworkCache {
    async fn artwork(&self, url: &str) -> Option<Arc<Artwork>> {
        let key = url.to_string();
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }
        if self.failed.contains_key(&key) {
            debug!("Artwork failed recently, skipping: {}", url);
            return None;
        }
        match self.download(url).await {
            Ok(art) => {
                debug!("Artwork cached: {}", url);
                let art = Arc::new(art);
                self.cache.insert(key, Arc::clone(&art));
                Some(art)
            }
            Err(e) => {
                warn!("Error downloading album art: {}", e);
                self.failed.insert(key, ());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(3, 3, Rgb(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_and_scale() {
        let art = Artwork::from_encoded(&png([255, 0, 0]), 8).unwrap();
        assert_eq!(art.size(), 8);
        assert_eq!(art.pixel(0, 0), Some(Rgb565::RED));
        assert_eq!(art.pixel(7, 7), Some(Rgb565::RED));
        assert_eq!(art.pixel(8, 0), None);
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let res = Artwork::from_encoded(b"definitely not an image", 8);
        assert!(matches!(res, Err(ArtworkError::Decode(_))));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_download() {
        let cache = ArtworkCache::new(Duration::from_millis(100)).unwrap();
        let art = Arc::new(Artwork::solid(4, Rgb565::BLUE));
        // unroutable URL, only the cache can answer
        let url = "http://127.0.0.1:9/art.jpg";
        cache.cache.insert(url.to_string(), Arc::clone(&art));
        assert_eq!(cache.artwork(url).await, Some(art));
    }

    #[tokio::test]
    async fn test_failed_download_is_none() {
        let cache = ArtworkCache::new(Duration::from_millis(100)).unwrap();
        let url = "http://127.0.0.1:9/missing.jpg";
        assert!(cache.artwork(url).await.is_none());
        assert!(cache.failed.contains_key(&url.to_string()));
    }

    #[tokio::test]
    async fn test_recent_failure_skips_download() {
        use axum::{http::StatusCode, routing::get, Router};
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/art.jpg",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::NOT_FOUND }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let cache = ArtworkCache {
            client: Client::builder().no_proxy().build().unwrap(),
            ..ArtworkCache::new(Duration::from_secs(1)).unwrap()
        };
        let url = format!("http://{}/art.jpg", addr);
        for _ in 0..3 {
            assert!(cache.artwork(&url).await.is_none());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
