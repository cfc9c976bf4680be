/*
 *  poller.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  One poll: valid token, playback fetch, normalized state
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

use log::{debug, info};
use std::time::Duration;
use thiserror::Error;

use crate::artwork::ArtworkSource;
use crate::credential::{AuthError, Session, TokenEndpoint};
use crate::nowplaying::PlaybackState;
use crate::spotify::{FetchError, NowPlayingApi};

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Nothing loaded in any player of the account.
    #[error("no active playback session")]
    NoActiveSession,
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl PollError {
    /// Only auth failures the user has to fix stop the loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PollError::Auth(e) if !e.is_recoverable())
    }

    /// Server asked us to back off.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PollError::Fetch(FetchError::RateLimited { retry_after }) => Some(*retry_after),
            _ => None,
        }
    }
}

/// Turns ticks into playback states, keeping the last good one.
pub struct Poller<E: TokenEndpoint, N: NowPlayingApi, A: ArtworkSource> {
    session: Session<E>,
    api: N,
    artwork: A,
    last: Option<PlaybackState>,
    changed: bool,
}

impl<E: TokenEndpoint, N: NowPlayingApi, A: ArtworkSource> Poller<E, N, A> {
    pub fn new(session: Session<E>, api: N, artwork: A) -> Self {
        Self { session, api, artwork, last: None, changed: false }
    }

    /// Last successfully fetched state; survives failed polls.
    pub fn last(&self) -> Option<&PlaybackState> {
        self.last.as_ref()
    }

    /// Whether the state changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    pub async fn poll(&mut self) -> Result<&PlaybackState, PollError> {
        let token = self.session.ensure_valid().await?.access_token.clone();

        let playback = match self.api.current_playback(&token).await {
            Ok(p) => p,
            Err(FetchError::Unauthorized) => {
                debug!("API answered 401, token will be refreshed");
                self.session.invalidate();
                return Err(FetchError::Unauthorized.into());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(state) = playback.and_then(PlaybackState::from_playback) else {
            if self.last.take().is_some() {
                info!("Playback stopped");
                self.changed = true;
            }
            return Err(PollError::NoActiveSession);
        };

        let state = match state.artwork_url.clone() {
            // same picture as before, skip the cache lookup
            Some(url) => {
                let art = match &self.last {
                    Some(prev) if prev.artwork_url.as_ref() == Some(&url) && prev.artwork.is_some() => prev.artwork.clone(),
                    _ => self.artwork.artwork(&url).await,
                };
                state.with_artwork(art)
            }
            None => state,
        };

        if self.last.as_ref() != Some(&state) {
            if !self.last.as_ref().is_some_and(|prev| prev.same_track(&state)) {
                info!("Now playing: {} - {} [{}]", state.artist, state.title, state.album);
            }
            self.changed = true;
        }
        debug!(
            "{} {}/{} playing={}",
            state.title,
            state.elapsed(),
            state.duration(),
            state.is_playing
        );
        Ok(&*self.last.insert(state))
    }
}
