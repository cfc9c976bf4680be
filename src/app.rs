/*
 *  app.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  The poll, render, write loop
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

use log::{debug, error, info, warn};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::artwork::ArtworkSource;
use crate::config::Config;
use crate::constants::DEVICE_RETRY_SECS;
use crate::credential::TokenEndpoint;
use crate::display::{DisplayError, DisplayFrame, Renderer, Screen};
use crate::poller::{PollError, Poller};
use crate::spotify::NowPlayingApi;
use crate::ticker::Ticker;

/// Loop timing and idle behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub poll_interval: Duration,
    pub idle_interval: Duration,
    pub screen_off_when_idle: bool,
    pub device_retry: Duration,
}

impl LoopSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            idle_interval: cfg.idle_interval(),
            screen_off_when_idle: cfg.screen_off_when_idle(),
            device_retry: Duration::from_secs(DEVICE_RETRY_SECS),
        }
    }
}

/// Run a blocking device call without stalling the other tasks on this
/// worker. Single threaded runtimes (tests) just call it.
fn device_io<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(h) if h.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(f),
        _ => f(),
    }
}

/// What a single step did, mostly for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A new frame went to the panel
    Updated,
    /// Poll worked but the panel already showed it
    Unchanged,
    /// Nothing playing; panel off or idle frame
    Idle,
    /// Poll failed, the previous frame stays up
    PollFailed,
    /// The panel didn't take the frame
    DeviceFailed,
}

pub struct App<E: TokenEndpoint, N: NowPlayingApi, A: ArtworkSource> {
    poller: Poller<E, N, A>,
    screen: Screen,
    renderer: Renderer,
    ticker: Ticker,
    settings: LoopSettings,
    needs_init: bool,
}

impl<E: TokenEndpoint, N: NowPlayingApi, A: ArtworkSource> App<E, N, A> {
    /// The screen is initialized lazily on the first step.
    pub fn new(poller: Poller<E, N, A>, screen: Screen, settings: LoopSettings) -> Self {
        let (width, height) = screen.size();
        Self {
            poller,
            screen,
            renderer: Renderer::new(width, height),
            ticker: Ticker::new(settings.poll_interval),
            settings,
            needs_init: true,
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn poller(&self) -> &Poller<E, N, A> {
        &self.poller
    }

    /// Poll once and bring the panel up to date.
    ///
    /// Only unrecoverable auth failures come back as errors.
    pub async fn step(&mut self) -> Result<Step, PollError> {
        if self.needs_init {
            if let Err(e) = device_io(|| self.screen.init()) {
                return Ok(self.device_failed(e));
            }
            self.needs_init = false;
        }

        let renderer = &self.renderer;
        let polled = self.poller.poll().await.map(|state| renderer.render(state));
        let changed = self.poller.take_changed();

        match polled {
            Ok(frame) => {
                self.ticker.set_interval(self.settings.poll_interval);
                if !changed && self.screen.is_on() && self.screen.last_frame().is_some() {
                    debug!("Playback unchanged");
                    return Ok(Step::Unchanged);
                }
                Ok(self.show(&frame))
            }
            Err(PollError::NoActiveSession) => {
                self.ticker.set_interval(self.settings.idle_interval);
                if changed {
                    info!("Nothing playing, polling every {:?}", self.settings.idle_interval);
                }
                let shown = if self.settings.screen_off_when_idle {
                    device_io(|| self.screen.off())
                } else {
                    let idle = self.renderer.render_idle();
                    let screen = &mut self.screen;
                    device_io(|| screen.on().and_then(|_| screen.write(&idle).map(|_| ())))
                };
                match shown {
                    Ok(()) => Ok(Step::Idle),
                    Err(e) => Ok(self.device_failed(e)),
                }
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Poll failed: {}", e);
                if let Some(wait) = e.retry_after() {
                    info!("Rate limited, backing off {:?}", wait);
                    self.ticker.delay(Instant::now(), wait);
                }
                Ok(Step::PollFailed)
            }
        }
    }

    fn show(&mut self, frame: &DisplayFrame) -> Step {
        let screen = &mut self.screen;
        let res = device_io(|| screen.on().and_then(|_| screen.write(frame)));
        match res {
            Ok(true) => Step::Updated,
            Ok(false) => Step::Unchanged,
            Err(e) => self.device_failed(e),
        }
    }

    fn device_failed(&mut self, e: DisplayError) -> Step {
        error!("Display error: {}", e);
        info!("Retrying the display in {:?}", self.settings.device_retry);
        self.needs_init = true;
        self.ticker.delay(Instant::now(), self.settings.device_retry);
        Step::DeviceFailed
    }

    /// Run until `shutdown` resolves or auth fails for good. The panel is
    /// switched off either way.
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) -> Result<(), PollError> {
        tokio::pin!(shutdown);
        info!("Polling every {:?}", self.settings.poll_interval);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                _ = self.ticker.tick() => {}
            }
            // a slow poll doesn't hold up shutdown
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                res = self.step() => {
                    if let Err(e) = res {
                        break Err(e);
                    }
                }
            }
        };

        if let Err(e) = device_io(|| self.screen.off()) {
            warn!("Could not switch the screen off: {}", e);
        }
        info!("Shutdown complete");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::NoArtwork;
    use crate::credential::tests::{credential, FakeEndpoint};
    use crate::credential::{Session, TokenStore};
    use crate::display::drivers::mock::MockDriver;
    use crate::spotify::tests::TRACK;
    use crate::spotify::{CurrentPlayback, FetchError};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    type Reply = Result<Option<CurrentPlayback>, FetchError>;

    struct ScriptedApi(RefCell<VecDeque<Reply>>);

    impl NowPlayingApi for ScriptedApi {
        async fn current_playback(&self, _token: &str) -> Reply {
            self.0.borrow_mut().pop_front().unwrap_or(Ok(None))
        }
    }

    fn track() -> Reply {
        Ok(Some(serde_json::from_str(TRACK).unwrap()))
    }

    fn settings(screen_off_when_idle: bool) -> LoopSettings {
        LoopSettings {
            poll_interval: Duration::from_millis(1000),
            idle_interval: Duration::from_millis(5000),
            screen_off_when_idle,
            device_retry: Duration::from_secs(5),
        }
    }

    fn app(dir: &TempDir, replies: Vec<Reply>, idle_off: bool) -> (App<FakeEndpoint, ScriptedApi, NoArtwork>, MockDriver) {
        let session = Session::new(
            TokenStore::new(dir.path().join("token.json")),
            FakeEndpoint::new(),
            credential(Utc::now() + ChronoDuration::hours(1)),
        );
        let poller = Poller::new(session, ScriptedApi(RefCell::new(replies.into())), NoArtwork);
        let mock = MockDriver::new(480, 320);
        let screen = Screen::new(Box::new(mock.clone()), 25);
        (App::new(poller, screen, settings(idle_off)), mock)
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_frame() {
        let dir = TempDir::new().unwrap();
        let (mut app, mock) = app(&dir, vec![track(), Err(FetchError::Status(502))], true);
        assert_eq!(app.step().await.unwrap(), Step::Updated);
        let before = app.screen().last_frame().cloned().unwrap();
        assert!(before.contains_text("Song A"));

        assert_eq!(app.step().await.unwrap(), Step::PollFailed);
        assert_eq!(app.screen().last_frame(), Some(&before));
        assert_eq!(mock.state().lock().unwrap().write_count, 1);
    }

    #[tokio::test]
    async fn test_idle_switches_screen_off() {
        let dir = TempDir::new().unwrap();
        let (mut app, mock) = app(&dir, vec![track(), Ok(None), track()], true);
        app.step().await.unwrap();
        assert_eq!(app.step().await.unwrap(), Step::Idle);
        assert!(!app.screen().is_on());
        assert_eq!(app.ticker.interval(), Duration::from_millis(5000));

        // playback resumes: back on with a full frame
        assert_eq!(app.step().await.unwrap(), Step::Updated);
        assert!(app.screen().is_on());
        assert_eq!(app.ticker.interval(), Duration::from_millis(1000));
        let state = mock.state();
        let state = state.lock().unwrap();
        assert_eq!(state.off_count, 1);
        assert_eq!(state.regions.last().unwrap().size.width, 480);
    }

    #[tokio::test]
    async fn test_idle_frame_when_screen_stays_on() {
        let dir = TempDir::new().unwrap();
        let (mut app, _mock) = app(&dir, vec![Ok(None)], false);
        assert_eq!(app.step().await.unwrap(), Step::Idle);
        assert!(app.screen().is_on());
        assert!(app.screen().last_frame().unwrap().contains_text("Nothing playing"));
    }

    #[tokio::test]
    async fn test_device_failure_reinitializes() {
        let dir = TempDir::new().unwrap();
        let (mut app, mock) = app(&dir, vec![track(), track(), track()], true);
        mock.state().lock().unwrap().simulate_write_failure = true;
        assert_eq!(app.step().await.unwrap(), Step::DeviceFailed);
        assert!(app.ticker.deadline().unwrap() > Instant::now() + Duration::from_secs(4));

        mock.state().lock().unwrap().simulate_write_failure = false;
        assert_eq!(app.step().await.unwrap(), Step::Updated);
        assert_eq!(mock.state().lock().unwrap().init_count, 2);
    }

    #[tokio::test]
    async fn test_init_failure_retries_later() {
        let dir = TempDir::new().unwrap();
        let (mut app, mock) = app(&dir, vec![track()], true);
        mock.state().lock().unwrap().simulate_init_failure = true;
        assert_eq!(app.step().await.unwrap(), Step::DeviceFailed);
        assert!(app.ticker.deadline().unwrap() > Instant::now() + Duration::from_secs(4));
        assert_eq!(mock.state().lock().unwrap().write_count, 0);

        // panel back: initialized and showing the track in one step
        mock.state().lock().unwrap().simulate_init_failure = false;
        assert_eq!(app.step().await.unwrap(), Step::Updated);
        let state = mock.state();
        let state = state.lock().unwrap();
        assert_eq!(state.init_count, 1);
        assert_eq!(state.write_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_step_on_multi_thread_runtime() {
        let dir = TempDir::new().unwrap();
        let (mut app, mock) = app(&dir, vec![track(), Ok(None)], true);
        assert_eq!(app.step().await.unwrap(), Step::Updated);
        assert_eq!(app.step().await.unwrap(), Step::Idle);
        assert_eq!(mock.state().lock().unwrap().off_count, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_delays_next_tick() {
        let dir = TempDir::new().unwrap();
        let (mut app, _mock) = app(
            &dir,
            vec![Err(FetchError::RateLimited { retry_after: Duration::from_secs(30) })],
            true,
        );
        assert_eq!(app.step().await.unwrap(), Step::PollFailed);
        assert!(app.ticker.deadline().unwrap() > Instant::now() + Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_turns_off() {
        let dir = TempDir::new().unwrap();
        let (app, mock) = app(&dir, vec![track()], true);
        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        app.run(shutdown).await.unwrap();
        let state = mock.state();
        let state = state.lock().unwrap();
        assert!(state.write_count >= 1);
        assert!(!state.is_on);
    }

    struct StuckApi;

    impl NowPlayingApi for StuckApi {
        async fn current_playback(&self, _token: &str) -> Reply {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_shutdown_during_hung_poll() {
        let dir = TempDir::new().unwrap();
        let session = Session::new(
            TokenStore::new(dir.path().join("t.json")),
            FakeEndpoint::new(),
            credential(Utc::now() + ChronoDuration::hours(1)),
        );
        let screen = Screen::new(Box::new(MockDriver::new(480, 320)), 25);
        let app = App::new(Poller::new(session, StuckApi, NoArtwork), screen, settings(true));
        let shutdown = tokio::time::sleep(Duration::from_millis(100));
        let done = tokio::time::timeout(Duration::from_secs(5), app.run(shutdown)).await;
        assert!(matches!(done, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_fatal_auth_ends_run() {
        let dir = TempDir::new().unwrap();
        let mut endpoint = FakeEndpoint::new();
        endpoint.reject = true;
        let session = Session::new(TokenStore::new(dir.path().join("t.json")), endpoint, credential(Utc::now()));
        let poller = Poller::new(session, ScriptedApi(RefCell::new(VecDeque::new())), NoArtwork);
        let screen = Screen::new(Box::new(MockDriver::new(480, 320)), 25);
        let app = App::new(poller, screen, settings(true));
        let err = app.run(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
