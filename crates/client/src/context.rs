//! Application-wide services, created once at startup.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context as _;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api_client::ApiClient;
use crate::bookings::BookingFeed;
use crate::boot::Navigator;
use crate::config::ClientConfig;
use crate::notify::{Banner, BannerCenter};
use crate::realtime::RealtimeChannel;
use crate::session::SessionManager;
use crate::storage::{FileStorage, Storage};

pub struct AppContext {
    pub config: Arc<ClientConfig>,
    pub session: Arc<SessionManager>,
    pub realtime: Arc<RealtimeChannel>,
    pub banners: BannerCenter,
    pub bookings: Arc<BookingFeed>,
    /// The session-expired banner currently on screen, if any.
    expired_banner: Arc<Mutex<Option<Uuid>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().ok().and_then(Option::take) {
            watcher.abort();
        }
    }
}

impl AppContext {
    /// Build the context with file-backed session storage.
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let storage = match &config.storage_dir {
            Some(dir) => FileStorage::new(dir)
                .with_context(|| format!("Failed to open storage at {}", dir.display()))?,
            None => FileStorage::in_config_dir().context("Failed to open session storage")?,
        };
        tracing::debug!("Session storage at {}", storage.dir().display());
        Ok(Self::with_storage(config, Arc::new(storage)))
    }

    pub fn with_storage(config: ClientConfig, storage: Arc<dyn Storage>) -> Self {
        let api = ApiClient::new(&config.api_base_url, config.request_timeout);
        let session = Arc::new(SessionManager::new(api, storage, config.retry.clone()));
        let banners = BannerCenter::new();
        let realtime = Arc::new(RealtimeChannel::new(config.realtime_config(), banners.clone()));
        let bookings = Arc::new(BookingFeed::new(session.clone(), banners.clone()));

        let feed = bookings.clone();
        realtime.on_new_booking(move |booking| {
            feed.on_booking(booking);
        });

        Self {
            config: Arc::new(config),
            session,
            realtime,
            banners,
            bookings,
            expired_banner: Arc::new(Mutex::new(None)),
            watcher: Mutex::new(None),
        }
    }

    fn expired_banner(&self) -> MutexGuard<'_, Option<Uuid>> {
        self.expired_banner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Show the session-expired banner for every unauthorized signal, at
    /// most one at a time. Starts the watcher task on first call only.
    pub fn watch_unauthorized(&self) {
        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.is_some() {
            return;
        }
        let mut signals = self.session.subscribe_unauthorized();
        let banners = self.banners.clone();
        let slot = self.expired_banner.clone();

        *watcher = Some(tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => {
                        tracing::warn!("Unauthorized response from {}", signal.url);
                        show_expired_once(&slot, &banners);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Skipped {} unauthorized signals", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// The banner's *Login* action: drop the session and go to login.
    pub fn relogin(&self, navigator: &dyn Navigator) {
        self.logout();
        navigator.redirect_to_login();
    }

    /// Clear the session and stop realtime delivery.
    pub fn logout(&self) {
        self.session.logout();
        self.realtime.close();
        self.bookings.clear();
        if let Some(id) = self.expired_banner().take() {
            self.banners.dismiss(id);
        }
    }
}

fn show_expired_once(slot: &Mutex<Option<Uuid>>, banners: &BannerCenter) {
    let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if current.is_some_and(|id| banners.is_active(id)) {
        tracing::debug!("Session-expired banner already shown");
        return;
    }
    *current = Some(banners.show(Banner::session_expired()));
}
