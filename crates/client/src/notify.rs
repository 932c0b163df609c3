//! User-facing banners.
//!
//! The UI reads [`BannerCenter::active`] or listens on
//! [`BannerCenter::subscribe`]; everything else only calls `show`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

/// How long transient banners stay up.
pub const AUTO_DISMISS_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Info,
    Success,
    Error,
}

/// Buttons a banner offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerAction {
    Login,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub id: Uuid,
    pub title: Option<String>,
    pub message: String,
    pub kind: BannerKind,
    /// Persistent banners stay until dismissed.
    pub persistent: bool,
    pub actions: Vec<BannerAction>,
}

impl Banner {
    pub fn new(kind: BannerKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: None,
            message: message.into(),
            kind,
            persistent: false,
            actions: Vec::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(BannerKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(BannerKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(BannerKind::Error, message)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn persistent(mut self, actions: Vec<BannerAction>) -> Self {
        self.persistent = true;
        self.actions = actions;
        self
    }

    /// Shown when the server rejects the current credential. Stays up and
    /// lets the user keep working on the current page.
    pub fn session_expired() -> Self {
        Banner::error(
            "Your session has expired or is invalid. You can stay on this page, \
             but some features may not work.",
        )
        .persistent(vec![BannerAction::Login, BannerAction::Dismiss])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BannerUpdate {
    Shown(Banner),
    Dismissed(Uuid),
}

#[derive(Clone)]
pub struct BannerCenter {
    inner: Arc<Inner>,
}

struct Inner {
    active: Mutex<Vec<Banner>>,
    updates: broadcast::Sender<BannerUpdate>,
    auto_dismiss: Duration,
}

impl Default for BannerCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl BannerCenter {
    pub fn new() -> Self {
        Self::with_auto_dismiss(AUTO_DISMISS_AFTER)
    }

    pub fn with_auto_dismiss(auto_dismiss: Duration) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                active: Mutex::new(Vec::new()),
                updates,
                auto_dismiss,
            }),
        }
    }

    fn active_mut(&self) -> MutexGuard<'_, Vec<Banner>> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Show a banner. Transient banners are dismissed automatically when a
    /// tokio runtime is available.
    pub fn show(&self, banner: Banner) -> Uuid {
        let id = banner.id;
        let persistent = banner.persistent;
        tracing::debug!("Banner {:?}: {}", banner.kind, banner.message);

        self.active_mut().push(banner.clone());
        let _ = self.inner.updates.send(BannerUpdate::Shown(banner));

        if !persistent {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let center = self.clone();
                let after = self.inner.auto_dismiss;
                handle.spawn(async move {
                    tokio::time::sleep(after).await;
                    center.dismiss(id);
                });
            }
        }
        id
    }

    /// Remove a banner. Returns `false` if it was already gone.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let removed = {
            let mut active = self.active_mut();
            let before = active.len();
            active.retain(|b| b.id != id);
            active.len() != before
        };
        if removed {
            let _ = self.inner.updates.send(BannerUpdate::Dismissed(id));
        }
        removed
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.active_mut().iter().any(|b| b.id == id)
    }

    pub fn active(&self) -> Vec<Banner> {
        self.active_mut().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BannerUpdate> {
        self.inner.updates.subscribe()
    }
}
