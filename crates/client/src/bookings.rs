//! Booking notification feed for agents.
//!
//! Installed as the `newBooking` handler. Only bookings for the signed-in
//! agent's listings are kept; banners are throttled so a burst of bookings
//! does not stack up on screen.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use cribz_shared::BookingNotice;

use crate::notify::{Banner, BannerCenter};
use crate::session::SessionManager;

/// Minimum gap between two booking banners.
pub const BANNER_THROTTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct BookingNotification {
    pub booking: BookingNotice,
    pub received_at: DateTime<Utc>,
}

#[derive(Default)]
struct FeedState {
    /// Newest first.
    items: Vec<BookingNotification>,
    new_count: u32,
    last_banner: Option<Instant>,
}

pub struct BookingFeed {
    session: Arc<SessionManager>,
    banners: BannerCenter,
    throttle: Duration,
    state: Mutex<FeedState>,
}

impl BookingFeed {
    pub fn new(session: Arc<SessionManager>, banners: BannerCenter) -> Self {
        Self::with_throttle(session, banners, BANNER_THROTTLE)
    }

    pub fn with_throttle(session: Arc<SessionManager>, banners: BannerCenter, throttle: Duration) -> Self {
        Self {
            session,
            banners,
            throttle,
            state: Mutex::new(FeedState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle an incoming booking. Returns `true` if it was for the current
    /// agent and got added to the feed.
    pub fn on_booking(&self, booking: &BookingNotice) -> bool {
        let agent_id = self.session.cached_profile().map(|p| p.id);
        if agent_id.is_none() || booking.agent_id() != agent_id.as_deref() {
            tracing::debug!("Ignoring booking for agent {:?}", booking.agent_id());
            return false;
        }

        let show_banner = {
            let mut state = self.state();
            state.items.insert(
                0,
                BookingNotification {
                    booking: booking.clone(),
                    received_at: Utc::now(),
                },
            );
            state.new_count += 1;

            let now = Instant::now();
            let due = state
                .last_banner
                .map_or(true, |last| now.duration_since(last) >= self.throttle);
            if due {
                state.last_banner = Some(now);
            }
            due
        };

        if show_banner {
            self.banners.show(
                Banner::info(format!("From: {}", booking.client_name()))
                    .with_title(format!("New Booking: {}", booking.property_title())),
            );
        }
        true
    }

    pub fn items(&self) -> Vec<BookingNotification> {
        self.state().items.clone()
    }

    /// Bookings received since the last [`mark_seen`](Self::mark_seen).
    pub fn new_count(&self) -> u32 {
        self.state().new_count
    }

    pub fn mark_seen(&self) {
        self.state().new_count = 0;
    }

    pub fn clear(&self) {
        *self.state() = FeedState::default();
    }
}
