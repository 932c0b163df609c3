//! Dashboard startup: token check, profile fetch, realtime connection.

use cribz_shared::Profile;

use crate::context::AppContext;
use crate::error::SessionError;

/// Where the embedding UI sends the user to sign in.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum BootOutcome {
    /// No usable token; the navigator was asked to show the login page.
    RedirectedToLogin,
    /// Profile loaded and the realtime channel opened.
    Ready(Profile),
    /// The server rejected the stored token. The session-expired banner is
    /// up and the user stays where they are.
    Unauthorized,
    /// Profile could not be loaded for another reason.
    Degraded(SessionError),
}

/// Run the dashboard startup sequence.
///
/// The realtime channel is opened at most once, and only after the profile
/// fetch succeeded with the stored token.
pub async fn boot(ctx: &AppContext, navigator: &dyn Navigator) -> BootOutcome {
    let Some(token) = ctx.session.token() else {
        tracing::warn!("No valid auth token found, redirecting to login");
        navigator.redirect_to_login();
        return BootOutcome::RedirectedToLogin;
    };

    ctx.watch_unauthorized();

    match ctx.session.get_profile().await {
        Ok(profile) => {
            tracing::info!("Dashboard ready for {}", profile.full_name);
            if ctx.session.take_new_user_marker() {
                tracing::info!("First session after registration");
            }
            ctx.realtime.open(&token);
            BootOutcome::Ready(profile)
        }
        Err(e) if !ctx.session.is_authenticated() => {
            tracing::warn!("Profile fetch rejected the stored token: {}", e);
            BootOutcome::Unauthorized
        }
        Err(e) => {
            tracing::error!("Error initializing dashboard: {}", e);
            BootOutcome::Degraded(e)
        }
    }
}
