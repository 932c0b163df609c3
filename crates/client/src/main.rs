//! `cribz` - command-line front end for the CribzConnect dashboard client.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use cribz_client::notify::BannerUpdate;
use cribz_client::{boot, AppContext, BootOutcome, ClientConfig, Navigator};
use cribz_shared::{Credentials, ProfileUpdate, RegisterRequest};
use tokio::sync::broadcast::error::RecvError;

/// Sign in to CribzConnect and follow realtime notifications.
#[derive(Parser)]
#[command(name = "cribz", version, about, long_about = None)]
struct Cli {
    /// REST API origin.
    #[arg(long, global = true, env = "CRIBZ_API_BASE_URL")]
    api: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the backend is up.
    Health,

    /// Log in and store the session token.
    Login {
        email: String,
        #[arg(long, env = "CRIBZ_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account.
    Register {
        #[arg(long)]
        name: String,
        email: String,
        #[arg(long, env = "CRIBZ_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session.
    Logout,

    /// Show the signed-in profile.
    Whoami,

    /// Set the phone number on the profile.
    SetPhone { phone: String },

    /// Connect and print realtime events until interrupted.
    Listen,
}

struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn redirect_to_login(&self) {
        eprintln!("Not logged in. Run `cribz login <email>` first.");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::EnvFilter;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("cribz_client=debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(api) = cli.api {
        config.api_base_url = api.trim_end_matches('/').to_string();
    }
    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Health => {
            if !ctx.session.check_server_health().await {
                bail!("Server is unavailable");
            }
            println!("OK");
        }
        Commands::Login { email, password } => {
            let session = ctx.session.login(&Credentials::new(email, password)).await?;
            match session.user {
                Some(user) => println!("Logged in as {}", user.full_name),
                None => println!("Logged in"),
            }
        }
        Commands::Register {
            name,
            email,
            password,
        } => {
            let response = ctx
                .session
                .register(&RegisterRequest {
                    full_name: name,
                    email,
                    password,
                })
                .await?;
            println!(
                "{}",
                response
                    .message
                    .unwrap_or_else(|| "Registration successful".to_string())
            );
        }
        Commands::Logout => {
            ctx.logout();
            println!("Logged out");
        }
        Commands::Whoami => {
            let profile = ctx.session.get_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Commands::SetPhone { phone } => {
            let profile = ctx.session.update_profile(&ProfileUpdate::phone(phone)).await?;
            println!("Phone set to {}", profile.phone.unwrap_or_default());
        }
        Commands::Listen => listen(&ctx).await?,
    }

    Ok(())
}

async fn listen(ctx: &AppContext) -> anyhow::Result<()> {
    ctx.realtime.on_new_message(|message| {
        println!(
            "[message] {}: {}",
            message.sender_id().unwrap_or("?"),
            message.content().unwrap_or_default()
        );
    });
    let mut banners = ctx.banners.subscribe();

    match boot(ctx, &ConsoleNavigator).await {
        BootOutcome::Ready(profile) => println!("Listening as {}", profile.full_name),
        BootOutcome::RedirectedToLogin => return Ok(()),
        BootOutcome::Unauthorized => bail!("Session expired. Run `cribz login` again."),
        BootOutcome::Degraded(e) => return Err(e).context("Could not load profile"),
    }

    loop {
        tokio::select! {
            update = banners.recv() => match update {
                Ok(BannerUpdate::Shown(banner)) => match banner.title {
                    Some(title) => println!("[{:?}] {}: {}", banner.kind, title, banner.message),
                    None => println!("[{:?}] {}", banner.kind, banner.message),
                },
                Ok(BannerUpdate::Dismissed(_)) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    ctx.realtime.close();
    Ok(())
}
