//! Tusk - multi-account Mastodon sessions from the terminal
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tusk::api::mastodon::{MastodonClient, oauth};
use tusk::api::{MastodonApi, client_for};
use tusk::auth::migration::{self, MigrationOutcome};
use tusk::feed::{FollowingLoader, LoadOutcome};
use tusk::models::{Credential, FeedItem, FeedKind, FeedRecord};
use tusk::{
    Config, Database, EncryptedFileStore, FeedController, FeedStateMachine, LoadState,
    RelationshipCache, RelationshipRefresher, SessionRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse CLI arguments
    match parse_args()? {
        Command::Login { instance } => login(&instance).await,
        Command::Accounts { refresh } => list_accounts(refresh).await,
        Command::Switch { account } => switch(&account).await,
        Command::Logout { account } => logout(account.as_deref()).await,
        Command::Timeline { kind, pages } => timeline(kind.as_deref(), pages).await,
        Command::Following { pages } => following(pages).await,
        Command::Relationships => relationships().await,
        Command::Migrate => migrate().await,
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

/// CLI commands
enum Command {
    Login { instance: String },
    Accounts { refresh: bool },
    Switch { account: String },
    Logout { account: Option<String> },
    Timeline { kind: Option<String>, pages: usize },
    Following { pages: usize },
    Relationships,
    Migrate,
    Help,
    Version,
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    let Some(command) = args.get(1) else {
        return Ok(Command::Help);
    };

    let pages = || {
        args.iter()
            .position(|a| a == "--pages" || a == "-p")
            .and_then(|i| args.get(i + 1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(1)
    };

    match command.as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),

        "login" => {
            let instance = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Missing instance\nExample: tusk login mastodon.social"))?
                .clone();
            Ok(Command::Login { instance })
        }

        "accounts" => Ok(Command::Accounts {
            refresh: args.iter().any(|a| a == "--refresh" || a == "-r"),
        }),

        "switch" => {
            let account = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("Missing account\nExample: tusk switch alice@mastodon.social"))?
                .clone();
            Ok(Command::Switch { account })
        }

        "logout" => Ok(Command::Logout {
            account: args.get(2).cloned(),
        }),

        "timeline" | "tl" => {
            let kind = args.get(2).filter(|a| !a.starts_with('-')).cloned();
            Ok(Command::Timeline {
                kind,
                pages: pages(),
            })
        }

        "following" => Ok(Command::Following { pages: pages() }),

        "relationships" => Ok(Command::Relationships),

        "migrate" => Ok(Command::Migrate),

        other => Err(anyhow::anyhow!(
            "Unknown command: {other}\nRun 'tusk --help' for usage"
        )),
    }
}

fn print_help() {
    let config_path = Config::default_path()
        .map_or_else(|_| "Unknown".to_string(), |p| p.display().to_string());

    println!(
        r#"🐘 Tusk - multi-account Mastodon sessions

USAGE:
    tusk [COMMAND]

COMMANDS:
    login <instance>                   Sign in to a Mastodon server
      Example:
        tusk login mastodon.social

    accounts [OPTIONS]                 List signed-in accounts (active first)
      Options:
        -r, --refresh                  Re-verify every account first

    switch <user@domain>               Make another account active
    logout [user@domain]               Sign out (default: active account)

    timeline [feed] [OPTIONS]          Show a feed of the active account
      Feeds:
        home, local, federated, notifications, mentions,
        notifications:<account id>, account:<account id>
      Options:
        -p, --pages <n>                Number of pages (default: 1)

    following [OPTIONS]                List ids the active account follows
      Options:
        -p, --pages <n>                Number of pages (default: 1)

    relationships                      Refresh following/blocked/requested sets
    migrate                            Import accounts from the legacy database

OPTIONS:
    -h, --help                         Show this help message
    -v, --version                      Show version information

CONFIG:
    {}

HOMEPAGE:
    {}
"#,
        config_path,
        tusk::REPO_URL
    );
}

fn print_version() {
    println!("tusk {}", tusk::VERSION);
}

/// Open the credential store and the database, and run the one-time legacy
/// import if it has not happened yet.
async fn startup() -> Result<(SessionRegistry, Database, Option<MigrationOutcome>)> {
    let store = Arc::new(EncryptedFileStore::open()?);
    let mut registry = SessionRegistry::restore(store);
    let db = Database::open()?;

    let legacy = tusk::paths::legacy_database_path()?;
    let outcome = match migration::migrate_if_required(&mut registry, &db, &legacy) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!("Legacy migration failed: {e}");
            None
        }
    };

    // Imported accounts carry no snapshot until verified once
    if registry.credentials().iter().any(|c| c.imported) {
        let refreshed = registry.refresh_cached_accounts(client_for).await;
        tracing::info!("Verified {refreshed} imported account(s)");
    }
    registry.flush().await;

    Ok((registry, db, outcome))
}

fn require_active(registry: &SessionRegistry) -> Result<Credential> {
    registry
        .active()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Not signed in. Run: tusk login <instance>"))
}

/// Find an account by `user@domain`, `@user@domain` or `user_id@domain`
fn find_account(registry: &SessionRegistry, account: &str) -> Result<Credential> {
    let account = account.trim_start_matches('@');
    let (user, domain) = account
        .rsplit_once('@')
        .ok_or_else(|| anyhow::anyhow!("Expected user@domain, got {account}"))?;
    let domain = domain.to_lowercase();

    registry
        .credentials()
        .iter()
        .find(|c| c.domain == domain && (c.username == user || c.user_id == user))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("No signed-in account {user}@{domain}"))
}

async fn login(instance: &str) -> Result<()> {
    let (mut registry, _db, _) = startup().await?;

    let instance = if instance.starts_with("http") {
        instance.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", instance.trim_end_matches('/'))
    };

    println!("🐘 Signing in to {}...", instance);

    // Register app
    let app = oauth::register_app(&instance).await?;
    println!("✓ App registered");

    // Get auth URL
    let auth_url = oauth::get_auth_url(&instance, &app.client_id);
    println!("\n📋 Open this URL in your browser:\n\n  {}\n", auth_url);

    // Try to open browser
    let _ = open::that(&auth_url);

    println!("Paste the authorization code here:");
    let mut code = String::new();
    std::io::stdin().read_line(&mut code)?;
    let code = code.trim();

    // Exchange for tokens
    let token = oauth::get_token(&instance, &app.client_id, &app.client_secret, code).await?;
    let app_token = match oauth::get_app_token(&instance, &app.client_id, &app.client_secret).await {
        Ok(token) => token.access_token,
        Err(e) => {
            tracing::warn!("Failed to get app token: {e:#}");
            String::new()
        }
    };

    // Verify and get account info
    let client = MastodonClient::new(&instance, &token.access_token);
    let account = client.verify_credentials().await?;

    let mut credential = Credential::new(&instance, &account.id, &account.username, &token.access_token)
        .with_cached_account(account);
    credential.app_access_token = app_token;
    credential.client_id = app.client_id;
    credential.client_secret = app.client_secret;

    match client.instance().await {
        Ok(metadata) => credential = credential.with_instance(metadata),
        Err(e) => tracing::warn!("Failed to fetch instance metadata: {e:#}"),
    }

    // Signing in again replaces the tokens of the known account
    registry.update_in_place(
        |c| c.same_identity(&credential),
        |old| Credential {
            identifier: old.identifier,
            created_at: old.created_at,
            ..credential.clone()
        },
    );
    registry.activate_or_insert(credential.clone());
    registry.flush().await;

    println!("\n✓ Logged in as {}", credential.handle());
    println!("✓ Account saved ({} signed in)", registry.len());

    Ok(())
}

async fn list_accounts(refresh: bool) -> Result<()> {
    let (mut registry, _db, _) = startup().await?;

    if registry.is_empty() {
        println!("No accounts signed in.");
        println!("\nAdd an account with:");
        println!("  tusk login <instance>");
        return Ok(());
    }

    if refresh {
        let refreshed = registry.refresh_cached_accounts(client_for).await;
        registry.flush().await;
        println!("✓ Refreshed {}/{} accounts\n", refreshed, registry.len());
    }

    println!("Signed-in accounts:\n");

    for (index, credential) in registry.credentials().iter().enumerate() {
        let active_marker = if index == 0 { " (active)" } else { "" };
        let display_name = credential
            .cached_account
            .as_ref()
            .map_or(credential.username.as_str(), |a| a.display_name.as_str());
        println!(
            "  🐘 {} {}{}\n    Last active: {}",
            display_name,
            credential.handle(),
            active_marker,
            credential.activated_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

async fn switch(account: &str) -> Result<()> {
    let (mut registry, _db, _) = startup().await?;
    let credential = find_account(&registry, account)?;

    registry.activate(&credential.user_id, &credential.domain);
    registry.flush().await;

    println!("✓ Switched to {}", credential.handle());
    Ok(())
}

async fn logout(account: Option<&str>) -> Result<()> {
    let (mut registry, db, _) = startup().await?;
    let credential = match account {
        Some(account) => find_account(&registry, account)?,
        None => require_active(&registry)?,
    };

    let client = client_for(&credential);
    registry
        .sign_out(&credential, &client, Some(&db))
        .await
        .with_context(|| format!("Failed to sign out {}", credential.handle()))?;
    registry.flush().await;

    println!("✓ Signed out {}", credential.handle());
    if let Some(active) = registry.active() {
        println!("  Active account is now {}", active.handle());
    }
    Ok(())
}

async fn timeline(kind: Option<&str>, pages: usize) -> Result<()> {
    let config = Config::load()?;
    let (registry, db, _) = startup().await?;
    let credential = require_active(&registry)?;

    let kind = match kind {
        Some(name) => FeedKind::from_str(name).ok_or_else(|| anyhow::anyhow!("Unknown feed: {}", name))?,
        None => config.default_feed.clone(),
    };

    let client = client_for(&credential);
    let mut feed = if config.cache_feeds {
        FeedController::with_cache(
            client,
            &credential.store_key(),
            config.page_limit,
            Arc::new(Mutex::new(db)),
        )
    } else {
        FeedController::new(client, &credential.store_key(), config.page_limit)
    };

    let cached = feed.load_cached(&kind).await?;
    if cached > 0 {
        tracing::info!("{cached} cached records shown before refresh");
    }

    println!("\n🐘 {} ({})", kind, credential.handle());
    println!("{}", "─".repeat(60));

    let mut outcome = feed.load_initial(&kind).await?;
    for _ in 1..pages.max(1) {
        if outcome == LoadOutcome::Exhausted {
            break;
        }
        outcome = feed.load_next(&kind).await?;
    }

    for record in feed.records_of(&kind) {
        print_record(record);
    }

    if feed.is_exhausted(&kind) {
        println!("\n— end of feed —");
    }

    Ok(())
}

fn print_record(record: &FeedRecord) {
    match &record.item {
        FeedItem::Status(status) => {
            let boosted = status
                .reblogged_by
                .as_ref()
                .map_or_else(String::new, |by| format!(" (🔁 {by})"));
            println!("\n@{}{} · {}", status.author_acct, boosted, status.relative_time());
            println!("{}", status.content);
            println!(
                "♥ {}  🔁 {}  💬 {}",
                status.favourites_count, status.reblogs_count, status.replies_count
            );
        }
        FeedItem::Notification(notification) => {
            println!(
                "\n{} @{}",
                notification.kind.label(),
                notification.account.acct
            );
            if let Some(status) = &notification.status {
                println!("{}", status.preview(140));
            }
        }
    }
}

async fn following(pages: usize) -> Result<()> {
    let config = Config::load()?;
    let (registry, _db, _) = startup().await?;
    let credential = require_active(&registry)?;

    let loader = FollowingLoader::new(client_for(&credential), &credential.user_id);
    let mut machine = FeedStateMachine::new(loader, config.retry_delay());
    machine.reload()?;

    let mut loaded = 0;
    let mut failures = 0;
    loop {
        match machine.run_until_settled().await {
            LoadState::Idle => {
                loaded += 1;
                if loaded >= pages.max(1) {
                    break;
                }
                machine.load_more()?;
            }
            LoadState::Fail => {
                failures += 1;
                if failures > 1 {
                    anyhow::bail!("Failed to load following list");
                }
                println!("⚠ Page load failed, retrying in {}s...", config.retry_delay_secs);
                // The retry timer moves the machine back to Loading
                machine.process_next().await;
            }
            _ => break,
        }
    }

    println!("{} follows {} accounts (state: {})", credential.handle(), machine.records().len(), machine.state());
    for id in machine.records() {
        println!("  {id}");
    }
    Ok(())
}

async fn relationships() -> Result<()> {
    let (registry, _db, _) = startup().await?;
    let credential = require_active(&registry)?;

    let refresher = RelationshipRefresher::new(RelationshipCache::new());
    println!("🔄 Refreshing relationships for {}...", credential.handle());
    refresher
        .refresh(&client_for(&credential), &credential)
        .await
        .context("Failed to refresh relationships")?;

    let relationships = refresher
        .cache()
        .get(&credential.id())
        .context("Relationship cache is empty after refresh")?;
    println!("✓ Following: {}", relationships.following.len());
    println!("✓ Blocked: {}", relationships.blocked.len());
    println!("✓ Follow requests: {}", relationships.follow_requested.len());
    Ok(())
}

async fn migrate() -> Result<()> {
    let (registry, _db, outcome) = startup().await?;

    match outcome {
        Some(MigrationOutcome::NotRequired) => println!("✓ Legacy accounts were already imported"),
        Some(MigrationOutcome::NoLegacyData) => println!("✓ No legacy database found"),
        Some(MigrationOutcome::Migrated { found, mapped, added }) => {
            println!("✓ Read {} legacy accounts, {} usable, {} added", found, mapped, added);
        }
        None => anyhow::bail!("Legacy migration failed, it will be retried on next start"),
    }
    println!("  {} account(s) signed in", registry.len());
    Ok(())
}
