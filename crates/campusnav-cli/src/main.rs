//! campusnav - command-line driver for the campus navigation offline layer.
//!
//! Installs and activates asset cache generations, serves requests
//! cache-first, manages locally stored images, and runs a sync session
//! against the in-process remote store.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use campusnav_core::auth::{AuthSession, Session};
use campusnav_core::drafts::{DraftFile, ImageCategory};
use campusnav_core::models::{AlertKind, Coordinates, NewAlert, Role};
use campusnav_core::net::Request;
use campusnav_core::utils::{age_display, format_bytes};
use campusnav_core::{AppContext, Config, HttpFetcher, MemoryRemoteStore, RemoteStore};

/// How long the sync demo waits for a snapshot before giving up.
const DEMO_SNAPSHOT_TIMEOUT_SECS: u64 = 5;

const USAGE: &str = "\
Usage: campusnav <command>

Commands:
  install                              Install and activate the current cache generation
  status                               Show cache generations and their entries
  fetch <url> [--navigate]             Serve a request cache-first
  drafts store <file> <category> <owner>
  drafts list <category> [owner]
  drafts remove <id> <category>
  session set <user-id> <email> <role> [display name]
  session show
  session clear
  demo-sync                            Post an alert and track presence against an in-memory store

Categories: profile, building, incident, event
Roles: student, staff, admin";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?.with_env_overrides();
    info!(generation = %config.cache_name(), "campusnav starting");

    match command.as_str() {
        "install" => install(config).await,
        "status" => status(config),
        "fetch" => {
            let url = args.get(1).context("fetch needs a URL")?;
            let navigate = args.iter().any(|a| a == "--navigate");
            fetch(config, url, navigate).await
        }
        "drafts" => drafts(config, &args[1..]),
        "session" => session(config, &args[1..]),
        "demo-sync" => demo_sync(config).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

async fn install(config: Config) -> Result<()> {
    let ctx = AppContext::from_config(config)?;
    let mut events = ctx.cache.subscribe_events();

    let result = ctx.cache.install_and_activate().await;
    while let Ok(event) = events.try_recv() {
        eprintln!("  {:?}", event);
    }

    let pruned = result.context("Cache install failed; the previous generation keeps serving")?;
    println!(
        "Generation {} active ({} entries)",
        ctx.cache.generation(),
        ctx.cache_storage.entries(ctx.cache.generation())?.len()
    );
    for name in pruned {
        println!("  pruned {}", name);
    }
    Ok(())
}

fn status(config: Config) -> Result<()> {
    let ctx = AppContext::from_config(config)?;
    println!("Current generation: {} ({})", ctx.cache.generation(), ctx.cache.state());

    let now = Utc::now();
    for name in ctx.cache_storage.cache_names()? {
        let entries = ctx.cache_storage.entries(&name)?;
        let total: u64 = entries.iter().map(|e| e.response.body.len() as u64).sum();
        let marker = if name == ctx.cache.generation() { "*" } else { " " };
        println!("{} {} - {} entries, {}", marker, name, entries.len(), format_bytes(total));
        for entry in entries {
            println!(
                "    {} [{}] {}",
                entry.key,
                entry.response.status,
                age_display(entry.cached_at, now)
            );
        }
    }
    Ok(())
}

async fn fetch(config: Config, url: &str, navigate: bool) -> Result<()> {
    let ctx = AppContext::from_config(config)?;
    let request = if navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    };

    let response = ctx.cache.handle_fetch(&request).await?;
    ctx.cache.wait_for_pending_writes().await;

    println!(
        "{} {} ({})",
        response.status,
        response.url,
        format_bytes(response.body.len() as u64)
    );
    Ok(())
}

fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn parse_category(arg: Option<&String>) -> Result<ImageCategory> {
    let raw = arg.context("missing image category")?;
    raw.parse::<ImageCategory>().map_err(|e| anyhow::anyhow!(e))
}

fn drafts(config: Config, args: &[String]) -> Result<()> {
    let ctx = AppContext::from_config(config)?;

    match args.first().map(String::as_str) {
        Some("store") => {
            let path = Path::new(args.get(1).context("missing file path")?);
            let category = parse_category(args.get(2))?;
            let owner = args.get(3).context("missing owner id")?;

            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file = DraftFile {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                mime_type: mime_type_for(path).to_string(),
                bytes,
            };
            let id = ctx.drafts.store(&file, category, owner)?;
            println!("{}", id);
        }
        Some("list") => {
            let category = parse_category(args.get(1))?;
            let owner = args.get(2).map(String::as_str);
            let now = Utc::now();
            for image in ctx.drafts.list(category, owner)? {
                println!(
                    "{}  {}  {}  {}  {}",
                    image.id,
                    image.owner_id,
                    image.file_name,
                    format_bytes(image.size as u64),
                    age_display(image.uploaded_at, now)
                );
            }
        }
        Some("remove") => {
            let id = args.get(1).context("missing image id")?;
            let category = parse_category(args.get(2))?;
            if ctx.drafts.remove(id, category)? {
                println!("Removed {}", id);
            } else {
                println!("No image {} in {}", id, category.as_str());
            }
        }
        _ => bail!("Unknown drafts command\n\n{}", USAGE),
    }
    Ok(())
}

fn parse_role(arg: Option<&String>) -> Result<Role> {
    match arg.map(|r| r.to_ascii_lowercase()).as_deref() {
        Some("student") => Ok(Role::Student),
        Some("staff") => Ok(Role::Staff),
        Some("admin") => Ok(Role::Admin),
        Some(other) => bail!("Unknown role '{}'", other),
        None => bail!("missing role"),
    }
}

/// Record the identity handed over by the auth provider so gated writes
/// work across runs.
fn session(config: Config, args: &[String]) -> Result<()> {
    let mut session = Session::new(config.cache_dir()?);
    session.load()?;

    match args.first().map(String::as_str) {
        Some("set") => {
            let user_id = args.get(1).context("missing user id")?;
            let email = args.get(2).context("missing email")?;
            let role = parse_role(args.get(3))?;
            let display_name = (args.len() > 4).then(|| args[4..].join(" "));

            session.update(AuthSession {
                user_id: user_id.clone(),
                email: email.clone(),
                display_name,
                role,
                signed_in_at: Utc::now(),
            });
            session.save()?;
            info!(user_id = %user_id, "Session saved");
            println!("Signed in as {} ({:?})", user_id, role);
        }
        Some("show") => match &session.data {
            Some(data) => println!(
                "{} <{}> {:?}, signed in {}",
                data.user_id,
                data.email,
                data.role,
                age_display(data.signed_in_at, Utc::now())
            ),
            None => println!("Not signed in"),
        },
        Some("clear") => {
            session.clear()?;
            println!("Signed out");
        }
        _ => bail!("Unknown session command\n\n{}", USAGE),
    }
    Ok(())
}

async fn demo_sync(config: Config) -> Result<()> {
    let data_dir = config.cache_dir()?;
    let store = Arc::new(MemoryRemoteStore::new());
    let session = AuthSession {
        user_id: "demo-admin".to_string(),
        email: "admin@campus.example.edu".to_string(),
        display_name: Some("Demo Admin".to_string()),
        role: Role::Admin,
        signed_in_at: Utc::now(),
    };
    let ctx = AppContext::new(
        config,
        &data_dir,
        Arc::new(HttpFetcher::new("http://localhost")?),
        Arc::clone(&store) as Arc<dyn RemoteStore>,
        Some(session),
    )?;

    let mut alerts_rx = ctx.sync.watch_alerts();
    let alerts = ctx.sync.subscribe_alerts().await?;
    let presence = ctx.sync.subscribe_presence().await?;

    let id = ctx
        .sync
        .add_alert(NewAlert {
            message: "Demo: north entrance closed for maintenance".to_string(),
            coords: Some(Coordinates::new(40.1020, -88.2272)),
            kind: AlertKind::Warning,
        })
        .await?;
    println!("Posted alert {}", id);

    tokio::time::timeout(
        Duration::from_secs(DEMO_SNAPSHOT_TIMEOUT_SECS),
        alerts_rx.wait_for(|mirror| mirror.iter().any(|r| r.id == id)),
    )
    .await
    .context("Timed out waiting for the alert snapshot")??;

    for record in ctx.sync.alerts().iter() {
        println!("  [{}] {} {}", record.data.kind, record.id, record.data.message);
    }
    println!("Online users: {}", ctx.sync.online_users().len());

    alerts.unsubscribe().await;
    presence.unsubscribe().await?;

    let entry = store.document("onlineUsers", "demo-admin");
    println!(
        "Presence after unsubscribe: {}",
        serde_json::to_string(&entry).unwrap_or_default()
    );
    Ok(())
}
