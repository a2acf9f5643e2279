//! `keepmd` -- terminal client for a hosted notes project.
//!
//! Signs in, loads the user's notes and tags, keeps them in sync over
//! the realtime channel and re-renders the grid on every change until
//! interrupted. See [`AppConfig::from_env`] for the environment
//! variables it reads.

use std::sync::Arc;

use anyhow::Context;
use keepmd_app::config::{AppConfig, BackendConfig};
use keepmd_app::export::write_export;
use keepmd_app::prefs::PreferenceFile;
use keepmd_app::view;
use keepmd_core::export::{export_files, select_all};
use keepmd_gateway::{AuthBackend, HostedClient, MemoryBackend, NotesBackend};
use keepmd_store::{AuthSession, NoticeLevel, Notices, NotesStore};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = AppConfig::from_env().context("Invalid configuration")?;

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "keepmd=info,keepmd_app=info,keepmd_store=info".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Preferences ---
    let mut prefs_file = PreferenceFile::load(&config.prefs_path)?;
    let locale = std::env::var("LANG").ok();
    let prefs = prefs_file.preferences(locale.as_deref());
    prefs_file.store(&prefs)?;
    tracing::info!(
        language = prefs.language.code(),
        design = prefs.design_system.as_str(),
        theme = prefs.theme.as_str(),
        path = %prefs_file.path().display(),
        "Loaded preferences"
    );

    // --- Backend ---
    let (notes_backend, auth_backend): (Arc<dyn NotesBackend>, Arc<dyn AuthBackend>) =
        match &config.backend {
            BackendConfig::Hosted { url, anon_key } => {
                tracing::info!(url = %url, "Using hosted backend");
                let client = Arc::new(HostedClient::new(url, anon_key.clone()));
                (client.clone() as Arc<dyn NotesBackend>, client as Arc<dyn AuthBackend>)
            }
            BackendConfig::Offline => {
                tracing::info!("Using offline in-memory backend");
                let memory = Arc::new(MemoryBackend::new());
                memory.seed_user(&config.email, &config.password)?;
                (memory.clone() as Arc<dyn NotesBackend>, memory as Arc<dyn AuthBackend>)
            }
        };

    // --- Notices ---
    let notices = Notices::default();
    let notice_handle = tokio::spawn(log_notices(notices.subscribe()));

    // --- Session ---
    let auth = AuthSession::new(auth_backend, notices.clone(), &config.redirect_url);
    let user = match auth.restore().await {
        Some(user) => user,
        None => auth
            .sign_in(&config.email, &config.password)
            .await
            .context("Sign-in failed")?,
    };
    tracing::info!(user_id = %user.id, email = %user.email, "Session ready");

    // --- Store ---
    let store = NotesStore::with_notices(notes_backend, notices);
    store.fetch_notes(user.id).await;
    store.fetch_tags(user.id).await;
    store.setup_realtime_subscription(user.id).await;

    // --- Export ---
    if let Some(dir) = &config.export_dir {
        let files = store.with_state(|s| export_files(&select_all(&s.notes)));
        write_export(dir, &files)
            .with_context(|| format!("Failed to export notes to {}", dir.display()))?;
    }

    // --- Render loop ---
    let mut changes = store.watch();
    println!("{}", view::render(&changes.borrow_and_update()));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let text = view::render(&changes.borrow_and_update());
                println!("{text}");
            }
        }
    }

    // --- Cleanup ---
    store.cleanup_subscription();
    notice_handle.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Surface store and session notices in the log.
async fn log_notices(mut rx: broadcast::Receiver<keepmd_store::Notice>) {
    loop {
        match rx.recv().await {
            Ok(notice) => match notice.level {
                NoticeLevel::Success => tracing::info!(title = %notice.title, "{}", notice.message),
                NoticeLevel::Error => tracing::warn!(title = %notice.title, "{}", notice.message),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notice listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for Ctrl-C (or SIGTERM on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
