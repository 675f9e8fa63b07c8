mod popup;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings,
    routes::{GITHUB_CONNECT_PATH, HOME_PATH, LOGOUT_PATH, LSK_RESOLVE_PATH},
    AuthController, ClientSettings, DirectorySink, FileSessionStorage, HttpBackend, MessageBus,
    NavigationShell, OAuthController, OAuthStatus, RouteDecision, RouteGuard, SelectedFile,
    SessionContext, SubmitOutcome, UploadController, View,
};
use tracing_subscriber::EnvFilter;

use crate::popup::{spawn_callback_server, TerminalPopupHost};

#[derive(Parser, Debug)]
#[command(name = "catalyst", about = "Catalyst seed key resolver client")]
struct Cli {
    /// Settings file; defaults to ./catalyst.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    SignOut,
    /// Shows where the client would land and who is signed in.
    Status,
    /// Uploads an XML document and saves the resolved copy.
    Resolve {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        repository: String,
        #[arg(long)]
        branch: String,
        /// Path of the document inside the repository; defaults to the file name.
        #[arg(long)]
        path: Option<String>,
        /// Print the resolved document.
        #[arg(long)]
        preview: bool,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    GithubConnect {
        #[arg(long, default_value = "127.0.0.1:8765")]
        callback_bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let settings = load_settings(cli.config)?;

    let storage = Arc::new(FileSessionStorage::new(&settings.session_file));
    let session = SessionContext::restore(storage)
        .await
        .with_context(|| {
            format!(
                "failed to load session from {}",
                settings.session_file.display()
            )
        })?;
    let backend = Arc::new(HttpBackend::new(settings.endpoints()));
    let auth = AuthController::new(backend.clone(), session.clone());
    let guard = RouteGuard::new(session.clone());

    match cli.command {
        Command::SignIn { email, password } => {
            let signed_in = auth
                .sign_in(&email, &password)
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            println!("Signed in as {}", signed_in.identity);
        }
        Command::SignOut => {
            let was_signed_in = session.is_authenticated();
            NavigationShell::new(auth).navigate(LOGOUT_PATH).await;
            if was_signed_in {
                println!("Signed out.");
            } else {
                println!("Not signed in.");
            }
        }
        Command::Status => print_status(&guard, NavigationShell::new(auth)),
        Command::Resolve {
            file,
            repository,
            branch,
            path,
            preview,
            out,
        } => {
            require_section(&guard, LSK_RESOLVE_PATH)?;
            let upload = UploadController::new(backend, session)
                .with_clear_delay(settings.status_clear_delay());
            resolve(&upload, file, repository, branch, path, preview, out).await?;
        }
        Command::GithubConnect { callback_bind } => {
            require_section(&guard, GITHUB_CONNECT_PATH)?;
            github_connect(&settings, callback_bind).await?;
        }
    }

    Ok(())
}

fn require_section(guard: &RouteGuard, path: &str) -> Result<()> {
    match guard.decide(path) {
        RouteDecision::Render(View::Home(Some(_))) => Ok(()),
        _ => bail!("Not signed in. Run `catalyst sign-in` first."),
    }
}

fn print_status(guard: &RouteGuard, shell: NavigationShell) {
    match guard.decide(HOME_PATH) {
        RouteDecision::Render(View::Home(_)) => {
            println!("{}", shell.brand());
            if let Some(identity) = shell.identity_label() {
                println!("{identity}");
            }
            for entry in shell.entries(HOME_PATH) {
                println!("  {:<16} {}", entry.label, entry.path);
            }
            let logout = shell.logout_entry();
            println!("  {:<16} {}", logout.label, logout.path);
        }
        RouteDecision::Render(View::SignIn | View::Logout) | RouteDecision::Redirect(_) => {
            println!("Not signed in.");
        }
    }
}

fn media_type_for(file: &std::path::Path) -> &'static str {
    match file.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("xml") => "text/xml",
        _ => "application/octet-stream",
    }
}

async fn resolve(
    upload: &UploadController,
    file: PathBuf,
    repository: String,
    branch: String,
    path: Option<String>,
    preview: bool,
    out: PathBuf,
) -> Result<()> {
    let content = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    upload.select_file(Some(SelectedFile::new(
        name.clone(),
        media_type_for(&file),
        content,
    )));
    upload.set_repository_url(repository);
    upload.set_branch_name(branch);
    upload.set_relative_file_path(path.unwrap_or(name));

    match upload.submit().await {
        SubmitOutcome::Resolved => {}
        SubmitOutcome::Ignored => bail!("A resolve request is already running."),
        SubmitOutcome::Invalid | SubmitOutcome::Failed => bail!("{}", upload.status().message()),
    }
    println!("{}", upload.status().message());

    if preview && upload.toggle_preview() {
        if let Some(document) = upload.snapshot().resolved_document {
            println!("{document}");
        }
    }

    let sink = DirectorySink::new(out);
    match upload.download(&sink) {
        Some(saved) => println!("Saved {}", saved.display()),
        None => bail!("{}", upload.status().message()),
    }
    Ok(())
}

async fn github_connect(settings: &ClientSettings, callback_bind: SocketAddr) -> Result<()> {
    let bus = MessageBus::new();
    let callback = spawn_callback_server(callback_bind, bus.clone()).await?;
    tracing::info!(%callback, "listening for github callback");

    let oauth = OAuthController::new(
        Arc::new(TerminalPopupHost),
        bus,
        settings.endpoints().github_auth_start,
        settings.popup_poll_interval(),
    );
    let mut events = oauth.subscribe();

    let mut status = oauth.start();
    println!("{}", status.message());
    while let OAuthStatus::Connecting { .. } = status {
        status = events
            .recv()
            .await
            .context("connection status stream closed")?;
    }

    match status {
        OAuthStatus::Error { message } => bail!(message),
        other => println!("{}", other.message()),
    }
    Ok(())
}
