use std::{
    io::BufRead,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use axum::{extract::Query, extract::State, routing::get, Router};
use client_core::{MessageBus, PopupError, PopupFeatures, PopupHost, PopupWindow, WindowFrame};
use serde::Deserialize;
use shared::protocol::GithubAuthResult;
use tokio::net::TcpListener;
use tracing::{debug, info};

pub const CALLBACK_PATH: &str = "/github/callback";

const TERMINAL_FRAME: WindowFrame = WindowFrame {
    left: 0,
    top: 0,
    width: 1280,
    height: 800,
};

/// Stands in for a browser popup: prints the URL and treats Enter on stdin as
/// the user closing the window.
pub struct TerminalPopupHost;

impl PopupHost for TerminalPopupHost {
    fn parent_frame(&self) -> WindowFrame {
        TERMINAL_FRAME
    }

    fn open(
        &self,
        url: &str,
        name: &str,
        features: &PopupFeatures,
    ) -> Result<Arc<dyn PopupWindow>, PopupError> {
        debug!(name, %features, "opening authorization window");
        println!("Open this URL in a browser to authorize GitHub access:\n  {url}");
        println!("Press Enter to cancel.");

        let closed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&closed);
        std::thread::Builder::new()
            .name("popup-stdin".into())
            .spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().lock().read_line(&mut line);
                flag.store(true, Ordering::SeqCst);
            })
            .map_err(|err| PopupError::Unavailable(err.to_string()))?;

        Ok(Arc::new(TerminalPopup { closed }))
    }
}

struct TerminalPopup {
    closed: Arc<AtomicBool>,
}

impl PopupWindow for TerminalPopup {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn focus(&self) {}
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    status: String,
    message: Option<String>,
}

async fn handle_callback(
    State(bus): State<MessageBus>,
    Query(params): Query<CallbackParams>,
) -> &'static str {
    let message = params.message.filter(|text| !text.is_empty());
    let delivered = bus.post(GithubAuthResult::new(params.status, message).to_value());
    info!(delivered, "github callback received");
    "GitHub authorization finished. You can close this window."
}

pub fn callback_router(bus: MessageBus) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(bus)
}

/// Binds the loopback completion endpoint and serves it in the background.
pub async fn spawn_callback_server(bind: SocketAddr, bus: MessageBus) -> Result<SocketAddr> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind callback listener on {bind}"))?;
    let addr = listener.local_addr()?;
    let app = callback_router(bus);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::warn!(error = %err, "callback server stopped");
        }
    });
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use shared::protocol::GITHUB_AUTH_RESULT_TYPE;

    use super::*;

    #[tokio::test]
    async fn callback_posts_window_message() {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let bus = MessageBus::new();
        let mut received = bus.subscribe();
        let addr = spawn_callback_server("127.0.0.1:0".parse().expect("addr"), bus.clone())
            .await
            .expect("spawn");

        let response = reqwest::get(format!(
            "http://{addr}{CALLBACK_PATH}?status=success&message=Linked%20octocat"
        ))
        .await
        .expect("callback request");
        assert!(response.status().is_success());

        let message = received.recv().await.expect("window message");
        assert_eq!(message["type"], GITHUB_AUTH_RESULT_TYPE);
        let result = GithubAuthResult::from_message(&message).expect("tagged result");
        assert!(result.is_success());
        assert_eq!(result.message.as_deref(), Some("Linked octocat"));
    }

    #[tokio::test]
    async fn callback_without_status_is_rejected() {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let bus = MessageBus::new();
        let _listener = bus.subscribe();
        let addr = spawn_callback_server("127.0.0.1:0".parse().expect("addr"), bus.clone())
            .await
            .expect("spawn");

        let response = reqwest::get(format!("http://{addr}{CALLBACK_PATH}"))
            .await
            .expect("callback request");

        assert!(response.status().is_client_error());
    }
}
