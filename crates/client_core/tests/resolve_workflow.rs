use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::Multipart,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use client_core::{
    routes::{HOME_PATH, SIGN_IN_PATH},
    AuthController, DirectorySink, Endpoints, FileSessionStorage, HttpBackend, RouteDecision,
    RouteGuard, SelectedFile, SessionContext, SubmitOutcome, UploadController, UploadStatus, View,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn sign_in(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["password"] == "secret" {
        (
            StatusCode::OK,
            Json(json!({"success": true, "email": body["email"], "accessToken": "tok-7"})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "Invalid credentials"})),
        )
    }
}

async fn sign_out() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Replaces `${seed}` in the uploaded document, but only for bearer `tok-7`.
async fn resolve(headers: HeaderMap, mut multipart: Multipart) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer tok-7");
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Missing or invalid token"})),
        );
    }

    let mut document = String::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("xmlFile") {
            document = field.text().await.unwrap_or_default();
        }
    }
    (
        StatusCode::OK,
        Json(json!({
            "data": document.replace("${seed}", "resolved-value"),
            "message": "Resolved 1 placeholder."
        })),
    )
}

async fn spawn_backend() -> Endpoints {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/signout", post(sign_out))
        .route("/api/logical-seed-key/resolve", post(resolve));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Endpoints::from_base(&format!("http://{addr}/api"))
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("catalyst_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[tokio::test]
async fn sign_in_resolve_download_and_sign_out() {
    let endpoints = spawn_backend().await;
    let backend = Arc::new(HttpBackend::new(endpoints));
    let root = scratch_dir("workflow");
    let session_file = root.join("session.json");

    let storage = Arc::new(FileSessionStorage::new(&session_file));
    let session = SessionContext::restore(storage).await.expect("restore");
    let guard = RouteGuard::new(session.clone());
    let auth = AuthController::new(backend.clone(), session.clone());
    assert_eq!(guard.decide("/lsk-resolve"), RouteDecision::Redirect(SIGN_IN_PATH));

    let err = auth
        .sign_in("ada@example.com", "wrong")
        .await
        .expect_err("bad password");
    assert_eq!(err.user_message(), "Invalid credentials");
    assert!(!session_file.exists());

    let signed_in = auth
        .sign_in("ada@example.com", "secret")
        .await
        .expect("sign in");
    assert_eq!(signed_in.redirect_to, HOME_PATH);
    assert_eq!(guard.decide(SIGN_IN_PATH), RouteDecision::Redirect(HOME_PATH));
    assert_eq!(guard.decide(HOME_PATH), RouteDecision::Render(View::Home(None)));

    let restored = SessionContext::restore(Arc::new(FileSessionStorage::new(&session_file)))
        .await
        .expect("restore persisted");
    assert_eq!(restored.credential().as_deref(), Some("tok-7"));

    let upload = UploadController::new(backend.clone(), session.clone());
    assert!(upload.select_file(Some(SelectedFile::new(
        "Seed Keys.xml",
        "text/xml",
        b"<config>${seed}</config>".to_vec(),
    ))));
    upload.set_repository_url("https://github.com/acme/config.git");
    upload.set_branch_name("main");
    upload.set_relative_file_path("conf/seed.xml");

    assert_eq!(upload.submit().await, SubmitOutcome::Resolved);
    assert_eq!(
        upload.status(),
        UploadStatus::Success {
            message: "Resolved 1 placeholder.".into(),
            document: "<config>resolved-value</config>".into(),
        }
    );

    let sink = DirectorySink::new(root.join("out"));
    let saved = upload.download(&sink).expect("download");
    assert_eq!(saved, root.join("out").join("Seed_Keys_resolved.xml"));
    assert_eq!(
        std::fs::read_to_string(&saved).expect("read download"),
        "<config>resolved-value</config>"
    );

    let signed_out = auth.sign_out().await;
    assert!(signed_out.acknowledged);
    assert_eq!(signed_out.redirect_to, SIGN_IN_PATH);
    assert_eq!(guard.decide(HOME_PATH), RouteDecision::Redirect(SIGN_IN_PATH));

    let restored = SessionContext::restore(Arc::new(FileSessionStorage::new(&session_file)))
        .await
        .expect("restore after sign-out");
    assert!(!restored.is_authenticated());

    let _ = std::fs::remove_dir_all(root);
}
