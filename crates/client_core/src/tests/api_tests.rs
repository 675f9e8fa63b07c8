use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

use super::*;

#[derive(Debug)]
struct CapturedUpload {
    authorization: Option<String>,
    fields: HashMap<String, String>,
    file_name: Option<String>,
    file_type: Option<String>,
}

#[derive(Clone)]
struct ResolverState {
    tx: Arc<Mutex<Option<oneshot::Sender<CapturedUpload>>>>,
}

async fn handle_resolve(
    State(state): State<ResolverState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Json<Value> {
    let mut captured = CapturedUpload {
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        fields: HashMap::new(),
        file_name: None,
        file_type: None,
    };
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == RESOLVE_FIELD_FILE {
            captured.file_name = field.file_name().map(str::to_string);
            captured.file_type = field.content_type().map(str::to_string);
        }
        let text = field.text().await.unwrap_or_default();
        captured.fields.insert(name, text);
    }
    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(captured);
    }
    Json(json!({"data": "<resolved/>", "message": "ok"}))
}

async fn handle_sign_in(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["password"] == "secret" {
        (
            StatusCode::OK,
            Json(json!({"success": true, "email": body["email"], "accessToken": "tok-1"})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid credentials"})),
        )
    }
}

async fn handle_sign_out() -> &'static str {
    "signed out"
}

async fn spawn_backend() -> (Endpoints, oneshot::Receiver<CapturedUpload>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = oneshot::channel();
    let state = ResolverState {
        tx: Arc::new(Mutex::new(Some(tx))),
    };
    let app = Router::new()
        .route("/api/logical-seed-key/resolve", post(handle_resolve))
        .route("/api/auth/signin", post(handle_sign_in))
        .route("/api/auth/signout", post(handle_sign_out))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (Endpoints::from_base(&format!("http://{addr}/api")), rx)
}

fn sample_request() -> ResolveRequest {
    ResolveRequest {
        file_name: "seed.xml".into(),
        media_type: "text/xml".into(),
        content: b"<root>${seed}</root>".to_vec(),
        repository_url: "https://github.com/acme/config.git".into(),
        branch_name: "main".into(),
        relative_file_path: "conf/seed.xml".into(),
    }
}

#[tokio::test]
async fn resolve_sends_multipart_fields_with_bearer_credential() {
    let (endpoints, captured_rx) = spawn_backend().await;
    let backend = HttpBackend::new(endpoints);

    let reply = backend
        .resolve(Some("tok-1"), sample_request())
        .await
        .expect("resolve");
    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.body,
        Some(json!({"data": "<resolved/>", "message": "ok"}))
    );

    let captured = captured_rx.await.expect("captured upload");
    assert_eq!(captured.authorization.as_deref(), Some("Bearer tok-1"));
    assert_eq!(captured.file_name.as_deref(), Some("seed.xml"));
    assert_eq!(captured.file_type.as_deref(), Some("text/xml"));
    assert_eq!(captured.fields[RESOLVE_FIELD_FILE], "<root>${seed}</root>");
    assert_eq!(captured.fields[RESOLVE_FIELD_BRANCH], "main");
    assert_eq!(
        captured.fields[RESOLVE_FIELD_REPOSITORY],
        "https://github.com/acme/config.git"
    );
    assert_eq!(captured.fields[RESOLVE_FIELD_RELATIVE_PATH], "conf/seed.xml");
}

#[tokio::test]
async fn resolve_falls_back_to_xml_type_for_missing_or_bad_declared_type() {
    for declared in ["", "   ", "not a media type"] {
        let (endpoints, captured_rx) = spawn_backend().await;
        let backend = HttpBackend::new(endpoints);
        let mut request = sample_request();
        request.media_type = declared.to_string();

        let reply = backend
            .resolve(Some("tok-1"), request)
            .await
            .expect("resolve with fallback type");
        assert_eq!(reply.status, 200, "{declared:?}");

        let captured = captured_rx.await.expect("captured upload");
        assert_eq!(captured.file_type.as_deref(), Some(DEFAULT_XML_MEDIA_TYPE));
        assert_eq!(captured.file_name.as_deref(), Some("seed.xml"));
    }
}

#[tokio::test]
async fn sign_in_reports_status_and_json_body() {
    let (endpoints, _rx) = spawn_backend().await;
    let backend = HttpBackend::new(endpoints);

    let ok = backend
        .sign_in(&SignInRequest {
            email: "dev@example.com".into(),
            password: "secret".into(),
        })
        .await
        .expect("sign in");
    assert!(ok.is_success());
    assert_eq!(ok.body.as_ref().expect("body")["accessToken"], "tok-1");

    let rejected = backend
        .sign_in(&SignInRequest {
            email: "dev@example.com".into(),
            password: "wrong".into(),
        })
        .await
        .expect("sign in");
    assert_eq!(rejected.status, 401);
    assert_eq!(
        rejected.body.as_ref().expect("body")["message"],
        "Invalid credentials"
    );
}

#[tokio::test]
async fn non_json_body_is_dropped() {
    let (endpoints, _rx) = spawn_backend().await;
    let backend = HttpBackend::new(endpoints);

    let reply = backend.sign_out(Some("tok-1")).await.expect("sign out");
    assert_eq!(reply, ApiReply::new(200, None));
}

#[tokio::test]
async fn unreachable_backend_is_a_no_response_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let backend = HttpBackend::new(Endpoints::from_base(&format!("http://{addr}/api")));
    let err = backend
        .resolve(Some("tok-1"), sample_request())
        .await
        .expect_err("connection refused");
    assert!(matches!(err, TransportError::NoResponse(_)));
}
