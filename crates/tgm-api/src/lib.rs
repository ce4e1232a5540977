//! HTTP surface (axum) over the group manager.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use tgm_core::{
    domain::{ChatId, MessageId},
    errors::Error,
    export::ExportOptions,
    groups::LeaveOutcome,
    ports::{AutoConfirm, Authenticator, NoProgress},
    transfer::{CopyRequest, ForwardRequest},
    GroupManager, Result,
};

mod error;

pub use error::ApiError;

type ApiResult = std::result::Result<Json<Value>, ApiError>;

/// An HTTP request is the caller's consent; prompts are answered "yes".
const CONSENT: AutoConfirm = AutoConfirm(true);

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<GroupManager>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    async fn require_auth(&self) -> Result<()> {
        if self.auth.is_authorized().await? {
            Ok(())
        } else {
            Err(Error::NotAuthorized)
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login/start", post(login_start))
        .route("/login/status", post(login_status))
        .route("/chats/export", post(chats_export))
        .route("/groups/list", get(groups_list))
        .route("/groups/leave", post(groups_leave))
        .route("/groups/leave-multiple", post(groups_leave_multiple))
        .route("/groups/export-content", post(groups_export_content))
        .route("/conversations/forward", post(conversations_forward))
        .route("/conversations/copy", post(conversations_copy))
        .route("/media/download", post(media_download))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("HTTP API stopped");
    Ok(())
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct LoginStart {
    phone: String,
}

#[derive(Debug, Default, Deserialize)]
struct LoginStatus {
    code: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeaveGroup {
    group_id: i64,
    #[serde(default = "yes")]
    confirm: bool,
}

#[derive(Debug, Deserialize)]
struct LeaveMultiple {
    group_ids: Vec<i64>,
    #[serde(default)]
    confirm_each: bool,
}

#[derive(Debug, Deserialize)]
struct ExportContent {
    group_id: i64,
    #[serde(default = "yes")]
    include_media: bool,
    #[serde(default = "yes")]
    include_messages: bool,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ForwardBody {
    source_chat_id: i64,
    destination_chat_id: i64,
    message_ids: Option<Vec<i32>>,
    limit: Option<usize>,
    filter_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CopyBody {
    source_chat_id: i64,
    destination_chat_id: i64,
    limit: Option<usize>,
    #[serde(default = "yes")]
    copy_media: bool,
}

#[derive(Debug, Deserialize)]
struct MediaDownload {
    chat_ids: Vec<i64>,
    limit: Option<usize>,
}

async fn health() -> Json<Value> {
    tracing::debug!("Health check");
    Json(json!({ "status": "ok" }))
}

async fn login_start(State(state): State<AppState>, Json(req): Json<LoginStart>) -> ApiResult {
    tracing::info!("Login started via API");
    let login = state.auth.start_login(&req.phone).await?;
    Ok(Json(json!({
        "authorized": login.is_authorized(),
        "detail": login.detail(),
    })))
}

async fn login_status(
    State(state): State<AppState>,
    body: Option<Json<LoginStatus>>,
) -> ApiResult {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let login = state
        .auth
        .complete_login(req.code.as_deref(), req.password.as_deref())
        .await?;
    tracing::info!("Login status: authorized={}", login.is_authorized());
    Ok(Json(json!({
        "authorized": login.is_authorized(),
        "detail": login.detail(),
    })))
}

async fn chats_export(State(state): State<AppState>) -> ApiResult {
    state.require_auth().await?;
    let chats = state.manager.export_chat_list().await?;
    Ok(Json(json!({ "count": chats.len(), "chats": chats })))
}

async fn groups_list(State(state): State<AppState>) -> ApiResult {
    state.require_auth().await?;
    let listing = state.manager.list_groups().await?;
    Ok(Json(json!({
        "count": listing.groups.len(),
        "groups": listing.groups,
    })))
}

async fn groups_leave(State(state): State<AppState>, Json(req): Json<LeaveGroup>) -> ApiResult {
    state.require_auth().await?;
    let outcome = state
        .manager
        .leave_group(ChatId(req.group_id), req.confirm, &CONSENT)
        .await?;
    Ok(Json(json!({
        "success": matches!(outcome, LeaveOutcome::Left { .. }),
        "group_id": req.group_id,
    })))
}

async fn groups_leave_multiple(
    State(state): State<AppState>,
    Json(req): Json<LeaveMultiple>,
) -> ApiResult {
    state.require_auth().await?;
    let ids: Vec<ChatId> = req.group_ids.into_iter().map(ChatId).collect();
    let summary = state
        .manager
        .leave_multiple(&ids, req.confirm_each, &CONSENT)
        .await?;
    Ok(Json(json!({
        "successful": summary.successful,
        "failed": summary.failed,
    })))
}

async fn groups_export_content(
    State(state): State<AppState>,
    Json(req): Json<ExportContent>,
) -> ApiResult {
    state.require_auth().await?;
    let opts = ExportOptions {
        group_id: ChatId(req.group_id),
        include_media: req.include_media,
        include_messages: req.include_messages,
        limit: req.limit,
    };
    let stats = state.manager.export_group_content(opts, &NoProgress).await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

async fn conversations_forward(
    State(state): State<AppState>,
    Json(req): Json<ForwardBody>,
) -> ApiResult {
    state.require_auth().await?;
    let forwarded = state
        .manager
        .forward_conversation(ForwardRequest {
            source: ChatId(req.source_chat_id),
            destination: ChatId(req.destination_chat_id),
            message_ids: req
                .message_ids
                .map(|ids| ids.into_iter().map(MessageId).collect()),
            limit: req.limit,
            filter_text: req.filter_text,
        })
        .await?;
    Ok(Json(json!({
        "success": forwarded > 0,
        "messages_forwarded": forwarded,
    })))
}

async fn conversations_copy(State(state): State<AppState>, Json(req): Json<CopyBody>) -> ApiResult {
    state.require_auth().await?;
    let copied = state
        .manager
        .copy_conversation(CopyRequest {
            source: ChatId(req.source_chat_id),
            destination: ChatId(req.destination_chat_id),
            limit: req.limit,
            copy_media: req.copy_media,
        })
        .await?;
    Ok(Json(json!({
        "success": copied > 0,
        "messages_copied": copied,
    })))
}

async fn media_download(
    State(state): State<AppState>,
    Json(req): Json<MediaDownload>,
) -> ApiResult {
    state.require_auth().await?;
    let ids: Vec<ChatId> = req.chat_ids.into_iter().map(ChatId).collect();
    let summary = state
        .manager
        .download_media(&ids, req.limit, &NoProgress)
        .await?;
    Ok(Json(json!({
        "success": summary.success,
        "failed": summary.failed,
    })))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use tgm_core::{
        domain::ChatKind,
        storage::ExportStore,
        testing::{chat, media_message, text_message, FakeAuth, FakeTelegram},
        ManagerOptions,
    };

    struct Harness {
        app: Router,
        fake: Arc<FakeTelegram>,
        _dir: tempfile::TempDir,
    }

    fn harness(auth: FakeAuth) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(
            FakeTelegram::new()
                .with_dialogs(vec![
                    chat(1, "Alice", ChatKind::User),
                    chat(10, "Rustaceans", ChatKind::Supergroup),
                    chat(20, "Family", ChatKind::Group),
                ])
                .with_history(
                    10,
                    (1..=3).map(|i| text_message(i, &format!("m{i}"))).collect(),
                )
                .with_history(20, vec![media_message(1, "", 10), media_message(2, "", 10)]),
        );
        let opts = ManagerOptions {
            leave_delay: Duration::ZERO,
            ..ManagerOptions::default()
        };
        let manager = GroupManager::new(fake.clone(), ExportStore::new(dir.path()), opts);
        let state = AppState {
            manager: Arc::new(manager),
            auth: Arc::new(auth),
        };
        Harness {
            app: router(state),
            fake,
            _dir: dir,
        }
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let req = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let h = harness(FakeAuth::authorized());
        let (status, body) = call(&h.app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn group_endpoints_require_a_session() {
        let h = harness(FakeAuth::logged_out("12345", None));
        for (method, uri, body) in [
            ("GET", "/groups/list", None),
            ("POST", "/chats/export", None),
            ("POST", "/groups/leave", Some(json!({"group_id": 10}))),
            (
                "POST",
                "/conversations/copy",
                Some(json!({"source_chat_id": 10, "destination_chat_id": 20})),
            ),
        ] {
            let (status, body) = call(&h.app, method, uri, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["detail"], "not_authenticated", "{uri}");
        }
        assert!(h.fake.left().is_empty());
    }

    #[tokio::test]
    async fn login_flow_with_two_factor() {
        let h = harness(FakeAuth::logged_out("12345", Some("hunter2")));

        let (_, body) = call(&h.app, "POST", "/login/status", None).await;
        assert_eq!(body, json!({"authorized": false, "detail": "login_not_started"}));

        let (status, body) = call(&h.app, "POST", "/login/start", Some(json!({"phone": "+15550000"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["detail"], "code_required");

        let (_, body) = call(&h.app, "POST", "/login/status", Some(json!({"code": "12345"}))).await;
        assert_eq!(body, json!({"authorized": false, "detail": "2fa_required"}));

        let (status, body) =
            call(&h.app, "POST", "/login/status", Some(json!({"password": "nope"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("password"));

        let (_, body) =
            call(&h.app, "POST", "/login/status", Some(json!({"password": "hunter2"}))).await;
        assert_eq!(body, json!({"authorized": true, "detail": null}));

        let (status, _) = call(&h.app, "GET", "/groups/list", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn lists_groups_and_chats() {
        let h = harness(FakeAuth::authorized());

        let (status, body) = call(&h.app, "GET", "/groups/list", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["groups"][0]["title"], "Rustaceans");
        assert_eq!(body["groups"][0]["type"], "Supergroup");

        let (_, body) = call(&h.app, "POST", "/chats/export", None).await;
        assert_eq!(body["count"], 3);
    }

    #[tokio::test]
    async fn leaves_groups() {
        let h = harness(FakeAuth::authorized());

        let (status, body) = call(
            &h.app,
            "POST",
            "/groups/leave",
            Some(json!({"group_id": 10, "confirm": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "group_id": 10}));

        let (_, body) = call(
            &h.app,
            "POST",
            "/groups/leave-multiple",
            Some(json!({"group_ids": [20, 99], "confirm_each": false})),
        )
        .await;
        assert_eq!(body, json!({"successful": 1, "failed": 1}));
        assert_eq!(h.fake.left(), vec![ChatId(10), ChatId(20)]);
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let h = harness(FakeAuth::authorized());
        let (status, body) = call(
            &h.app,
            "POST",
            "/groups/export-content",
            Some(json!({"group_id": 404})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn exports_group_content() {
        let h = harness(FakeAuth::authorized());
        let (status, body) = call(
            &h.app,
            "POST",
            "/groups/export-content",
            Some(json!({"group_id": 10, "include_media": false, "limit": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["stats"]["group_name"], "Rustaceans");
        assert_eq!(body["stats"]["messages_exported"], 2);
        assert_eq!(body["stats"]["media_downloaded"], 0);
        assert!(body["stats"]["export_directory"]
            .as_str()
            .unwrap()
            .ends_with("Rustaceans_10"));
    }

    #[tokio::test]
    async fn forwards_and_copies() {
        let h = harness(FakeAuth::authorized());

        let (_, body) = call(
            &h.app,
            "POST",
            "/conversations/forward",
            Some(json!({
                "source_chat_id": 10,
                "destination_chat_id": 20,
                "message_ids": [3, 1],
            })),
        )
        .await;
        assert_eq!(body, json!({"success": true, "messages_forwarded": 2}));
        assert_eq!(h.fake.forwarded()[0].2, vec![MessageId(3), MessageId(1)]);

        let (_, body) = call(
            &h.app,
            "POST",
            "/conversations/copy",
            Some(json!({"source_chat_id": 10, "destination_chat_id": 20, "limit": 2})),
        )
        .await;
        assert_eq!(body, json!({"success": true, "messages_copied": 2}));
        let texts: Vec<String> = h.fake.sent_texts().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["m2".to_string(), "m3".to_string()]);
    }

    #[tokio::test]
    async fn out_of_range_ids_are_bad_requests() {
        let h = harness(FakeAuth::authorized());
        let (status, _) = call(
            &h.app,
            "POST",
            "/groups/leave",
            Some(json!({"group_id": i64::MIN})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(h.fake.left().is_empty());
    }

    #[tokio::test]
    async fn downloads_media_of_several_chats() {
        let h = harness(FakeAuth::authorized());
        let (status, body) = call(
            &h.app,
            "POST",
            "/media/download",
            Some(json!({"chat_ids": [20, 10, 404], "limit": 50})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": 1, "failed": 1}));

        let mut names: Vec<String> = h
            .fake
            .downloads()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("Family_20/photos/msg_1_20240101_000100.jpg"));
    }
}
