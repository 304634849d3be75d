//! HTTP and WebSocket handlers for the Parlor server.
//!
//! This module wires the hub to HTTP: room administration, the WebSocket
//! endpoint, and thin proxies to the presence and auth collaborators.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, ws::WebSocket, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parlor_core::{
    run_session, telemetry, AuthService, CollaboratorError, Hub, HubError, Identity, LocalPresence,
    PresenceNotifier, PresenceService, RoomSpec, RoomSummary, SessionContext, StaticAuth,
};
use parlor_protocol::{ErrorFrame, MAX_USERNAME_LENGTH};
use parlor_transport::websocket;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The room hub.
    pub hub: Hub,
    /// Presence service, if presence is enabled.
    pub presence: Option<Arc<dyn PresenceService>>,
    /// Authentication service.
    pub auth: Arc<dyn AuthService>,
    /// Server configuration.
    pub config: Config,
    session: SessionContext,
}

impl AppState {
    /// Create new app state and start the hub.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let hub = Hub::start(config.hub_config());

        let presence: Option<Arc<dyn PresenceService>> = config
            .presence
            .enabled
            .then(|| Arc::new(LocalPresence::new()) as Arc<dyn PresenceService>);
        let notifier = match &presence {
            Some(service) => PresenceNotifier::new(
                service.clone(),
                Duration::from_millis(config.presence.rpc_timeout_ms),
            ),
            None => PresenceNotifier::disabled(),
        };

        let auth: Arc<dyn AuthService> = if config.auth.enabled {
            Arc::new(StaticAuth::new(
                config.auth.users.clone(),
                config.auth.tokens.iter().cloned(),
            ))
        } else {
            Arc::new(StaticAuth::open(config.auth.users.clone()))
        };

        let session = SessionContext::new(hub.clone(), config.session_config()).with_presence(notifier);

        Self {
            hub,
            presence,
            auth,
            config,
            session,
        }
    }

    /// Check the bearer token of a request when auth is enabled.
    async fn authorize(&self, headers: &HeaderMap, query_token: Option<&str>) -> Result<(), ApiError> {
        if !self.config.auth.enabled {
            return Ok(());
        }
        let token = bearer_token(headers)
            .or(query_token)
            .ok_or(ApiError::Unauthorized)?;

        match self.auth.validate_token(token).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ApiError::Unauthorized),
            Err(e) => Err(collaborator_failure("auth", e)),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn collaborator_failure(service: &'static str, e: CollaboratorError) -> ApiError {
    warn!(service, error = %e, "Collaborator call failed");
    telemetry::record_collaborator_error(service);
    ApiError::Unavailable(format!("{service} service unavailable"))
}

/// Errors returned by HTTP handlers as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was malformed or failed validation.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid bearer token.
    #[error("Unauthorized")]
    Unauthorized,

    /// Login with unknown user or wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// A dependency could not serve the request.
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::Validation(_) => ApiError::BadRequest(e.to_string()),
            HubError::TooManyRooms | HubError::Closed => ApiError::Unavailable(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        debug!(error = %e, "Rejected request body");
        ApiError::BadRequest("Invalid request".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorFrame::new(self.to_string()))).into_response()
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/api/presence", get(get_presence))
        .route("/api/authenticate", get(authenticate))
        .route("/api/login", post(login))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve `state` on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));
    let listener = TcpListener::bind(addr).await?;

    info!("Parlor server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    serve(listener, state).await
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Query parameters of the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    username: Option<String>,
    user_id: Option<String>,
    token: Option<String>,
}

impl ConnectParams {
    fn identity(self) -> Result<Identity, ApiError> {
        let username = self
            .username
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::BadRequest("username is required".to_string()))?;
        if username.len() > MAX_USERNAME_LENGTH {
            return Err(ApiError::BadRequest("username is too long".to_string()));
        }
        let user_id = self.user_id.unwrap_or_else(|| username.clone());
        Ok(Identity::new(user_id, username))
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.authorize(&headers, params.token.as_deref()).await?;
    let identity = params.identity()?;

    let max_message_size = state.config.limits.max_message_size;
    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, identity)))
}

/// Handle an upgraded WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    debug!(user = %identity.username, "WebSocket connected");

    let (reader, writer) = websocket::split(socket, state.config.limits.max_message_size);
    if let Err(e) = run_session(reader, writer, identity, state.session.clone()).await {
        debug!(error = %e, "WebSocket closed before joining");
    }
}

/// List rooms.
async fn list_rooms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomSummary>>, ApiError> {
    state.authorize(&headers, None).await?;
    Ok(Json(state.hub.list_rooms()))
}

/// Query parameters of room creation.
#[derive(Debug, Default, Deserialize)]
pub struct CreateRoomParams {
    username: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatedRoom {
    id: String,
    name: String,
}

/// Create a room.
async fn create_room(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CreateRoomParams>,
    headers: HeaderMap,
    body: Result<Json<RoomSpec>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&headers, None).await?;
    let Json(spec) = body?;
    let owner = params.username.unwrap_or_else(|| "anonymous".to_string());

    let summary = state.hub.create_room(spec, &owner)?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedRoom {
            id: summary.id,
            name: summary.name,
        }),
    ))
}

/// Query parameters of the presence lookup.
#[derive(Debug, Default, Deserialize)]
pub struct PresenceParams {
    #[serde(default)]
    user_ids: String,
}

/// Look up presence as `{user_id: online}`.
async fn get_presence(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PresenceParams>,
    headers: HeaderMap,
) -> Result<Json<BTreeMap<String, bool>>, ApiError> {
    state.authorize(&headers, None).await?;
    let Some(presence) = &state.presence else {
        return Err(ApiError::Unavailable("presence is disabled".to_string()));
    };

    let user_ids: Vec<String> = params
        .user_ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    let presences = presence
        .get_presence(&user_ids)
        .await
        .map_err(|e| collaborator_failure("presence", e))?;

    Ok(Json(
        presences
            .into_iter()
            .map(|p| (p.user_id, p.online))
            .collect(),
    ))
}

/// Validate the bearer token of the request.
async fn authenticate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    match state.auth.validate_token(token).await {
        Ok(true) => Ok(Json(serde_json::json!({ "valid": true }))),
        Ok(false) => Err(ApiError::Unauthorized),
        Err(e) => Err(collaborator_failure("auth", e)),
    }
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

/// Check a username/password pair.
async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = body?;
    match state
        .auth
        .authenticate_user(&request.username, &request.password)
        .await
    {
        Ok(true) => {
            debug!(user = %request.username, "Login succeeded");
            Ok(Json(serde_json::json!({ "success": true })))
        }
        Ok(false) => Err(ApiError::InvalidCredentials),
        Err(e) => Err(collaborator_failure("auth", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{HeaderValue, Request};
    use parlor_core::SessionId;

    fn state_with(config: Config) -> Arc<AppState> {
        Arc::new(AppState::new(config))
    }

    fn secured() -> Config {
        let mut config = Config::default();
        config.auth.enabled = true;
        config.auth.tokens = vec!["t-1".to_string()];
        config
            .auth
            .users
            .insert("alice".to_string(), "secret".to_string());
        config
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {token}")).unwrap();
        headers.insert(header::AUTHORIZATION, value);
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&bearer("abc")), Some("abc"));
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&basic), None);
    }

    #[test]
    fn test_connect_params_identity() {
        let params = ConnectParams {
            username: Some(" alice ".to_string()),
            ..Default::default()
        };
        let identity = params.identity().unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.user_id, "alice");

        assert!(ConnectParams::default().identity().is_err());

        let long = ConnectParams {
            username: Some("x".repeat(MAX_USERNAME_LENGTH + 1)),
            ..Default::default()
        };
        assert!(matches!(long.identity(), Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_and_list_rooms() {
        let state = state_with(Config::default());

        let response = create_room(
            State(state.clone()),
            Query(CreateRoomParams {
                username: Some("alice".to_string()),
            }),
            HeaderMap::new(),
            Ok(Json(RoomSpec::new("lobby", 2))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let Json(rooms) = list_rooms(State(state), HeaderMap::new()).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "lobby");
        assert_eq!(rooms[0].owner, "alice");
    }

    #[tokio::test]
    async fn test_create_room_rejects_invalid() {
        let state = state_with(Config::default());
        let response = create_room(
            State(state.clone()),
            Query(CreateRoomParams::default()),
            HeaderMap::new(),
            Ok(Json(RoomSpec::new("lobby", 1))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.hub.list_rooms().is_empty());
    }

    async fn json_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<Json<T>, JsonRejection> {
        let request = Request::builder()
            .method("POST")
            .uri("/rooms")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        Json::from_request(request, &()).await
    }

    #[tokio::test]
    async fn test_create_room_rejects_malformed_body() {
        let state = state_with(Config::default());

        for body in [
            r#"{"name":"a","max_members":"lots"}"#,
            r#"{"max_members":2}"#,
            r#"{"name":"a","max_members":-1}"#,
            "not json",
        ] {
            let err = create_room(
                State(state.clone()),
                Query(CreateRoomParams::default()),
                HeaderMap::new(),
                json_body(body).await,
            )
            .await
            .err()
            .unwrap();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{body}");

            let response = err.into_response();
            let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
            let error: ErrorFrame = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(error, ErrorFrame::new("Invalid request"));
        }
        assert!(state.hub.list_rooms().is_empty());

        let response = create_room(
            State(state.clone()),
            Query(CreateRoomParams::default()),
            HeaderMap::new(),
            json_body(r#"{"name":"lobby","max_members":"3"}"#).await,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_login_rejects_malformed_body() {
        let state = state_with(secured());
        let err = login(State(state), json_body(r#"{"username":"alice"}"#).await)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_guarded_routes() {
        let state = state_with(secured());

        let err = list_rooms(State(state.clone()), HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(list_rooms(State(state.clone()), bearer("wrong")).await.is_err());
        assert!(list_rooms(State(state), bearer("t-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_and_login() {
        let state = state_with(secured());

        assert!(authenticate(State(state.clone()), bearer("t-1")).await.is_ok());
        assert!(authenticate(State(state.clone()), bearer("nope")).await.is_err());

        let ok = login(
            State(state.clone()),
            Ok(Json(LoginRequest {
                username: "alice".to_string(),
                password: "secret".to_string(),
            })),
        )
        .await;
        assert!(ok.is_ok());

        let err = login(
            State(state),
            Ok(Json(LoginRequest {
                username: "alice".to_string(),
                password: "wrong".to_string(),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_presence_lookup() {
        let state = state_with(Config::default());
        let presence = state.presence.clone().unwrap();
        presence
            .update_presence("u1", true, &SessionId::generate())
            .await
            .unwrap();

        let Json(result) = get_presence(
            State(state),
            Query(PresenceParams {
                user_ids: "u1, u2,".to_string(),
            }),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(result.get("u1"), Some(&true));
        assert_eq!(result.get("u2"), Some(&false));
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_presence_disabled() {
        let mut config = Config::default();
        config.presence.enabled = false;
        let state = state_with(config);

        let err = get_presence(State(state), Query(PresenceParams::default()), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
