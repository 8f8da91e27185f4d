use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::ingest::{parse_csv, RowPolicy};
use crate::leaderboard::{self, SortDirection, SortField, SortOrder};
use crate::models::{AgentPerformanceRecord, FilterState, PeriodType, ALL_ROLES};
use crate::store::{new_record_id, RecordStore};
use crate::sync::SyncController;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub sync: Arc<SyncController>,
}

pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::FetchFailed { .. } | AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.0.to_string();
        if status.is_server_error() {
            error!(target: "perfdash::api", %status, error = %message, "request failed");
        } else {
            warn!(target: "perfdash::api", %status, error = %message, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route(
            "/records",
            get(list_records).post(create_record).delete(reset_records),
        )
        .route("/records/:id", put(update_record).delete(delete_record))
        .route("/sync", post(bulk_sync))
        .route("/sync/status", get(sync_status))
        .route("/sync/source", post(connect_sync).delete(disconnect_sync))
        .route("/sync/run", post(run_sync))
        .route("/import", post(import_csv))
        .route("/leaderboard", get(leaderboard_view))
        .route("/agents/:agent_id", get(agent_detail))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
}

fn into_object(body: Value) -> Result<Map<String, Value>, AppError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::validation("Request body must be a JSON object")),
    }
}

async fn list_records(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AgentPerformanceRecord>>> {
    Ok(Json(state.store.list_all().await?))
}

async fn create_record(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<AgentPerformanceRecord>)> {
    let mut document = into_object(body)?;
    let has_id = document
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    if !has_id {
        document.insert("id".to_string(), Value::String(new_record_id()));
    }

    let record = AgentPerformanceRecord::from_json(Value::Object(document))?;
    let stored = state.store.insert_one(record).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<AgentPerformanceRecord>> {
    let patch = into_object(body)?;
    Ok(Json(state.store.update_one_by_id(&id, patch).await?))
}

async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.store.delete_one_by_id(&id).await?;
    Ok(Json(json!({ "message": "Record deleted" })))
}

async fn reset_records(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let deleted = state.sync.reset().await?;
    info!(target: "perfdash::api", deleted, "records reset");
    Ok(Json(json!({ "message": "All records deleted", "deleted": deleted })))
}

async fn bulk_sync(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Vec<AgentPerformanceRecord>>> {
    let Value::Array(items) = body else {
        return Err(AppError::validation("Input must be an array of records").into());
    };
    let records = items
        .into_iter()
        .map(AgentPerformanceRecord::from_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(state.store.bulk_upsert_by_id(records).await?))
}

async fn import_csv(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Json<Vec<AgentPerformanceRecord>>> {
    let records = parse_csv(&body, RowPolicy::RejectBatch)?;
    info!(target: "perfdash::api", rows = records.len(), "importing uploaded CSV");
    Ok(Json(state.store.bulk_upsert_by_id(records).await?))
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    url: String,
}

async fn sync_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sync.status().await)
}

async fn connect_sync(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> ApiResult<Json<Vec<AgentPerformanceRecord>>> {
    if request.url.trim().is_empty() {
        return Err(AppError::validation("url is required").into());
    }
    Ok(Json(state.sync.connect(&request.url).await?))
}

async fn run_sync(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AgentPerformanceRecord>>> {
    match state.sync.sync_now().await? {
        Some(records) => Ok(Json(records)),
        None => Err(AppError::validation("No sync source connected").into()),
    }
}

async fn disconnect_sync(State(state): State<AppState>) -> impl IntoResponse {
    state.sync.disconnect().await;
    Json(state.sync.status().await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewQuery {
    period_type: Option<PeriodType>,
    period: Option<String>,
    role: Option<String>,
    search: Option<String>,
    sort: Option<SortField>,
    direction: Option<SortDirection>,
}

impl ViewQuery {
    fn filter(&self) -> FilterState {
        FilterState {
            period_type: self.period_type.unwrap_or_default(),
            selected_period: self.period.clone().unwrap_or_default(),
            role: self.role.clone().unwrap_or_else(|| ALL_ROLES.to_string()),
            search_query: self.search.clone().unwrap_or_default(),
        }
    }

    fn order(&self) -> SortOrder {
        SortOrder {
            field: self.sort.unwrap_or_default(),
            direction: self.direction.unwrap_or_default(),
        }
    }
}

async fn leaderboard_view(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<Json<leaderboard::LeaderboardView>> {
    let records = state.store.list_all().await?;
    Ok(Json(leaderboard::build_view(
        &records,
        &query.filter(),
        query.order(),
    )))
}

async fn agent_detail(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<Json<leaderboard::AgentDetail>> {
    let records = state.store.list_all().await?;
    leaderboard::agent_detail(&records, &query.filter(), &agent_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found(agent_id).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{CsvFetcher, SourceResolver};
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use httpmock::prelude::*;
    use tower::ServiceExt;

    fn state() -> AppState {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let sync = Arc::new(SyncController::new(
            store.clone(),
            CsvFetcher::new(SourceResolver::default()),
        ));
        AppState { store, sync }
    }

    fn app() -> Router {
        router(state(), 1024 * 1024)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn record(id: &str, agent_id: &str, chats: u64) -> Value {
        json!({
            "id": id,
            "agentId": agent_id,
            "agentName": format!("Agent {agent_id}"),
            "week": "2025-W45",
            "month": "2025-11",
            "numberOfChats": chats,
            "slPercentage": 97,
            "frtSeconds": 20,
            "artSeconds": 20,
            "ahtMinutes": 5
        })
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let app = app();
        let (status, body) = send(&app, "GET", "/records", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, created) = send(&app, "POST", "/records", Some(record("r1", "A1", 10))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["id"], "r1");

        let (status, updated) =
            send(&app, "PUT", "/records/r1", Some(json!({ "numberOfChats": 25 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["numberOfChats"], 25);

        let (status, body) = send(&app, "DELETE", "/records/r1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Record deleted");

        let (_, body) = send(&app, "GET", "/records", None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn manual_records_get_a_random_id() {
        let app = app();
        let mut body = record("", "A1", 10);
        body.as_object_mut().unwrap().remove("id");

        let (status, created) = send(&app, "POST", "/records", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn missing_required_field_is_bad_request() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/records",
            Some(json!({ "agentId": "A1", "month": "2025-11" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("agentName"));
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_collision() {
        let app = app();
        send(&app, "POST", "/records", Some(record("r1", "A1", 10))).await;
        let (status, body) = send(&app, "POST", "/records", Some(record("r1", "A1", 10))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("collision"));
    }

    #[tokio::test]
    async fn update_or_delete_of_absent_id_is_not_found() {
        let app = app();
        send(&app, "POST", "/records", Some(record("r1", "A1", 10))).await;

        let patch = json!({ "numberOfChats": 1 });
        let (status, _) = send(&app, "PUT", "/records/nope", Some(patch)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", "/records/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, "GET", "/records", None).await;
        assert_eq!(body[0]["numberOfChats"], 10);
    }

    #[tokio::test]
    async fn bulk_sync_upserts_and_returns_full_set() {
        let app = app();
        send(&app, "POST", "/records", Some(record("manual", "Z9", 3))).await;

        let batch = json!([record("A1-2025-W45", "A1", 10), record("B2-2025-W45", "B2", 20)]);
        let (status, body) = send(&app, "POST", "/sync", Some(batch.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);

        let (_, body) = send(&app, "POST", "/sync", Some(batch)).await;
        assert_eq!(body.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn bulk_sync_rejects_non_arrays() {
        let app = app();
        let (status, body) = send(&app, "POST", "/sync", Some(record("r1", "A1", 1))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Input must be an array of records");
    }

    #[tokio::test]
    async fn reset_deletes_everything_and_disconnects_sync() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/agents.csv");
                then.status(200)
                    .body("agentId,agentName,month\nA1,Avery,2025-11\nJ2,Jules,2025-11\n");
            })
            .await;
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/sync/source",
            Some(json!({ "url": server.url("/agents.csv") })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, body) = send(&app, "DELETE", "/records", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 2);

        let (_, records) = send(&app, "GET", "/records", None).await;
        assert_eq!(records, json!([]));
        let (_, sync) = send(&app, "GET", "/sync/status", None).await;
        assert_eq!(sync["url"], Value::Null);
        assert_eq!(sync["state"], "disconnected");
    }

    #[tokio::test]
    async fn reset_is_not_undone_by_a_sync_in_flight() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/agents.csv");
                then.status(200)
                    .body("agentId,agentName,month\nA1,Avery,2025-11\n")
                    .delay(std::time::Duration::from_millis(600));
            })
            .await;
        let state = state();
        let app = router(state.clone(), 1024 * 1024);
        state.sync.connect(&server.url("/agents.csv")).await.unwrap();

        let running = tokio::spawn({
            let sync = state.sync.clone();
            async move { sync.sync_now().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let (status, _) = send(&app, "DELETE", "/records", None).await;
        assert_eq!(status, StatusCode::OK);
        running.await.unwrap().unwrap();

        let (_, records) = send(&app, "GET", "/records", None).await;
        assert_eq!(records, json!([]));
    }

    #[tokio::test]
    async fn failed_remote_fetch_is_bad_gateway() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone.csv");
                then.status(404);
            })
            .await;
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/sync/source",
            Some(json!({ "url": server.url("/gone.csv") })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("404"));

        let (_, sync) = send(&app, "GET", "/sync/status", None).await;
        assert_eq!(sync["url"], server.url("/gone.csv"));
        assert_eq!(sync["lastSyncedAt"], Value::Null);
    }

    #[tokio::test]
    async fn run_without_source_is_rejected() {
        let app = app();
        let (status, _) = send(&app, "POST", "/sync/run", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn csv_upload_rejects_batch_with_invalid_row() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/import")
            .header("content-type", "text/csv")
            .body(Body::from("agentId,agentName,month\nA1,Avery,2025-11\n,Ghost,2025-11\n"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (_, records) = send(&app, "GET", "/records", None).await;
        assert_eq!(records, json!([]));
    }

    #[tokio::test]
    async fn leaderboard_and_agent_detail() {
        let app = app();
        let mut slow = record("B2-2025-W45", "B2", 80);
        slow["ahtMinutes"] = json!(9.0);
        let batch = json!([record("A1-2025-W45", "A1", 10), slow]);
        send(&app, "POST", "/sync", Some(batch)).await;

        let uri = "/leaderboard?periodType=Weekly&period=2025-W45";
        let (status, view) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["rows"][0]["record"]["agentId"], "A1");
        assert_eq!(view["rows"][0]["score"], 100);
        assert_eq!(view["rows"][1]["issues"], json!(["AHT"]));
        assert_eq!(view["periods"]["months"], json!(["2025-11"]));

        let (status, detail) = send(&app, "GET", "/agents/B2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["period"], "2025-11");
        assert_eq!(detail["eligible"], false);

        let (status, _) = send(&app, "GET", "/agents/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
