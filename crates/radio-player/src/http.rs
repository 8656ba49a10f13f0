use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{delete, get, post, put},
    Router,
};
use futures_util::stream::{self, Stream};
use radio_core::core::PlayerClient;
use radio_core::error::{CatalogError, CoreError};
use radio_core::protocol::{Command, PlayerSnapshot, Reply};
use radio_core::sleep_timer::{MAX_MINUTES, PRESET_MINUTES};
use radio_core::station::{NewStation, StationRecord};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
struct HttpState {
    client: PlayerClient,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

/// Command failures rendered as `{ "error": ... }` with a fitting status.
struct ApiFailure(CoreError);

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::UnknownStation(_) | CoreError::Catalog(CatalogError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            CoreError::Catalog(CatalogError::Duplicate(_)) => StatusCode::CONFLICT,
            CoreError::Catalog(CatalogError::Invalid(_))
            | CoreError::Catalog(CatalogError::NoValidStations)
            | CoreError::Timer(_) => StatusCode::BAD_REQUEST,
            CoreError::Catalog(CatalogError::DefaultsUnavailable(_))
            | CoreError::Catalog(CatalogError::DefaultsEmpty) => StatusCode::BAD_GATEWAY,
            CoreError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ApiError {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiFailure>;

#[derive(Deserialize)]
struct ResetParams {
    #[serde(default)]
    keep_custom: bool,
}

pub fn router(client: PlayerClient) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/stations", get(list_stations).post(add_station))
        .route("/api/stations/:id", put(edit_station).delete(delete_station))
        .route("/api/play/:id", post(play_station))
        .route("/api/pause", post(pause))
        .route("/api/toggle", post(toggle))
        .route("/api/next", post(next_station))
        .route("/api/prev", post(prev_station))
        .route("/api/volume/:volume", post(set_volume))
        .route("/api/import", post(import))
        .route("/api/export", get(export))
        .route("/api/reset", post(reset))
        .route("/api/sleep/presets", get(sleep_presets))
        .route("/api/sleep/:minutes", post(arm_sleep))
        .route("/api/sleep", delete(cancel_sleep))
        .route("/api/error", delete(dismiss_error))
        .route("/api/events", get(events))
        .layer(CorsLayer::permissive())
        .with_state(HttpState { client })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    client: PlayerClient,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(client);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn run(state: &HttpState, cmd: Command) -> ApiResult<Reply> {
    state.client.request(cmd).await.map_err(ApiFailure)
}

async fn get_state(State(state): State<HttpState>) -> Json<PlayerSnapshot> {
    Json(state.client.snapshot())
}

async fn list_stations(State(state): State<HttpState>) -> Json<Vec<StationRecord>> {
    Json(state.client.snapshot().stations)
}

async fn add_station(
    State(state): State<HttpState>,
    Json(station): Json<NewStation>,
) -> ApiResult<Response> {
    info!("HTTP API: add station {}", station.display_name);
    let reply = run(&state, Command::AddStation { station }).await?;
    Ok((StatusCode::CREATED, Json(reply)).into_response())
}

async fn edit_station(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(station): Json<NewStation>,
) -> ApiResult<Json<Reply>> {
    info!("HTTP API: edit station {}", id);
    run(&state, Command::EditStation { id, station }).await.map(Json)
}

async fn delete_station(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    info!("HTTP API: delete station {}", id);
    match run(&state, Command::DeleteStation { id }).await? {
        Reply::Deleted { removed: false } => Ok(StatusCode::NOT_FOUND),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}

async fn play_station(State(state): State<HttpState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    info!("HTTP API: play station {}", id);
    run(&state, Command::Play { station_id: id }).await?;
    Ok(StatusCode::OK)
}

async fn pause(State(state): State<HttpState>) -> ApiResult<StatusCode> {
    run(&state, Command::Pause).await?;
    Ok(StatusCode::OK)
}

async fn toggle(State(state): State<HttpState>) -> ApiResult<StatusCode> {
    run(&state, Command::TogglePause).await?;
    Ok(StatusCode::OK)
}

async fn next_station(State(state): State<HttpState>) -> ApiResult<StatusCode> {
    info!("HTTP API: next station");
    run(&state, Command::Next).await?;
    Ok(StatusCode::OK)
}

async fn prev_station(State(state): State<HttpState>) -> ApiResult<StatusCode> {
    info!("HTTP API: previous station");
    run(&state, Command::Prev).await?;
    Ok(StatusCode::OK)
}

/// Volume in percent, 0..=100.
async fn set_volume(
    State(state): State<HttpState>,
    Path(volume): Path<i32>,
) -> ApiResult<Json<Reply>> {
    info!("HTTP API: set volume to {}%", volume);
    let cmd = Command::Volume {
        value: volume as f32 / 100.0,
    };
    run(&state, cmd).await.map(Json)
}

/// Body is the raw station list text.
async fn import(State(state): State<HttpState>, body: String) -> ApiResult<Json<Reply>> {
    info!("HTTP API: import ({} bytes)", body.len());
    run(&state, Command::Import { text: body }).await.map(Json)
}

async fn export(State(state): State<HttpState>) -> ApiResult<Response> {
    match run(&state, Command::Export).await? {
        Reply::Exported { filename, text } => {
            let disposition = format!("attachment; filename=\"{}\"", filename);
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                text,
            )
                .into_response())
        }
        other => Ok(Json(other).into_response()),
    }
}

async fn reset(
    State(state): State<HttpState>,
    Query(params): Query<ResetParams>,
) -> ApiResult<Json<Reply>> {
    info!("HTTP API: reset (keep_custom={})", params.keep_custom);
    let cmd = Command::Reset {
        keep_custom: params.keep_custom,
    };
    run(&state, cmd).await.map(Json)
}

async fn arm_sleep(State(state): State<HttpState>, Path(minutes): Path<u32>) -> ApiResult<StatusCode> {
    info!("HTTP API: sleep timer {} min", minutes);
    run(&state, Command::ArmSleepTimer { minutes }).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize, PartialEq)]
struct SleepPresets {
    presets: Vec<u32>,
    max_minutes: u32,
}

/// Durations the UI offers, plus the upper bound `arm` accepts.
async fn sleep_presets() -> Json<SleepPresets> {
    Json(SleepPresets {
        presets: PRESET_MINUTES.to_vec(),
        max_minutes: MAX_MINUTES,
    })
}

async fn cancel_sleep(State(state): State<HttpState>) -> ApiResult<StatusCode> {
    run(&state, Command::CancelSleepTimer).await?;
    Ok(StatusCode::OK)
}

async fn dismiss_error(State(state): State<HttpState>) -> ApiResult<StatusCode> {
    run(&state, Command::DismissError).await?;
    Ok(StatusCode::OK)
}

/// Server-sent events: `state` on every snapshot change, `notice` for
/// transient messages.
async fn events(
    State(state): State<HttpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let snapshots = state.client.watch();
    let notices = state.client.notices();

    let stream = stream::unfold((snapshots, notices), |(mut snapshots, mut notices)| async move {
        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    if let Some(evt) = json_event("state", &snapshot) {
                        return Some((Ok(evt), (snapshots, notices)));
                    }
                }
                notice = notices.recv() => match notice {
                    Ok(notice) => {
                        if let Some(evt) = json_event("notice", &notice) {
                            return Some((Ok(evt), (snapshots, notices)));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("HTTP API: event stream lagged by {} notices", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn json_event<T: Serialize>(name: &str, value: &T) -> Option<Event> {
    match Event::default().event(name).json_data(value) {
        Ok(evt) => Some(evt),
        Err(e) => {
            warn!("HTTP API: could not encode {} event: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_core::error::TimerError;

    fn status_of(err: CoreError) -> StatusCode {
        ApiFailure(err).into_response().status()
    }

    #[test]
    fn maps_core_errors_to_statuses() {
        assert_eq!(
            status_of(CoreError::UnknownStation("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CatalogError::NotFound("x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CatalogError::Duplicate("http://a".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CatalogError::NoValidStations.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(TimerError::OutOfRange { got: 0, max: 480 }.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(CoreError::Closed), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn sleep_presets_lists_durations_and_bound() {
        let Json(body) = sleep_presets().await;
        assert_eq!(body.presets, vec![15, 30, 45, 60]);
        assert_eq!(body.max_minutes, 480);
        assert!(body.presets.iter().all(|m| *m <= body.max_minutes));
    }

    #[test]
    fn reset_defaults_to_dropping_custom_stations() {
        let params: ResetParams = serde_json::from_str("{}").unwrap();
        assert!(!params.keep_custom);
    }
}
