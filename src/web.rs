use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::Config;
use crate::game::{BOARD_SIZE, GameError, GameState, MoveOutcome, Player, Position, Selection};

#[derive(Clone)]
pub struct AppState {
    game: Arc<Mutex<GameState>>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            game: Arc::new(Mutex::new(GameState::new())),
        }
    }

    // Every engine call completes while the guard is held, so a poisoned
    // lock still guards a consistent state.
    fn lock(&self) -> MutexGuard<'_, GameState> {
        self.game.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize)]
pub struct MoveRequest {
    from_row: usize,
    from_col: usize,
    to_row: usize,
    to_col: usize,
}

#[derive(Serialize, Deserialize)]
pub struct SelectRequest {
    row: usize,
    col: usize,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellResponse {
    row: usize,
    col: usize,
}

impl From<Position> for CellResponse {
    fn from(pos: Position) -> Self {
        CellResponse {
            row: pos.row,
            col: pos.col,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GameResponse {
    board: Vec<Vec<String>>,
    current_player: String,
    selected: Option<CellResponse>,
    targets: Vec<CellResponse>,
    can_undo: bool,
    history_len: usize,
    winner: Option<String>,
    message: String,
}

impl GameResponse {
    fn from_state(state: &GameState, winner: Option<Player>, message: String) -> Self {
        let board = state
            .board()
            .rows()
            .iter()
            .map(|row| row.iter().map(|cell| cell.symbol().to_string()).collect())
            .collect();

        let targets = state
            .selected()
            .map(|from| {
                state
                    .legal_moves_from(from)
                    .into_iter()
                    .map(|mv| mv.to.into())
                    .collect()
            })
            .unwrap_or_default();

        GameResponse {
            board,
            current_player: state.current_player().to_string(),
            selected: state.selected().map(Into::into),
            targets,
            can_undo: state.can_undo(),
            history_len: state.history().len(),
            winner: winner.map(|p| p.to_string()),
            message,
        }
    }
}

/// Engine rejections surfaced to the client
#[derive(Debug)]
pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            GameError::IllegalMove(_) | GameError::NotYourPiece(_) => StatusCode::BAD_REQUEST,
            GameError::EmptyHistory => StatusCode::CONFLICT,
        };
        (
            status,
            Json(serde_json::json!({
                "error": self.0.to_string()
            })),
        )
            .into_response()
    }
}

fn cell(row: usize, col: usize) -> Position {
    Position::new(row, col)
}

fn respond_to_move(
    game: &GameState,
    result: Result<MoveOutcome, GameError>,
) -> Result<Json<GameResponse>, ApiError> {
    let response = match result? {
        MoveOutcome::Moved {
            record,
            next_player,
        } => {
            let verb = if record.is_capture() {
                "captures on"
            } else {
                "to"
            };
            GameResponse::from_state(
                game,
                None,
                format!(
                    "{} {} {}. {} to move",
                    record.from,
                    verb,
                    record.to,
                    next_player
                ),
            )
        }
        MoveOutcome::GameOver { winner, .. } => {
            GameResponse::from_state(game, Some(winner), format!("{} wins!", winner))
        }
    };
    Ok(Json(response))
}

#[instrument(skip(app_state))]
async fn get_game_state(State(app_state): State<AppState>) -> Json<GameResponse> {
    let game = app_state.lock();
    Json(GameResponse::from_state(&game, None, String::new()))
}

/// Raw engine state, serialized as-is
#[instrument(skip(app_state))]
async fn get_snapshot(State(app_state): State<AppState>) -> Json<GameState> {
    let game = app_state.lock();
    Json(game.clone())
}

#[instrument(skip_all, fields(
    from_row = req.from_row,
    from_col = req.from_col,
    to_row = req.to_row,
    to_col = req.to_col
))]
async fn make_move(
    State(app_state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<GameResponse>, ApiError> {
    let mut game = app_state.lock();
    let from = cell(req.from_row, req.from_col);
    let to = cell(req.to_row, req.to_col);
    let result = game.attempt_move(from, to);
    respond_to_move(&game, result)
}

#[instrument(skip_all, fields(row = req.row, col = req.col))]
async fn select_cell(
    State(app_state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<GameResponse>, ApiError> {
    let mut game = app_state.lock();
    match game.select(cell(req.row, req.col)) {
        Selection::Selected(pos) => Ok(Json(GameResponse::from_state(
            &game,
            None,
            format!("Selected {}", pos),
        ))),
        Selection::Ignored => Ok(Json(GameResponse::from_state(
            &game,
            None,
            format!("Select one of {}'s pieces", game.current_player()),
        ))),
        Selection::Attempted(result) => respond_to_move(&game, result),
    }
}

#[instrument(skip(app_state))]
async fn undo(State(app_state): State<AppState>) -> Result<Json<GameResponse>, ApiError> {
    let mut game = app_state.lock();
    let record = game.try_undo_last()?;
    Ok(Json(GameResponse::from_state(
        &game,
        None,
        format!("Took back {} -> {}", record.from, record.to),
    )))
}

#[instrument(skip(app_state))]
async fn reset(State(app_state): State<AppState>) -> Json<GameResponse> {
    let mut game = app_state.lock();
    game.reset_game();
    Json(GameResponse::from_state(
        &game,
        None,
        "New game. White to move".to_string(),
    ))
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/game-state", get(get_game_state))
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/move", post(make_move))
        .route("/api/select", post(select_cell))
        .route("/api/undo", post(undo))
        .route("/api/reset", post(reset))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new());

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!(addr = %listener.local_addr()?, board_size = BOARD_SIZE, "server listening");
    println!("Web server running at http://{}", config.addr());

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(
        app_state: &AppState,
        method: &str,
        uri: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router(app_state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get_state(app_state: &AppState) -> Value {
        let request = Request::builder()
            .uri("/api/game-state")
            .body(Body::empty())
            .unwrap();
        let response = router(app_state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn mv(from_row: usize, from_col: usize, to_row: usize, to_col: usize) -> Value {
        serde_json::json!({
            "from_row": from_row,
            "from_col": from_col,
            "to_row": to_row,
            "to_col": to_col,
        })
    }

    #[tokio::test]
    async fn test_initial_state() {
        let app_state = AppState::new();
        let body = get_state(&app_state).await;

        assert_eq!(body["current_player"], "White");
        assert_eq!(body["can_undo"], false);
        assert_eq!(body["board"][0][0], "B");
        assert_eq!(body["board"][7][7], "W");
        assert_eq!(body["board"][4][4], ".");
        assert!(body["selected"].is_null());
    }

    #[tokio::test]
    async fn test_move_then_undo() {
        let app_state = AppState::new();

        let (status, body) = send(&app_state, "POST", "/api/move", mv(6, 0, 5, 0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_player"], "Black");
        assert_eq!(body["board"][5][0], "W");
        assert_eq!(body["board"][6][0], ".");
        assert_eq!(body["can_undo"], true);

        let (status, body) = send(&app_state, "POST", "/api/undo", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_player"], "White");
        assert_eq!(body["board"][6][0], "W");
        assert_eq!(body["history_len"], 0);
    }

    #[tokio::test]
    async fn test_illegal_move_rejected() {
        let app_state = AppState::new();

        let (status, body) = send(&app_state, "POST", "/api/move", mv(6, 0, 4, 0)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("too far"));

        let (status, _) = send(&app_state, "POST", "/api/move", mv(1, 0, 2, 0)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = get_state(&app_state).await;
        assert_eq!(body["current_player"], "White");
        assert_eq!(body["history_len"], 0);
    }

    #[tokio::test]
    async fn test_undo_with_empty_history() {
        let app_state = AppState::new();
        let (status, body) = send(&app_state, "POST", "/api/undo", Value::Null).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Nothing to undo");
    }

    #[tokio::test]
    async fn test_select_flow() {
        let app_state = AppState::new();

        let (status, body) = send(
            &app_state,
            "POST",
            "/api/select",
            serde_json::json!({ "row": 6, "col": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["selected"], serde_json::json!({ "row": 6, "col": 0 }));
        assert_eq!(body["targets"].as_array().unwrap().len(), 2);

        let (status, body) = send(
            &app_state,
            "POST",
            "/api/select",
            serde_json::json!({ "row": 5, "col": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["selected"].is_null());
        assert_eq!(body["board"][5][1], "W");
        assert_eq!(body["current_player"], "Black");
    }

    #[tokio::test]
    async fn test_select_ignores_opponent_piece() {
        let app_state = AppState::new();
        let (status, body) = send(
            &app_state,
            "POST",
            "/api/select",
            serde_json::json!({ "row": 0, "col": 0 }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["selected"].is_null());
        assert_eq!(body["message"], "Select one of White's pieces");
    }

    #[tokio::test]
    async fn test_failed_second_click_rejected_and_deselected() {
        let app_state = AppState::new();
        let select = |row: usize, col: usize| serde_json::json!({ "row": row, "col": col });

        let (status, _) = send(&app_state, "POST", "/api/select", select(6, 4)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app_state, "POST", "/api/select", select(4, 4)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("too far"));

        let body = get_state(&app_state).await;
        assert!(body["selected"].is_null());
        assert_eq!(body["current_player"], "White");
        assert_eq!(body["history_len"], 0);
        assert_eq!(body["board"][6][4], "W");
    }

    #[tokio::test]
    async fn test_snapshot_matches_engine_state() {
        let app_state = AppState::new();
        send(&app_state, "POST", "/api/move", mv(6, 2, 5, 3)).await;
        send(
            &app_state,
            "POST",
            "/api/select",
            serde_json::json!({ "row": 1, "col": 5 }),
        )
        .await;

        let request = Request::builder()
            .uri("/api/snapshot")
            .body(Body::empty())
            .unwrap();
        let response = router(app_state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let snapshot: GameState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snapshot, *app_state.lock());
        assert_eq!(snapshot.current_player(), Player::Black);
        assert_eq!(snapshot.selected(), Some(cell(1, 5)));
        assert_eq!(snapshot.history().len(), 1);
    }

    #[tokio::test]
    async fn test_winning_move_reports_winner_and_resets() {
        let app_state = AppState::new();
        {
            let mut game = app_state.lock();
            // March a White piece up the a-file, capturing straight ahead
            let path = [(6, 0), (5, 0), (4, 0), (3, 0), (2, 0), (1, 0)];
            for pair in path.windows(2) {
                let (from, to) = (pair[0], pair[1]);
                game.apply_move(cell(from.0, from.1), cell(to.0, to.1)).unwrap();
            }
        }

        let (status, body) = send(&app_state, "POST", "/api/move", mv(1, 0, 0, 0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["winner"], "White");
        assert_eq!(body["current_player"], "White");
        assert_eq!(body["history_len"], 0);
        assert_eq!(body["board"][0][0], "B");
    }

    #[tokio::test]
    async fn test_reset() {
        let app_state = AppState::new();
        send(&app_state, "POST", "/api/move", mv(6, 3, 5, 3)).await;

        let (status, body) = send(&app_state, "POST", "/api/reset", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_player"], "White");
        assert_eq!(body["can_undo"], false);
        assert_eq!(body["board"][6][3], "W");
    }

    #[tokio::test]
    async fn test_negative_coordinates_rejected() {
        let app_state = AppState::new();
        let request = Request::builder()
            .method("POST")
            .uri("/api/move")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"from_row":6,"from_col":0,"to_row":-1,"to_col":0}"#,
            ))
            .unwrap();

        let response = router(app_state.clone()).oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }
}
