//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; failures map to a status plus `{ "error": ... }`.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::domain::{SettingsPatch, SystemSettings};
use crate::error::ServiceError;
use crate::protocol::*;
use crate::state::AppState;
use crate::logic;

const DEFAULT_CHAPTER_COUNT: u32 = 10;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(name_len = body.name.len()))]
pub async fn http_create_user(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateUserIn>,
) -> Result<impl IntoResponse, ServiceError> {
  let user = logic::create_user(&state, &body.name).await?;
  let tier = user.tier(&state.clock.now());
  Ok((StatusCode::CREATED, Json(UserOut { user, tier })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_user(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<UserOut>, ServiceError> {
  let user = logic::get_user(&state, &id).await?;
  let tier = user.tier(&state.clock.now());
  Ok(Json(UserOut { user, tier }))
}

#[instrument(level = "info", skip(state, body), fields(subject = %body.subject_id, score = body.score))]
pub async fn http_post_progress(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ScoreIn>,
) -> Result<Json<ScoreOut>, ServiceError> {
  let result = logic::submit_score(&state, &id, &body.subject_id, body.score).await?;
  if result.leveled_up {
    info!(target: "progress", user = %id, subject = %body.subject_id, chapter = result.chapter_index, "HTTP chapter unlocked");
  }
  Ok(Json(result.into()))
}

#[instrument(level = "info", skip(state), fields(subject = %q.subject_id))]
pub async fn http_get_chapters(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Query(q): Query<ChapterQuery>,
) -> Result<Json<ChaptersOut>, ServiceError> {
  let count = q.count.unwrap_or(DEFAULT_CHAPTER_COUNT);
  let map = logic::chapters(&state, &id, &q.subject_id, count).await?;
  Ok(Json(map.into()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_spin(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SpinStatusOut>, ServiceError> {
  let status = logic::spin_status(&state, &id).await?;
  Ok(Json(status.into()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_spin(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SpinOut>, ServiceError> {
  let outcome = logic::spin(&state, &id).await?;
  Ok(Json(outcome.into()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_settings(State(state): State<Arc<AppState>>) -> Json<SystemSettings> {
  Json(state.settings.current().await)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_put_settings(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SettingsPatch>,
) -> Result<Json<SystemSettings>, ServiceError> {
  let saved = state.settings.update(&body).await?;
  info!(
    target: "nst_backend",
    threshold = saved.mcq_unlock_threshold, rewards = ?saved.wheel_rewards,
    spin_limit_free = saved.spin_limit_free, spin_limit_premium = saved.spin_limit_premium,
    "Settings updated"
  );
  Ok(Json(saved))
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::body::{to_bytes, Body};
  use axum::http::{Method, Request, StatusCode};
  use chrono::{FixedOffset, TimeZone};
  use serde_json::{json, Value};
  use tower::ServiceExt;

  use crate::clock::FixedClock;
  use crate::config::AppConfig;
  use crate::domain::User;
  use crate::routes::build_router;
  use crate::state::AppState;

  async fn app() -> axum::Router {
    let clock = Arc::new(FixedClock::new(
      FixedOffset::east_opt(19_800).unwrap().with_ymd_and_hms(2024, 6, 10, 9, 15, 0).unwrap(),
    ));
    let state = AppState::from_config(AppConfig::default(), None, clock);
    state.users.insert(User::new_student("NST-1", "Asha")).await.unwrap();
    build_router(Arc::new(state))
  }

  async fn call(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri);
    let req = match body {
      Some(b) => req.header("content-type", "application/json").body(Body::from(b.to_string())),
      None => req.body(Body::empty()),
    }
    .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  #[tokio::test]
  async fn health_is_ok() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
  }

  #[tokio::test]
  async fn progress_flow() {
    let app = app().await;
    let (status, body) = call(
      &app, Method::POST, "/api/v1/users/NST-1/progress",
      Some(json!({ "subjectId": "physics", "score": 120 })),
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["leveledUp"], true);
    assert_eq!(body["chapterIndex"], 1);
    assert_eq!(body["progress"]["totalMCQsSolved"], 20);

    let (status, body) = call(&app, Method::GET, "/api/v1/users/NST-1/chapters?subjectId=physics&count=3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ratio"], 0.2);
    assert_eq!(body["chapters"][0]["status"], "completed");
    assert_eq!(body["chapters"][1]["status"], "current");
    assert_eq!(body["chapters"][2]["status"], "locked");

    let (_, body) = call(&app, Method::GET, "/api/v1/users/NST-1", None).await;
    assert_eq!(body["progress"]["physics"]["currentChapterIndex"], 1);
    assert_eq!(body["tier"], "free");
  }

  #[tokio::test]
  async fn negative_score_is_bad_request() {
    let app = app().await;
    let (status, body) = call(
      &app, Method::POST, "/api/v1/users/NST-1/progress",
      Some(json!({ "subjectId": "physics", "score": -1 })),
    ).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("negative"));
  }

  #[tokio::test]
  async fn unknown_user_is_not_found() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/api/v1/users/ghost/spin", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
  }

  #[tokio::test]
  async fn second_spin_is_blocked_with_countdown() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/api/v1/users/NST-1/spin", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "eligible");
    assert_eq!(body["segments"].as_array().unwrap().len(), 12);

    let (status, body) = call(&app, Method::POST, "/api/v1/users/NST-1/spin", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "spun");
    assert_eq!(body["remaining"], 0);

    let (status, body) = call(&app, Method::POST, "/api/v1/users/NST-1/spin", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "blocked");
    assert_eq!(body["secondsUntilReset"], 53_100);
    assert_eq!(body["countdown"], "14h 45m 0s");
  }

  #[tokio::test]
  async fn created_user_can_be_fetched() {
    let app = app().await;
    let (status, body) = call(&app, Method::POST, "/api/v1/users", Some(json!({ "name": "Ravi" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["credits"], 0);

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/users/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ravi");
  }

  #[tokio::test]
  async fn settings_round_trip_and_validation() {
    let app = app().await;
    let (_, body) = call(&app, Method::GET, "/api/v1/settings", None).await;
    assert_eq!(body["mcqUnlockThreshold"], 100);

    let (status, body) = call(&app, Method::PUT, "/api/v1/settings", Some(json!({ "mcqUnlockThreshold": 40 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mcqUnlockThreshold"], 40);
    assert_eq!(body["spinLimitFree"], 1);

    let (status, _) = call(&app, Method::PUT, "/api/v1/settings", Some(json!({ "spinLimitPremium": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call(&app, Method::GET, "/api/v1/settings", None).await;
    assert_eq!(body["mcqUnlockThreshold"], 40);
  }

  #[tokio::test]
  async fn partial_settings_update_keeps_custom_values() {
    let app = app().await;
    let (status, _) = call(
      &app, Method::PUT, "/api/v1/settings",
      Some(json!({ "wheelRewards": [0, 10, 50], "spinLimitFree": 2, "chapterAdvance": "looped" })),
    ).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::PUT, "/api/v1/settings", Some(json!({ "mcqUnlockThreshold": 40 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mcqUnlockThreshold"], 40);
    assert_eq!(body["wheelRewards"], json!([0, 10, 50]));
    assert_eq!(body["spinLimitFree"], 2);
    assert_eq!(body["chapterAdvance"], "looped");
  }
}
