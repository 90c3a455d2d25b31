use axum::{
    extract::{Json, State},
    response::Html,
    routing::{get, post},
    Router,
};
use chrono::{Local, TimeZone};
use sauna_controller::{SaunaController, StateSnapshot, TimerMode};
use serde::Deserialize;
use tower_http::services::ServeDir;
use tracing::error;

// Shared state between the control loop and the web server
#[derive(Clone)]
pub struct WebState {
    pub controller: SaunaController,
}

#[derive(Deserialize)]
pub struct HeaterRequest {
    enabled: bool,
}

#[derive(Deserialize)]
pub struct SetpointRequest {
    desired: f64, // in the current display unit
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    start_at: Option<i64>, // epoch seconds, null clears the schedule
}

#[derive(Deserialize)]
pub struct CostRequest {
    price_per_kwh: Option<f64>,
    heater_power_kw: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    Start,
    Stop,
    Reset,
    SetMode,
    SetDuration,
}

#[derive(Deserialize)]
pub struct TimerRequest {
    action: TimerAction,
    mode: Option<TimerMode>,
    duration_secs: Option<i64>,
}

pub fn router(controller: SaunaController) -> Router {
    Router::new()
        .route("/", get(serve_status_page))
        .route("/api/status", get(get_status))
        .route("/api/heater", post(set_heater))
        .route("/api/setpoint", post(set_setpoint))
        .route("/api/units", post(toggle_units))
        .route("/api/schedule", post(set_schedule))
        .route("/api/cost", post(set_cost))
        .route("/api/timer", post(timer_control))
        .nest_service("/static", ServeDir::new("apps/server/static"))
        .with_state(WebState { controller })
}

async fn serve_status_page() -> Html<String> {
    match tokio::fs::read_to_string("apps/server/static/status.html").await {
        Ok(content) => Html(content),
        Err(err) => {
            error!("could not read status.html: {err}");
            Html("Error loading page".to_string())
        }
    }
}

async fn get_status(State(state): State<WebState>) -> axum::Json<StateSnapshot> {
    axum::Json(state.controller.get_state_snapshot())
}

fn ok() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true
    }))
}

fn fail(error: &str) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": false,
        "error": error
    }))
}

async fn set_heater(
    State(state): State<WebState>,
    Json(request): Json<HeaterRequest>,
) -> axum::Json<serde_json::Value> {
    if state.controller.set_heater_enabled(request.enabled) {
        ok()
    } else {
        fail("locked out, switch the heater off first")
    }
}

async fn set_setpoint(
    State(state): State<WebState>,
    Json(request): Json<SetpointRequest>,
) -> axum::Json<serde_json::Value> {
    if !request.desired.is_finite() {
        return fail("setpoint must be a number");
    }
    state.controller.set_desired_temperature(request.desired);
    ok()
}

async fn toggle_units(State(state): State<WebState>) -> axum::Json<serde_json::Value> {
    let imperial = state.controller.toggle_display_unit();
    axum::Json(serde_json::json!({
        "success": true,
        "use_display_imperial": imperial
    }))
}

async fn set_schedule(
    State(state): State<WebState>,
    Json(request): Json<ScheduleRequest>,
) -> axum::Json<serde_json::Value> {
    let start_at = match request.start_at {
        Some(secs) => match Local.timestamp_opt(secs, 0).single() {
            Some(target) => Some(target),
            None => return fail("invalid timestamp"),
        },
        None => None,
    };
    state.controller.set_schedule(start_at);
    ok()
}

async fn set_cost(
    State(state): State<WebState>,
    Json(request): Json<CostRequest>,
) -> axum::Json<serde_json::Value> {
    for value in [request.price_per_kwh, request.heater_power_kw]
        .into_iter()
        .flatten()
    {
        if !value.is_finite() || value < 0.0 {
            return fail("cost inputs must be non-negative numbers");
        }
    }
    state
        .controller
        .set_cost_config(request.price_per_kwh, request.heater_power_kw);
    ok()
}

async fn timer_control(
    State(state): State<WebState>,
    Json(request): Json<TimerRequest>,
) -> axum::Json<serde_json::Value> {
    match request.action {
        TimerAction::Start => state.controller.timer_start(),
        TimerAction::Stop => state.controller.timer_stop(),
        TimerAction::Reset => state.controller.timer_reset(),
        TimerAction::SetMode => match request.mode {
            Some(mode) => state.controller.timer_set_mode(mode),
            None => return fail("set_mode needs a mode"),
        },
        TimerAction::SetDuration => {
            if let Some(secs) = request.duration_secs {
                if secs < 0 {
                    return fail("duration must not be negative");
                }
            }
            state.controller.timer_set_duration(request.duration_secs);
        }
    }
    ok()
}
