use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;

use crate::engine::accounts::NewAccount;
use crate::error::AppError;
use crate::models::account::{Account, Caller};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", post(register))
        .route("/accounts/me", get(current_account))
}

#[derive(Serialize)]
pub struct RegistrationResponse {
    pub account: Account,
    pub token: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAccount>,
) -> Result<Json<RegistrationResponse>, AppError> {
    let registration = state.accounts.register(&state.drivers, payload)?;

    Ok(Json(RegistrationResponse {
        account: registration.account,
        token: registration.token,
    }))
}

async fn current_account(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Account>, AppError> {
    state
        .accounts
        .get(&caller.id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("account {} not found", caller.id)))
}
