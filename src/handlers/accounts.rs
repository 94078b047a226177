use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Account, AccountChanges, NewAccount};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

/// POST /api/accounts
///
/// アカウントを作成する。account_id とタイムスタンプはサーバー側で生成。
///
/// # Security
/// - 認証情報フィールドはログに出力しない
/// - レスポンスにも含めない
pub async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let Json(new) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let account = state.accounts.create(new).await.inspect_err(|e| {
        tracing::warn!(error = %e, "アカウント作成失敗");
    })?;

    tracing::info!(
        account_id = %account.account_id,
        email = %account.email,
        login_method = %account.login_method,
        "アカウント作成成功"
    );

    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/accounts/{account_id}
pub async fn get_account(
    State(state): State<AppState>,
    account_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Account>, AppError> {
    let account_id = parse_account_id(account_id)?;
    let account = state.accounts.get(account_id).await?;
    Ok(Json(account))
}

/// GET /api/accounts?email=...
///
/// ログイン時の検索用
pub async fn find_account(
    State(state): State<AppState>,
    query: Result<Query<EmailQuery>, QueryRejection>,
) -> Result<Json<Account>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let account = state.accounts.find_by_email(&query.email).await?;
    Ok(Json(account))
}

/// PATCH /api/accounts/{account_id}
///
/// 省略したフィールドは変更しない。`null` を指定すると任意項目をクリアする。
pub async fn update_account(
    State(state): State<AppState>,
    account_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AccountChanges>, JsonRejection>,
) -> Result<Json<Account>, AppError> {
    let account_id = parse_account_id(account_id)?;
    let Json(changes) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let account = state
        .accounts
        .update(account_id, changes)
        .await
        .inspect_err(|e| {
            tracing::warn!(account_id = %account_id, error = %e, "アカウント更新失敗");
        })?;

    tracing::info!(account_id = %account.account_id, "アカウント更新成功");

    Ok(Json(account))
}

/// DELETE /api/accounts/{account_id}
pub async fn delete_account(
    State(state): State<AppState>,
    account_id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let account_id = parse_account_id(account_id)?;
    state.accounts.delete(account_id).await?;

    tracing::info!(account_id = %account_id, "アカウント削除成功");

    Ok(StatusCode::NO_CONTENT)
}

/// UUID 形式でない ID は存在しないアカウントとして扱う
fn parse_account_id(account_id: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    account_id.map(|Path(id)| id).map_err(|e| {
        tracing::debug!(error = %e, "account_id のパースに失敗");
        AppError::NotFound
    })
}
