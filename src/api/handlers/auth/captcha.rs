//! Captcha challenge issuance.

use axum::{Json, extract::Extension};
use sqlx::PgPool;

use super::{storage, types::CaptchaResponse};
use crate::{
    api::error::ApiError,
    captcha::{self, CAPTCHA_TTL_SECONDS},
};

#[utoipa::path(
    post,
    path = "/v1/captcha",
    responses(
        (status = 200, description = "New captcha challenge", body = CaptchaResponse)
    ),
    tag = "auth"
)]
pub async fn issue(pool: Extension<PgPool>) -> Result<Json<CaptchaResponse>, ApiError> {
    let challenge = captcha::generate()?;
    let token = storage::insert_captcha(&pool, &challenge.code, CAPTCHA_TTL_SECONDS).await?;
    Ok(Json(CaptchaResponse {
        token,
        image: challenge.image_data_url,
    }))
}
