/// Account Routes
///
/// Login, token refresh and the caller's own identity.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthServices, Claims};
use crate::error::AppError;
use crate::validators::{is_valid_email, is_valid_password, is_valid_token};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct CurrentUserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
}

/// POST /account/login
///
/// # Errors
/// - 400: missing or malformed email/password
/// - 401: bad credentials, empty body
/// - 500: store or identity failure
pub async fn login(
    form: web::Json<LoginRequest>,
    services: web::Data<AuthServices>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    is_valid_password(&form.password)?;

    let response = services.issuer.login(&email, &form.password).await?;

    Ok(HttpResponse::Ok().json(response))
}

/// POST /account/refresh-token
///
/// # Errors
/// - 400: missing or blank token fields
/// - 401: any rejected token, empty body
/// - 500: store or identity failure
pub async fn refresh_token(
    form: web::Json<RefreshTokenRequest>,
    services: web::Data<AuthServices>,
) -> Result<HttpResponse, AppError> {
    let access_token = is_valid_token("token", &form.token)?;
    let refresh_token = is_valid_token("refreshToken", &form.refresh_token)?;

    let response = services
        .coordinator
        .rotate(access_token, refresh_token)
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// GET /account/me
///
/// Requires `Authorization: Bearer <access_token>`; claims are injected by
/// the JWT middleware.
pub async fn get_current_user(claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    let claims = claims.into_inner();

    Ok(HttpResponse::Ok().json(CurrentUserResponse {
        id: claims.sub,
        username: claims.username,
        email: claims.email,
        roles: claims.roles,
    }))
}
