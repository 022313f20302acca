use service_core::{
    axum::{
        extract::State,
        http::{header::RETRY_AFTER, StatusCode},
        response::{IntoResponse, Response},
        Json,
    },
    error::AppError,
};

use crate::{
    dtos::auth::{
        DeliveryFailedResponse, RefreshTokenRequest, RequestCodeRequest, RequestCodeResponse,
        ResendCodeRequest, TokenResponse, ValidateTokenRequest, ValidateTokenResponse,
        VerifyCodeRequest,
    },
    services::{AuthError, CodeRequested, IssuedToken},
    utils::ValidatedJson,
    AppState,
};

const TOKEN_TYPE: &str = "Bearer";

fn token_response(state: &AppState, issued: IssuedToken) -> TokenResponse {
    TokenResponse {
        token: issued.token,
        token_type: TOKEN_TYPE.to_string(),
        expires_at: issued.expires_at,
        expires_in: state.auth_service.jwt().session_ttl_seconds(),
    }
}

fn code_requested_response(
    result: Result<CodeRequested, AuthError>,
) -> Result<Response, AppError> {
    match result {
        Ok(requested) => Ok((
            StatusCode::ACCEPTED,
            Json(RequestCodeResponse {
                verification_id: requested.verification_id,
                expires_at: requested.expires_at,
            }),
        )
            .into_response()),
        Err(err) => {
            // The code is stored; hand back its id so the client can ask for a resend.
            let Some(verification_id) = err.verification_id().map(str::to_owned) else {
                return Err(err.into());
            };
            tracing::warn!(verification_id = %verification_id, error = %err, "Verification code not delivered");
            let mut res = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(DeliveryFailedResponse {
                    error: "Service temporarily unavailable".to_string(),
                    verification_id,
                }),
            )
                .into_response();
            if let Some(retry) = err.retry_after() {
                res.headers_mut().insert(RETRY_AFTER, retry.into());
            }
            Ok(res)
        }
    }
}

/// Send a verification code to a phone number
pub async fn request_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RequestCodeRequest>,
) -> Result<Response, AppError> {
    code_requested_response(
        state
            .auth_service
            .request_verification_code(&req.phone_number)
            .await,
    )
}

/// Deliver a stored code again after a failed delivery
pub async fn resend_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendCodeRequest>,
) -> Result<Response, AppError> {
    code_requested_response(
        state
            .auth_service
            .resend_verification_code(&req.verification_id, &req.phone_number)
            .await,
    )
}

/// Exchange a verification code for a session token
pub async fn verify_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state
        .auth_service
        .verify_code(&req.verification_id, &req.phone_number, &req.code)
        .await?;
    Ok((StatusCode::OK, Json(token_response(&state, issued))))
}

/// Swap a session token, expired or not, for a fresh one
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state.auth_service.refresh_token(&req.token).await?;
    Ok((StatusCode::OK, Json(token_response(&state, issued))))
}

/// Report whether a session token is currently valid
pub async fn validate_token(
    State(state): State<AppState>,
    Json(req): Json<ValidateTokenRequest>,
) -> impl IntoResponse {
    let valid = state.auth_service.validate_token(&req.token);
    (StatusCode::OK, Json(ValidateTokenResponse { valid }))
}
