use crate::context::AppContext;
use crate::controller;
use crate::model::CronConfig;
use actix_web::http::StatusCode;
use actix_web::web::{Data, Json};
use actix_web::HttpResponse;
use helper::err::IndividualErrorList;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Request body validation failed:\n{0}")]
    Validation(IndividualErrorList),
    #[error("Failed to schedule the job: {0:?}")]
    Internal(#[from] anyhow::Error),
}

impl actix_web::error::ResponseError for RegistrationError {
    fn status_code(&self) -> StatusCode {
        match self {
            RegistrationError::Validation(_) => StatusCode::BAD_REQUEST,
            RegistrationError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let RegistrationError::Internal(err) = self {
            error!("{:?}", err);
        }
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

/// Register a job; traffic generation starts asynchronously after the
/// configured initial wait.
pub async fn put_cron(
    payload: Json<CronConfig>,
    ctx: Data<AppContext>,
) -> Result<HttpResponse, RegistrationError> {
    controller::register_cron(payload.0, &ctx)?;
    Ok(HttpResponse::Ok().finish())
}

/// The registration API only accepts PUT
pub async fn wrong_method() -> HttpResponse {
    HttpResponse::Forbidden().body("wrong method, use PUT")
}

pub async fn health() -> HttpResponse { HttpResponse::Ok().finish() }
