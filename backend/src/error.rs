use rocket::http::Status;
use rocket::response::Responder;
use rocket::serde::json::Json;
use thiserror::Error;
use shared::error::{ErrorCode, ErrorResponse, VotingError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Voting(#[from] VotingError),
}

impl ApiError {
    pub fn status(&self) -> Status {
        let ApiError::Voting(err) = self;
        match err.code() {
            ErrorCode::InvalidInput => Status::BadRequest,
            ErrorCode::LimitReached => Status::Forbidden,
            ErrorCode::NotFound => Status::NotFound,
            ErrorCode::SystemError => Status::InternalServerError,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        let ApiError::Voting(ref err) = self;

        rocket::Response::build_from(Json(ErrorResponse::from(err)).respond_to(req)?)
            .status(status)
            .ok()
    }
}
