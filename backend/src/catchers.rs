use rocket::{Request, catch, serde::json::Json};
use shared::error::ErrorResponse;

#[catch(400)]
pub fn bad_request(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Invalid request parameters."))
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("A valid admin secret is required."))
}

#[catch(403)]
pub fn forbidden(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Access forbidden."))
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("The requested resource was not found."))
}

#[catch(422)]
pub fn unprocessable(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Malformed request body."))
}

#[catch(429)]
pub fn too_many_requests(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Rate limit exceeded. Please wait before trying again."))
}

#[catch(500)]
pub fn internal_error(_req: &Request) -> Json<ErrorResponse> {
    Json(ErrorResponse::new("An internal server error occurred."))
}
