pub mod admin;
pub mod catchers;
pub mod config;
pub mod cors;
pub mod error;
pub mod postgres;
pub mod rate_limiter;
pub mod routes;
pub mod service;
pub mod store;
pub mod utils;

pub use shared::{models::*, identity::*};
pub use shared::error::{ErrorResponse, VotingError};

use rocket::{routes, catchers, Build, Rocket};
use crate::{catchers::*, cors::CORS, routes::*};

/// Assembles the HTTP surface around an already-bootstrapped state.
pub fn build_rocket(state: AppState, allowed_origin: &str) -> Rocket<Build> {
    rocket::build()
        .attach(CORS::new(allowed_origin))
        .manage(state)
        .mount(
            "/api",
            routes![
                get_votes,
                voter_status,
                cast_vote,
                admin_reset,
                all_options
            ],
        )
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                too_many_requests,
                internal_error
            ],
        )
}
