use rocket::request::{FromRequest, Outcome};
use rocket::http::Status;
use rocket::Request;
use ring::constant_time::verify_slices_are_equal;
use sha2::{Digest, Sha256};
use tracing::warn;
use crate::routes::AppState;

pub const ADMIN_SECRET_HEADER: &str = "X-Admin-Secret";

/// Holds the configured operator secret as a digest so comparison cost does
/// not depend on the secret's length or content.
pub struct AdminSecret {
    digest: Option<[u8; 32]>,
}

impl AdminSecret {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            digest: secret.map(digest),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.digest.is_some()
    }

    pub fn verify(&self, candidate: &str) -> bool {
        match &self.digest {
            Some(expected) => verify_slices_are_equal(expected, &digest(candidate)).is_ok(),
            None => false,
        }
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(value.as_bytes()));
    out
}

/// Request guard for the reset endpoint.
pub struct AdminCapability;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminCapability {
    type Error = &'static str;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = req.rocket().state::<AppState>() else {
            return Outcome::Error((Status::InternalServerError, "application state missing"));
        };

        if !state.admin_secret.is_configured() {
            warn!("Reset attempted but no admin secret is configured");
            return Outcome::Error((Status::Forbidden, "reset is disabled"));
        }

        // Keyed on the socket peer only; forwarded-for headers are client-controlled.
        let peer = req.remote().map(|addr| addr.ip().to_string()).unwrap_or_default();
        let key = format!("admin_reset:{}", peer);

        if state.admin_limiter.check_rate_limit(&key).is_err() {
            return Outcome::Error((Status::TooManyRequests, "too many failed attempts"));
        }

        match req.headers().get_one(ADMIN_SECRET_HEADER) {
            Some(secret) if state.admin_secret.verify(secret) => Outcome::Success(AdminCapability),
            _ => {
                state.admin_limiter.record_attempt(&key);
                warn!("Rejected reset attempt from {}", key);
                Outcome::Error((Status::Unauthorized, "invalid admin secret"))
            }
        }
    }
}
