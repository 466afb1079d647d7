use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Request, Response};
use rocket::http::Header;
use crate::admin::ADMIN_SECRET_HEADER;

pub struct CORS {
    allowed_origin: String,
}

impl CORS {
    pub fn new(allowed_origin: impl Into<String>) -> Self {
        Self { allowed_origin: allowed_origin.into() }
    }
}

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        if !req.uri().path().as_str().starts_with("/api") {
            return;
        }

        res.set_header(Header::new("Access-Control-Allow-Origin", self.allowed_origin.clone()));
        res.set_header(Header::new("Access-Control-Allow-Methods", "GET, POST, OPTIONS"));
        res.set_header(Header::new(
            "Access-Control-Allow-Headers",
            format!("Content-Type, {}", ADMIN_SECRET_HEADER),
        ));
        res.set_header(Header::new("Access-Control-Max-Age", "86400"));
    }
}
