/// Rewrites the legacy `postgres://` scheme some hosts hand out to the
/// canonical `postgresql://`, so logged and stored URLs use one spelling.
pub fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{}", rest),
        None => url.to_string(),
    }
}
