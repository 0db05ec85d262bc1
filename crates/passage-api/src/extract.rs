//! Token extraction and cookie construction
//!
//! Extraction is an ordered fallback over plain header maps: the named
//! cookie wins, then the `Authorization: Bearer` header. Keeping this a
//! pure function keeps the gate testable without a running server.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;

/// Cookie carrying the access token
pub const ACCESS_COOKIE_NAME: &str = "passage_access";

/// Cookie carrying the refresh token
pub const REFRESH_COOKIE_NAME: &str = "passage_refresh";

/// Extract a bearer credential, trying the named cookie first and the
/// Authorization header second
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    get_cookie(headers, cookie_name).or_else(|| bearer_token(headers))
}

/// Read a single cookie value out of the Cookie header(s)
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

/// Set-Cookie value delivering a token (HTTP-only, same-site strict)
pub fn auth_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        name, value, max_age_secs
    )
}

/// Set-Cookie value clearing a token cookie
pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0", name)
}
