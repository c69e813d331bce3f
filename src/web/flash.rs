//! One-shot messages carried across a redirect in a `flash` cookie.
//!
//! The cookie value is a base64url-encoded JSON array of strings. It is read on
//! the next page render and cleared in the same response.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

pub const COOKIE_NAME: &str = "flash";

/// `Set-Cookie` value storing `messages`
pub fn set_cookie(messages: &[String]) -> String {
    let payload = serde_json::to_vec(messages).unwrap_or_default();
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age=60",
        COOKIE_NAME,
        URL_SAFE_NO_PAD.encode(payload)
    )
}

/// `Set-Cookie` value removing the flash cookie
pub fn clear_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", COOKIE_NAME)
}

/// Messages found in the request cookies; undecodable values are dropped
pub fn take(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == COOKIE_NAME).then_some(value)
        })
        .filter_map(|value| URL_SAFE_NO_PAD.decode(value).ok())
        .filter_map(|bytes| serde_json::from_slice::<Vec<String>>(&bytes).ok())
        .flatten()
        .collect()
}

/// 303 to `location` with one flash message attached
pub fn redirect(location: &str, message: impl Into<String>) -> Response {
    let cookie = set_cookie(&[message.into()]);
    (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to(location)).into_response()
}
