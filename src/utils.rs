/// Secret generation, digest and cookie helpers shared by the auth flows
use crate::error::{ApiError, ApiResult};
use axum::http::{header::SET_COOKIE, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate an opaque, unguessable secret of `len` random bytes,
/// base64url-encoded for cookie/header transport.
pub fn gen_random_secret(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One-way digest of a secret. Only this is ever persisted; the raw
/// secret lives in the client's cookie or bearer header.
pub fn sha256_hex(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Append a `Set-Cookie` header: httpOnly, SameSite=Lax, path `/`.
pub fn append_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    max_age: i64,
    secure: bool,
) -> ApiResult<()> {
    let secure_attr = if secure { "; Secure" } else { "" };
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        name, value, max_age, secure_attr
    );
    headers.append(
        SET_COOKIE,
        cookie
            .parse()
            .map_err(|_| ApiError::Internal("Failed to encode cookie header".to_string()))?,
    );
    Ok(())
}

/// Append a `Set-Cookie` header that removes the named cookie.
pub fn clear_cookie(headers: &mut HeaderMap, name: &str, secure: bool) -> ApiResult<()> {
    append_cookie(headers, name, "", 0, secure)
}

/// Read a cookie value out of the request `Cookie` header(s).
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then(|| v.to_string())
        })
        .next()
}
