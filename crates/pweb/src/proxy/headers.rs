//! Header names and rewriting helpers.
//!
//! Header names and fixed values are statics, so call sites never need a
//! runtime `.parse().unwrap()`.

use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, PROXY_AUTHORIZATION, TE, TRAILER,
    TRANSFER_ENCODING, UPGRADE,
};

pub static KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
pub static PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// The encodings the response pipeline can decode.
pub static ACCEPT_ENCODING_VALUE: HeaderValue = HeaderValue::from_static("gzip, deflate, br");
pub static TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");

/// Headers that describe a single connection and are never forwarded.
pub fn hop_by_hop_headers() -> [HeaderName; 8] {
    [
        CONNECTION,
        KEEP_ALIVE.clone(),
        PROXY_CONNECTION.clone(),
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
    ]
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in hop_by_hop_headers() {
        headers.remove(&name);
    }
}

/// Extension trait for setting headers from strings that may not be valid
/// header values.
pub trait HeaderMapExt {
    /// Insert `value` under `name`. Returns false if `value` is not a valid
    /// header value, in which case the map is unchanged.
    fn set_str(&mut self, name: HeaderName, value: &str) -> bool;
}

impl HeaderMapExt for HeaderMap {
    fn set_str(&mut self, name: HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.insert(name, value);
                true
            }
            Err(_) => false,
        }
    }
}
