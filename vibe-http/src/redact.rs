//! Log-safe renderings of requests and responses.
//!
//! Nothing in here ever returns a credential: authorization headers, cookies
//! and well-known secret query parameters are replaced with `<redacted>`.

use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use serde::Deserialize;

pub(crate) const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_MAX: usize = 500;
const REDACTED: &str = "<redacted>";

const SECRET_KEYS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "token",
    "secret",
    "client_secret",
    "client_id",
    "bearer",
    "password",
    "cookie",
];

pub(crate) fn is_secret_key(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SECRET_KEYS.contains(&lower.as_str())
}

pub(crate) fn redact_pairs<'a, I>(pairs: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| {
            let value = if is_secret_key(k) { REDACTED } else { v };
            (k.to_string(), value.to_string())
        })
        .collect()
}

pub(crate) fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if is_secret_key(&key) || key.eq_ignore_ascii_case("set-cookie") {
                REDACTED.to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

/// Best-effort curl line for reproducing a request. Secret query values and
/// auth headers are masked; the auth itself is never part of `headers`.
pub(crate) fn curl_line(method: &Method, url: &Url, headers: &HeaderMap, body: Option<&[u8]>) -> String {
    let mut safe = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.is_empty() {
        let redacted = redact_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        safe.query_pairs_mut().clear().extend_pairs(redacted);
    }

    let mut parts = vec!["curl".to_string(), format!("-X{method}")];
    for (name, val) in redact_headers(headers) {
        parts.push(format!("-H '{}: {}'", name, val.replace('\'', r"'\''")));
    }
    if let Some(bytes) = body {
        match std::str::from_utf8(bytes) {
            Ok(s) => {
                let mut s = s.to_string();
                if s.len() > RAW_MAX_BODY {
                    s.truncate(floor_char_boundary(&s, RAW_MAX_BODY));
                    s.push_str("...");
                }
                parts.push(format!("-d '{}'", s.replace('\'', r"'\''")));
            }
            Err(_) => parts.push(format!("--data-binary @- # ({} bytes)", bytes.len())),
        }
    }
    parts.push(format!("'{}'", safe.as_str()));
    parts.join(" ")
}

pub(crate) fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > SNIPPET_MAX {
        snip.truncate(floor_char_boundary(&snip, SNIPPET_MAX));
        snip.push_str("...");
    }
    snip
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Pull a human-readable message out of the error envelopes used by the
/// upstreams we talk to (OpenAI, Twitter v2, Reddit OAuth).
pub(crate) fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct Nested {
        error: NestedDetail,
    }
    #[derive(Deserialize)]
    struct NestedDetail {
        message: String,
    }

    #[derive(Deserialize)]
    struct Listed {
        errors: Vec<Flat>,
    }

    #[derive(Deserialize, Default)]
    struct Flat {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        error: serde_json::Value,
    }

    impl Flat {
        fn best(self) -> Option<String> {
            [self.message, self.detail, self.title]
                .into_iter()
                .find(|s| !s.is_empty())
                .or_else(|| self.error.as_str().map(str::to_string))
        }
    }

    if let Ok(env) = serde_json::from_slice::<Nested>(body) {
        return env.error.message;
    }
    if let Ok(listed) = serde_json::from_slice::<Listed>(body) {
        if let Some(msg) = listed.errors.into_iter().find_map(Flat::best) {
            return msg;
        }
    }
    if let Ok(flat) = serde_json::from_slice::<Flat>(body) {
        if let Some(msg) = flat.best() {
            return msg;
        }
    }
    snip_body(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, HeaderValue, USER_AGENT};

    #[test]
    fn secret_query_values_are_masked() {
        let pairs = redact_pairs([("limit", "25"), ("Client_Secret", "shh")]);
        assert_eq!(pairs[0], ("limit".into(), "25".into()));
        assert_eq!(pairs[1], ("Client_Secret".into(), "<redacted>".into()));
    }

    #[test]
    fn curl_line_hides_credentials() {
        let url = Url::parse("https://oauth.reddit.com/r/rust/new?limit=5&access_token=abc").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(USER_AGENT, HeaderValue::from_static("vibe/0.1"));
        let line = curl_line(&Method::GET, &url, &headers, None);
        assert!(!line.contains("abc"), "{line}");
        assert!(line.contains("limit=5"));
        assert!(line.contains("vibe/0.1"));
    }

    #[test]
    fn error_message_understands_common_envelopes() {
        assert_eq!(error_message(br#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(
            error_message(br#"{"errors":[{"title":"Too Many Requests"}]}"#),
            "Too Many Requests"
        );
        assert_eq!(error_message(br#"{"error":"invalid_grant"}"#), "invalid_grant");
        assert_eq!(error_message(b"plain text"), "plain text");
    }

    #[test]
    fn snippets_truncate_on_char_boundaries() {
        let body = "é".repeat(400);
        let snip = snip_body(body.as_bytes());
        assert!(snip.ends_with("..."));
        assert!(snip.len() <= SNIPPET_MAX + 3);
    }
}
