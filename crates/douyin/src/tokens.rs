//! Request-token fabrication. None of these values are derived from the
//! platform's real signing algorithm; they only reproduce the expected
//! shape (length and charset) so that requests are not rejected outright.

use rand::{Rng, rng};
use reqwest::Client;
use serde_json::json;
use std::sync::{LazyLock, Mutex};
use tracing::debug;

use crate::apis::{BASE_URL, UNION_REGISTER_URL};
use crate::session::DEFAULT_UA;

static GLOBAL_TTWID: LazyLock<Mutex<Option<String>>> = LazyLock::new(|| Mutex::new(None));

const MS_TOKEN_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

const HEX_CHARSET: &[u8] = b"abcdef0123456789";

/// Alphabet the web client's X-Bogus values draw from.
const X_BOGUS_CHARSET: &[u8] =
    b"Dkdpgh4ZKsQB80/Mfvw36XI1R25-WUAlEi7NLboqYTOPuzmFjJnryx9HVGcaStCe";

fn random_string(charset: &[u8], len: usize) -> String {
    let mut rng = rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..charset.len());
            charset[idx] as char
        })
        .collect()
}

/// Random ms_token, 184 chars.
pub fn generate_ms_token() -> String {
    random_string(MS_TOKEN_CHARSET, 184)
}

/// Random csrf-style nonce, 21 hex chars.
pub fn generate_nonce() -> String {
    random_string(HEX_CHARSET, 21)
}

/// Random odin_tt cookie value, 160 hex chars.
pub fn generate_odin_tt() -> String {
    random_string(HEX_CHARSET, 160)
}

/// Shape-plausible X-Bogus query value, 28 chars from the observed alphabet.
pub fn generate_x_bogus() -> String {
    random_string(X_BOGUS_CHARSET, 28)
}

/// Fallback ttwid used when the register endpoint cannot be reached.
pub(crate) const DEFAULT_TTWID: &str = "1%7CeaVXGWbZVWk3eprhZ7BvYfGO61vLUhhx0lFdRSAmIUM%7C1755779940%7C3c1a9f4b2e8d07c55b012c3a84f6e9ddaa7150c2b84fe1de29fcb0a214d6ab5c";

/// Registers with the ttwid union endpoint and pulls the `ttwid` cookie from
/// the response. Falls back to [`DEFAULT_TTWID`] on any failure.
pub async fn fetch_ttwid(client: &Client) -> String {
    fetch_ttwid_from(client, UNION_REGISTER_URL).await
}

async fn fetch_ttwid_from(client: &Client, register_url: &str) -> String {
    let payload = json!({
        "region": "cn",
        "aid": 6383,
        "needFid": false,
        "service": BASE_URL,
        "union": true,
        "fid": ""
    });

    let response = match client
        .post(register_url)
        .header(reqwest::header::USER_AGENT, DEFAULT_UA)
        .json(&payload)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            debug!("failed to fetch ttwid: {}", e);
            return DEFAULT_TTWID.to_string();
        }
    };

    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|header_value| {
            header_value.to_str().ok().and_then(|cookie_str| {
                if cookie_str.contains("ttwid=") {
                    cookie_str
                        .split(';')
                        .next()?
                        .split('=')
                        .nth(1)
                        .map(|value| value.to_string())
                } else {
                    None
                }
            })
        })
        .next()
        .unwrap_or_else(|| {
            debug!("no ttwid in register response, using default");
            DEFAULT_TTWID.to_string()
        })
}

/// Process-wide ttwid store. All strategies share one value so a batch of
/// parses does not hammer the register endpoint.
pub struct TtwidManager;

impl TtwidManager {
    pub fn get() -> Option<String> {
        GLOBAL_TTWID.lock().unwrap().clone()
    }

    pub fn set(ttwid: &str) {
        *GLOBAL_TTWID.lock().unwrap() = Some(ttwid.to_string());
    }

    pub fn clear() {
        *GLOBAL_TTWID.lock().unwrap() = None;
    }

    /// Returns the stored ttwid, fetching and storing one on first use.
    pub async fn ensure(client: &Client) -> String {
        if let Some(existing) = Self::get() {
            return existing;
        }

        debug!("fetching fresh ttwid");
        let ttwid = fetch_ttwid(client).await;
        Self::set(&ttwid);
        ttwid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_token_has_expected_shape() {
        let token = generate_ms_token();
        assert_eq!(token.len(), 184);
        assert!(token.bytes().all(|b| MS_TOKEN_CHARSET.contains(&b)));
    }

    #[test]
    fn nonce_and_odin_tt_are_hex() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 21);
        assert!(nonce.bytes().all(|b| HEX_CHARSET.contains(&b)));

        let odin = generate_odin_tt();
        assert_eq!(odin.len(), 160);
        assert!(odin.bytes().all(|b| HEX_CHARSET.contains(&b)));
    }

    #[test]
    fn x_bogus_uses_observed_alphabet() {
        let value = generate_x_bogus();
        assert_eq!(value.len(), 28);
        assert!(value.bytes().all(|b| X_BOGUS_CHARSET.contains(&b)));
    }

    #[test]
    fn tokens_are_not_repeated() {
        assert_ne!(generate_ms_token(), generate_ms_token());
    }

    #[test]
    fn ttwid_store_keeps_a_value() {
        // other tests write the shared store too, so only assert presence
        TtwidManager::set("ttwid-value");
        assert!(TtwidManager::get().is_some());
    }

    #[tokio::test]
    async fn fetch_ttwid_extracts_the_cookie() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).insert_header(
                "set-cookie",
                "ttwid=1%7Cfresh%7C123; Path=/; Domain=.bytedance.com; HttpOnly",
            ))
            .mount(&server)
            .await;

        let client = crate::session::default_client();
        let ttwid = fetch_ttwid_from(&client, &format!("{}/register/", server.uri())).await;
        assert_eq!(ttwid, "1%7Cfresh%7C123");
    }

    #[tokio::test]
    async fn fetch_ttwid_falls_back_without_cookie() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = crate::session::default_client();
        let ttwid = fetch_ttwid_from(&client, &format!("{}/register/", server.uri())).await;
        assert_eq!(ttwid, DEFAULT_TTWID);
    }
}
