//! Browser-realistic request identities
//!
//! Each outgoing page request picks one client signature at random from a fixed pool.
//! A signature bundles a user agent with the client-hint headers a real browser of that
//! family would send, so the header set stays internally consistent.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use url::Url;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7",
    "en-GB,en;q=0.9,en-US;q=0.8",
];

/// One browser signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSignature {
    pub user_agent: &'static str,
    /// `Sec-Ch-Ua` value; `None` for browsers that do not send client hints
    pub sec_ch_ua: Option<&'static str>,
    pub platform: &'static str,
}

/// The fixed pool rotated through on every request
pub const CLIENT_SIGNATURES: &[ClientSignature] = &[
    ClientSignature {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        sec_ch_ua: Some(r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#),
        platform: r#""Windows""#,
    },
    ClientSignature {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
        sec_ch_ua: Some(r#""Not A(Brand";v="99", "Google Chrome";v="121", "Chromium";v="121""#),
        platform: r#""Windows""#,
    },
    ClientSignature {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        sec_ch_ua: Some(r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#),
        platform: r#""macOS""#,
    },
    ClientSignature {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
        sec_ch_ua: Some(r#""Not_A Brand";v="8", "Chromium";v="120", "Microsoft Edge";v="120""#),
        platform: r#""Windows""#,
    },
    ClientSignature {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        sec_ch_ua: None,
        platform: r#""Windows""#,
    },
    ClientSignature {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
        sec_ch_ua: None,
        platform: r#""macOS""#,
    },
];

/// Picks a random signature from the pool
pub fn random_signature<R: Rng + ?Sized>(rng: &mut R) -> ClientSignature {
    *CLIENT_SIGNATURES
        .choose(rng)
        .unwrap_or(&CLIENT_SIGNATURES[0])
}

/// Returns `scheme://host[:port]` for use as a Referer
pub fn origin_of(url: &Url) -> Option<String> {
    url.host_str().map(|host| match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Builds the full header set for one request to `url`
pub fn build_headers<R: Rng + ?Sized>(url: &Url, rng: &mut R) -> HeaderMap {
    let signature = random_signature(rng);
    let language = ACCEPT_LANGUAGES
        .choose(rng)
        .copied()
        .unwrap_or(ACCEPT_LANGUAGES[0]);

    let mut headers = HeaderMap::new();
    insert(&mut headers, reqwest::header::USER_AGENT, signature.user_agent);
    insert(&mut headers, ACCEPT, ACCEPT_HTML);
    insert(&mut headers, ACCEPT_LANGUAGE, language);
    insert(&mut headers, reqwest::header::UPGRADE_INSECURE_REQUESTS, "1");
    insert(&mut headers, reqwest::header::CACHE_CONTROL, "max-age=0");
    insert(&mut headers, HeaderName::from_static("sec-fetch-dest"), "document");
    insert(&mut headers, HeaderName::from_static("sec-fetch-mode"), "navigate");
    insert(&mut headers, HeaderName::from_static("sec-fetch-site"), "none");
    insert(&mut headers, HeaderName::from_static("sec-fetch-user"), "?1");

    if let Some(sec_ch_ua) = signature.sec_ch_ua {
        insert(&mut headers, HeaderName::from_static("sec-ch-ua"), sec_ch_ua);
        insert(&mut headers, HeaderName::from_static("sec-ch-ua-mobile"), "?0");
        insert(
            &mut headers,
            HeaderName::from_static("sec-ch-ua-platform"),
            signature.platform,
        );
    }

    if let Some(origin) = origin_of(url) {
        insert(&mut headers, REFERER, &origin);
    }

    headers
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    // Every value above is static ASCII or a parsed URL origin, skip anything else
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
