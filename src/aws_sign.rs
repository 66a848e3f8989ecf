//! AWS credentials and Signature Version 4 request signing.
//!
//! Shared by the EC2 (query API, signed `GET`) and ECS (JSON API, signed
//! `POST`) sources. Uses only pure-Rust dependencies (`hmac`, `sha2`,
//! `hex`) for signing.
//!
//! # Credentials
//!
//! Values set in the source's config win; anything missing is read from
//! the environment:
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials)

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::AwsCredentialsConfig;

type HmacSha256 = Hmac<Sha256>;

/// Resolved AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentials {
    /// Merge configured credentials with the `AWS_*` environment variables.
    pub fn resolve(config: &AwsCredentialsConfig) -> Result<Self> {
        let access_key_id = match &config.access_key_id {
            Some(v) => v.clone(),
            None => std::env::var("AWS_ACCESS_KEY_ID")
                .context("access_key_id not configured and AWS_ACCESS_KEY_ID not set")?,
        };
        let secret_access_key = match &config.secret_access_key {
            Some(v) => v.clone(),
            None => std::env::var("AWS_SECRET_ACCESS_KEY")
                .context("secret_access_key not configured and AWS_SECRET_ACCESS_KEY not set")?,
        };
        let session_token = config
            .session_token
            .clone()
            .or_else(|| std::env::var("AWS_SESSION_TOKEN").ok());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// The parts of an HTTP request that go into a SigV4 signature.
#[derive(Debug, Clone)]
pub struct RequestToSign<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    /// Unencoded query parameters, in any order.
    pub query: &'a [(String, String)],
    /// Extra headers to sign (e.g. `content-type`, `x-amz-target`).
    pub headers: &'a [(String, String)],
    pub payload: &'a [u8],
}

/// Sign `req` and return the headers to attach to it: `x-amz-date`,
/// `x-amz-security-token` when a session token is present, and
/// `authorization`.
pub fn sign_request(
    creds: &AwsCredentials,
    req: &RequestToSign<'_>,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers: Vec<(String, String)> = vec![
        ("host".to_string(), req.host.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    for (k, v) in req.headers {
        headers.push((k.to_lowercase(), v.trim().to_string()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        req.method,
        req.path,
        canonical_query(req.query),
        canonical_headers,
        signed_headers,
        hex_sha256(req.payload)
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, region, service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, service);
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    let mut out = vec![("x-amz-date".to_string(), amz_date)];
    if let Some(ref token) = creds.session_token {
        out.push(("x-amz-security-token".to_string(), token.clone()));
    }
    out.push(("authorization".to_string(), authorization));
    out
}

/// Sorted, RFC 3986 encoded `k=v&k=v` query string.
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// URI-encode everything except `A-Z a-z 0-9 - _ . ~`.
pub fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Where one AWS service is reached: region, scheme and host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub service: &'static str,
    pub region: String,
    pub scheme: &'static str,
    pub host: String,
}

impl ServiceEndpoint {
    /// `https://<service>.<region>.amazonaws.com`, unless `endpoint_url`
    /// overrides it (LocalStack and friends).
    pub fn new(service: &'static str, region: &str, endpoint_url: Option<&str>) -> Self {
        match endpoint_url {
            Some(url) => {
                let scheme = if url.starts_with("http://") { "http" } else { "https" };
                let host = url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                Self {
                    service,
                    region: region.to_string(),
                    scheme,
                    host,
                }
            }
            None => Self {
                service,
                region: region.to_string(),
                scheme: "https",
                host: format!("{}.{}.amazonaws.com", service, region),
            },
        }
    }

    pub fn url(&self) -> String {
        format!("{}://{}/", self.scheme, self.host)
    }
}

/// Send a signed request to `endpoint` and return the response body.
///
/// Non-2xx responses become errors carrying the status and the start of
/// the body, which is where AWS puts its error code.
pub async fn send_signed(
    client: &reqwest::Client,
    endpoint: &ServiceEndpoint,
    creds: &AwsCredentials,
    method: reqwest::Method,
    query: &[(String, String)],
    headers: &[(String, String)],
    body: Vec<u8>,
) -> Result<String> {
    let req = RequestToSign {
        method: method.as_str(),
        host: &endpoint.host,
        path: "/",
        query,
        headers,
        payload: &body,
    };
    let signed = sign_request(creds, &req, &endpoint.region, endpoint.service, Utc::now());

    let mut url = endpoint.url();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&canonical_query(query));
    }

    let mut builder = client.request(method, &url);
    for (k, v) in headers.iter().chain(signed.iter()) {
        builder = builder.header(k.as_str(), v.as_str());
    }
    if !body.is_empty() {
        builder = builder.body(body);
    }

    let resp = builder
        .send()
        .await
        .with_context(|| format!("Failed to reach {} at {}", endpoint.service, endpoint.host))?;

    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        bail!(
            "{} request failed (HTTP {}): {}",
            endpoint.service,
            status,
            text.chars().take(500).collect::<String>()
        );
    }
    Ok(text)
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}
