//! CloudFront invalidation provider.
//!
//! Talks to the CloudFront REST API directly over `reqwest`, signing each
//! request with AWS Signature Version 4. CloudFront is a global service:
//! requests are signed for `us-east-1` regardless of where the content
//! lives.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::macros::format_description;
use url::Url;

use crate::config::ProviderSettings;
use crate::invalidation::{
    InvalidationBatch, InvalidationProvider, InvalidationReceipt, ProviderError,
};

use super::error::InfraError;

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2020-05-31";
const SIGNING_REGION: &str = "us-east-1";
const SIGNING_SERVICE: &str = "cloudfront";
const SIGNED_HEADERS: &str = "host;x-amz-date";

/// CloudFront-backed [`InvalidationProvider`].
pub struct CloudFrontProvider {
    client: Client,
    endpoint: String,
    host: String,
    access_key_id: String,
    secret_access_key: String,
}

impl CloudFrontProvider {
    /// Build a provider from settings.
    ///
    /// Missing or empty credentials are a configuration error, reported
    /// before any queue work happens.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, InfraError> {
        if settings.access_key_id.trim().is_empty() {
            return Err(InfraError::configuration("provider.access_key_id is not set"));
        }
        if settings.secret_access_key.trim().is_empty() {
            return Err(InfraError::configuration(
                "provider.secret_access_key is not set",
            ));
        }

        let endpoint = settings.endpoint.trim_end_matches('/').to_string();
        let host = host_of(&endpoint).ok_or_else(|| {
            InfraError::configuration(format!(
                "provider.endpoint `{}` is not a valid URL",
                settings.endpoint
            ))
        })?;

        Ok(Self {
            client: Client::new(),
            endpoint,
            host,
            access_key_id: settings.access_key_id.clone(),
            secret_access_key: settings.secret_access_key.clone(),
        })
    }

    async fn send(&self, method: Method, path: String, body: String) -> Result<String, ProviderError> {
        let now = OffsetDateTime::now_utc();
        let (amz_date, date) = amz_timestamps(now)?;

        let payload_hash = sha256_hex(body.as_bytes());
        let canonical = canonical_request(method.as_str(), &path, &self.host, &amz_date, &payload_hash);
        let signing_key = derive_signing_key(&self.secret_access_key, &date);
        let signature = hex::encode(hmac_sha256(
            &signing_key,
            &string_to_sign(&amz_date, &date, &canonical),
        ));
        let authorization = authorization_header(&self.access_key_id, &date, &signature);

        let url = format!("{}{path}", self.endpoint);
        let mut request = self
            .client
            .request(method, &url)
            .header("x-amz-date", &amz_date)
            .header("authorization", &authorization);
        if !body.is_empty() {
            request = request.header("content-type", "text/xml").body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        if status.is_success() {
            Ok(text)
        } else {
            // Surface the provider's own message verbatim when it sent one.
            let message = xml_text(&text, "Message")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{status}: {text}"));
            Err(ProviderError::Rejected(message))
        }
    }
}

#[async_trait]
impl InvalidationProvider for CloudFrontProvider {
    async fn submit_batch(
        &self,
        batch: &InvalidationBatch,
    ) -> Result<InvalidationReceipt, ProviderError> {
        let path = format!(
            "/{API_VERSION}/distribution/{}/invalidation",
            batch.distribution_id
        );
        let body = invalidation_batch_xml(&batch.paths, &batch.caller_reference);
        let response = self.send(Method::POST, path, body).await?;

        let invalidation_id = xml_text(&response, "Id").map(str::to_string).unwrap_or_default();
        let status = xml_text(&response, "Status")
            .map(str::to_string)
            .unwrap_or_else(|| "InProgress".to_string());

        Ok(InvalidationReceipt {
            invalidation_id,
            status,
        })
    }

    async fn distribution_domain(&self, distribution_id: &str) -> Result<String, ProviderError> {
        let path = format!("/{API_VERSION}/distribution/{distribution_id}");
        let response = self.send(Method::GET, path, String::new()).await?;

        xml_text(&response, "DomainName")
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::Rejected(
                    "distribution response did not include a domain name".to_string(),
                )
            })
    }
}

fn host_of(endpoint: &str) -> Option<String> {
    let parsed = Url::parse(endpoint).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn amz_timestamps(now: OffsetDateTime) -> Result<(String, String), ProviderError> {
    let stamp_format = format_description!("[year][month][day]T[hour][minute][second]Z");
    let amz_date = now
        .format(stamp_format)
        .map_err(|err| ProviderError::Transport(format!("timestamp formatting failed: {err}")))?;
    let date = amz_date[..8].to_string();
    Ok((amz_date, date))
}

/// Render the invalidation batch document the CloudFront API expects.
fn invalidation_batch_xml(paths: &[String], caller_reference: &str) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<InvalidationBatch xmlns=\"http://cloudfront.amazonaws.com/doc/{API_VERSION}/\">\n"
    ));
    xml.push_str("  <Paths>\n");
    xml.push_str(&format!("    <Quantity>{}</Quantity>\n", paths.len()));
    xml.push_str("    <Items>\n");
    for path in paths {
        xml.push_str(&format!("      <Path>{}</Path>\n", xml_escape(path)));
    }
    xml.push_str("    </Items>\n");
    xml.push_str("  </Paths>\n");
    xml.push_str(&format!(
        "  <CallerReference>{}</CallerReference>\n",
        xml_escape(caller_reference)
    ));
    xml.push_str("</InvalidationBatch>\n");
    xml
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// First text content of `<tag>...</tag>` in `body`.
///
/// The CloudFront responses are flat enough that a full XML parser buys
/// nothing here.
fn xml_text<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(&body[start..end])
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Derive the SigV4 signing key: AWS4 + secret, chained through date,
/// region, service, and the terminal `aws4_request` marker.
fn derive_signing_key(secret_key: &str, date: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{secret_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date);
    let k_region = hmac_sha256(&k_date, SIGNING_REGION);
    let k_service = hmac_sha256(&k_region, SIGNING_SERVICE);
    hmac_sha256(&k_service, "aws4_request")
}

fn canonical_request(
    method: &str,
    path: &str,
    host: &str,
    amz_date: &str,
    payload_hash: &str,
) -> String {
    format!(
        "{method}\n{path}\n\nhost:{host}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}"
    )
}

fn string_to_sign(amz_date: &str, date: &str, canonical: &str) -> String {
    let scope = format!("{date}/{SIGNING_REGION}/{SIGNING_SERVICE}/aws4_request");
    format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical.as_bytes())
    )
}

fn authorization_header(access_key_id: &str, date: &str, signature: &str) -> String {
    format!(
        "AWS4-HMAC-SHA256 Credential={access_key_id}/{date}/{SIGNING_REGION}/{SIGNING_SERVICE}/aws4_request, SignedHeaders={SIGNED_HEADERS}, Signature={signature}"
    )
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn batch_xml_carries_quantity_items_and_reference() {
        let paths = vec!["/posts/foo".to_string(), "/videos/?gid=a&b".to_string()];
        let xml = invalidation_batch_xml(&paths, "spurgo-1714565000");

        assert!(xml.contains("<Quantity>2</Quantity>"));
        assert!(xml.contains("<Path>/posts/foo</Path>"));
        assert!(xml.contains("<Path>/videos/?gid=a&amp;b</Path>"));
        assert!(xml.contains("<CallerReference>spurgo-1714565000</CallerReference>"));
        assert!(xml.contains(&format!(
            "http://cloudfront.amazonaws.com/doc/{API_VERSION}/"
        )));
    }

    #[test]
    fn xml_text_extracts_the_first_tag_body() {
        let body = "<Invalidation><Id>I2J0V9</Id><Status>InProgress</Status></Invalidation>";

        assert_eq!(xml_text(body, "Id"), Some("I2J0V9"));
        assert_eq!(xml_text(body, "Status"), Some("InProgress"));
        assert_eq!(xml_text(body, "Message"), None);
    }

    #[test]
    fn canonical_request_has_the_sigv4_shape() {
        let canonical = canonical_request(
            "POST",
            "/2020-05-31/distribution/E2EXAMPLE/invalidation",
            "cloudfront.amazonaws.com",
            "20240501T120000Z",
            "abc123",
        );

        assert_eq!(
            canonical,
            "POST\n/2020-05-31/distribution/E2EXAMPLE/invalidation\n\n\
             host:cloudfront.amazonaws.com\nx-amz-date:20240501T120000Z\n\n\
             host;x-amz-date\nabc123"
        );
    }

    #[test]
    fn signing_is_deterministic_and_secret_dependent() {
        let canonical = canonical_request("GET", "/", "cloudfront.amazonaws.com", "20240501T120000Z", "e3b0");
        let to_sign = string_to_sign("20240501T120000Z", "20240501", &canonical);

        let key_a = derive_signing_key("secret-a", "20240501");
        let key_b = derive_signing_key("secret-b", "20240501");

        let sig_a1 = hex::encode(hmac_sha256(&key_a, &to_sign));
        let sig_a2 = hex::encode(hmac_sha256(&key_a, &to_sign));
        let sig_b = hex::encode(hmac_sha256(&key_b, &to_sign));

        assert_eq!(sig_a1, sig_a2);
        assert_ne!(sig_a1, sig_b);
        assert_eq!(sig_a1.len(), 64);
    }

    #[test]
    fn timestamps_use_the_compact_amz_format() {
        let (amz_date, date) = amz_timestamps(datetime!(2024-05-01 12:00:00 UTC)).unwrap();

        assert_eq!(amz_date, "20240501T120000Z");
        assert_eq!(date, "20240501");
    }

    #[test]
    fn host_keeps_a_non_default_port() {
        assert_eq!(
            host_of("https://cloudfront.amazonaws.com"),
            Some("cloudfront.amazonaws.com".to_string())
        );
        assert_eq!(
            host_of("http://127.0.0.1:8080"),
            Some("127.0.0.1:8080".to_string())
        );
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn missing_credentials_fail_construction() {
        let settings = ProviderSettings {
            access_key_id: String::new(),
            ..ProviderSettings::default()
        };

        assert!(CloudFrontProvider::from_settings(&settings).is_err());
    }
}
