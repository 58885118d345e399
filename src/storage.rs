//! Azure Blob Storage object store.
//!
//! Writes uploads and signs read-only URLs using the Blob REST API directly.
//! Requests are authenticated with the
//! [Shared Key](https://learn.microsoft.com/rest/api/storageservices/authorize-with-shared-key)
//! scheme and read URLs are
//! [service SAS](https://learn.microsoft.com/rest/api/storageservices/create-service-sas)
//! tokens, both computed with HMAC-SHA256 (`hmac` + `sha2`) keyed by the
//! base64-decoded account key.
//!
//! # Connection strings
//!
//! ```text
//! DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=...;EndpointSuffix=core.windows.net
//! ```
//!
//! `BlobEndpoint=` (Azurite, sovereign clouds) is honoured, and
//! `storage.endpoint_url` in the config file overrides both.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;

use crate::config::{Secrets, StorageConfig};
use crate::models::{Permission, UploadedResource};

/// Blob service REST version used for Shared Key requests and SAS tokens.
pub const STORAGE_API_VERSION: &str = "2020-12-06";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage configuration: {0}")]
    Config(String),
    #[error("blob service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("blob service request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// The object-storage collaborator.
///
/// `sign_read_url` can only produce read-only URLs; there is no way to ask a
/// store for a write or delete grant.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    fn sign_read_url(&self, key: &str, expires_at: DateTime<Utc>) -> Result<String, StorageError>;
}

/// Store `body` under a freshly derived, collision-free key.
pub async fn upload_resource(
    store: &dyn ObjectStore,
    original_name: &str,
    body: Vec<u8>,
    content_type: &str,
) -> Result<UploadedResource, StorageError> {
    let resource = UploadedResource::new(original_name);
    let size = body.len();
    store.put(&resource.storage_key, body, content_type).await?;
    tracing::info!(
        resource_id = %resource.id,
        storage_key = %resource.storage_key,
        bytes = size,
        "uploaded resource"
    );
    Ok(resource)
}

// ============ Azure Blob Store ============

pub struct AzureBlobStore {
    account: String,
    key: Vec<u8>,
    /// Service base URL without a trailing slash, e.g. `https://acme.blob.core.windows.net`.
    base_url: String,
    container: String,
    client: reqwest::Client,
}

impl AzureBlobStore {
    pub fn new(config: &StorageConfig, secrets: &Secrets) -> Result<Self, StorageError> {
        let conn = ConnectionString::parse(&secrets.blob_connection_string)?;

        let encoded_key = secrets
            .blob_key_override
            .clone()
            .or_else(|| conn.account_key.clone())
            .ok_or_else(|| {
                StorageError::Config(
                    "no AccountKey in connection string and AZURE_BLOB_KEY not set".to_string(),
                )
            })?;
        let key = BASE64
            .decode(encoded_key.trim())
            .map_err(|e| StorageError::Config(format!("account key is not valid base64: {}", e)))?;

        let base_url = config
            .endpoint_url
            .clone()
            .unwrap_or_else(|| conn.blob_endpoint())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            account: conn.account_name,
            key,
            base_url,
            container: config.container.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn blob_url(&self, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        format!("{}/{}/{}", self.base_url, uri_encode(&self.container), encoded_key)
    }

    /// `/{account}{url-path}` as required by Shared Key.
    fn canonical_resource(&self, url: &str) -> Result<String, StorageError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| StorageError::Config(format!("invalid blob URL '{}': {}", url, e)))?;
        Ok(format!("/{}{}", self.account, parsed.path()))
    }

    fn authorize(&self, string_to_sign: &str) -> String {
        format!(
            "SharedKey {}:{}",
            self.account,
            BASE64.encode(hmac_sha256(&self.key, string_to_sign.as_bytes()))
        )
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let url = self.blob_url(key);
        let ms_date = rfc1123_now();
        let ms_headers = vec![
            ("x-ms-blob-type".to_string(), "BlockBlob".to_string()),
            ("x-ms-date".to_string(), ms_date.clone()),
            ("x-ms-version".to_string(), STORAGE_API_VERSION.to_string()),
        ];
        let string_to_sign = shared_key_string_to_sign(
            "PUT",
            body.len(),
            content_type,
            &ms_headers,
            &self.canonical_resource(&url)?,
        );

        let resp = self
            .client
            .put(&url)
            .header("Authorization", self.authorize(&string_to_sign))
            .header("Content-Type", content_type)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-date", &ms_date)
            .header("x-ms-version", STORAGE_API_VERSION)
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Http {
                status,
                body: body.chars().take(500).collect(),
            });
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let url = self.blob_url(key);
        let ms_date = rfc1123_now();
        let ms_headers = vec![
            ("x-ms-date".to_string(), ms_date.clone()),
            ("x-ms-version".to_string(), STORAGE_API_VERSION.to_string()),
        ];
        let string_to_sign =
            shared_key_string_to_sign("HEAD", 0, "", &ms_headers, &self.canonical_resource(&url)?);

        let resp = self
            .client
            .head(&url)
            .header("Authorization", self.authorize(&string_to_sign))
            .header("x-ms-date", &ms_date)
            .header("x-ms-version", STORAGE_API_VERSION)
            .send()
            .await?;

        match resp.status().as_u16() {
            200..=299 => Ok(true),
            404 => Ok(false),
            status => Err(StorageError::Http {
                status,
                body: String::new(),
            }),
        }
    }

    fn sign_read_url(&self, key: &str, expires_at: DateTime<Utc>) -> Result<String, StorageError> {
        let protocol = if self.base_url.starts_with("http://") {
            "https,http"
        } else {
            "https"
        };
        let token = SasToken {
            account: &self.account,
            container: &self.container,
            blob: key,
            permission: Permission::Read,
            expires_at,
            protocol,
        };
        Ok(format!("{}?{}", self.blob_url(key), token.query(&self.key)))
    }
}

// ============ Connection string ============

#[derive(Debug)]
struct ConnectionString {
    account_name: String,
    account_key: Option<String>,
    protocol: String,
    endpoint_suffix: String,
    blob_endpoint: Option<String>,
}

impl ConnectionString {
    fn parse(s: &str) -> Result<Self, StorageError> {
        let mut parts: HashMap<String, String> = HashMap::new();
        for segment in s.split(';').filter(|p| !p.trim().is_empty()) {
            let (k, v) = segment.split_once('=').ok_or_else(|| {
                StorageError::Config(format!("malformed connection string segment '{}'", segment))
            })?;
            parts.insert(k.trim().to_string(), v.trim().to_string());
        }

        let account_name = parts
            .remove("AccountName")
            .ok_or_else(|| StorageError::Config("connection string has no AccountName".into()))?;

        Ok(Self {
            account_name,
            account_key: parts.remove("AccountKey"),
            protocol: parts
                .remove("DefaultEndpointsProtocol")
                .unwrap_or_else(|| "https".to_string()),
            endpoint_suffix: parts
                .remove("EndpointSuffix")
                .unwrap_or_else(|| "core.windows.net".to_string()),
            blob_endpoint: parts.remove("BlobEndpoint"),
        })
    }

    fn blob_endpoint(&self) -> String {
        self.blob_endpoint.clone().unwrap_or_else(|| {
            format!(
                "{}://{}.blob.{}",
                self.protocol, self.account_name, self.endpoint_suffix
            )
        })
    }
}

// ============ Signing ============

/// A blob-scoped service SAS.
struct SasToken<'a> {
    account: &'a str,
    container: &'a str,
    blob: &'a str,
    permission: Permission,
    expires_at: DateTime<Utc>,
    protocol: &'a str,
}

impl SasToken<'_> {
    fn expiry(&self) -> String {
        self.expires_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// The sixteen newline-separated fields of the service SAS string-to-sign.
    /// Unused fields are empty.
    fn string_to_sign(&self) -> String {
        let canonical_resource = format!("/blob/{}/{}/{}", self.account, self.container, self.blob);
        [
            self.permission.sas_letter(),
            "",
            &self.expiry(),
            &canonical_resource,
            "",
            "",
            self.protocol,
            STORAGE_API_VERSION,
            "b",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
        ]
        .join("\n")
    }

    fn query(&self, key: &[u8]) -> String {
        let signature = BASE64.encode(hmac_sha256(key, self.string_to_sign().as_bytes()));
        format!(
            "sv={}&se={}&sr=b&sp={}&spr={}&sig={}",
            STORAGE_API_VERSION,
            uri_encode(&self.expiry()),
            self.permission.sas_letter(),
            uri_encode(self.protocol),
            uri_encode(&signature)
        )
    }
}

/// Shared Key string-to-sign for the Blob service (version 2015-02-21+).
///
/// ```text
/// VERB\nContent-Encoding\nContent-Language\nContent-Length\nContent-MD5\nContent-Type\n
/// Date\nIf-Modified-Since\nIf-Match\nIf-None-Match\nIf-Unmodified-Since\nRange\n
/// CanonicalizedHeaders CanonicalizedResource
/// ```
fn shared_key_string_to_sign(
    verb: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(String, String)],
    canonical_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut headers = ms_headers.to_vec();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k.to_lowercase(), v.trim()))
        .collect();

    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}{}",
        verb, length, content_type, canonical_headers, canonical_resource
    )
}

fn rfc1123_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// URI-encode a string per RFC 3986, leaving only `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
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
