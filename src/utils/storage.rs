use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method, Url};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::auth::generate_random_string;
use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

// RFC 3986 unreserved characters stay literal
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub const DEFAULT_IMAGE_FOLDER: &str = "image-upload";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage credentials are not configured")]
    MissingCredentials,
    #[error("storage bucket is not configured")]
    MissingBucket,
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("Invalid base64 image format")]
    InvalidImage,
    #[error("signing failed: {0}")]
    Signing(#[from] hmac::digest::InvalidLength),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage error: HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// `{success, message, data}` result returned by every storage call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StorageResult {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl StorageResult {
    fn ok(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// S3-compatible object storage signed with AWS Signature V4
pub struct ObjectStorage {
    client: Client,
    region: String,
    bucket: String,
    access_key_id: String,
    secret_access_key: String,
    // Path-style base when a custom endpoint is configured
    endpoint: Option<String>,
}

impl ObjectStorage {
    pub fn new(
        region: &str,
        bucket: &str,
        access_key_id: &str,
        secret_access_key: &str,
        endpoint: Option<&str>,
    ) -> Self {
        Self {
            client: Client::new(),
            region: region.to_string(),
            bucket: bucket.to_string(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let bucket = config.bucket.as_deref().ok_or(StorageError::MissingBucket)?;
        let (key_id, secret) = match (&config.access_key_id, &config.secret_access_key) {
            (Some(k), Some(s)) => (k, s),
            _ => return Err(StorageError::MissingCredentials),
        };
        Ok(Self::new(
            &config.region,
            bucket,
            key_id,
            secret,
            config.endpoint.as_deref(),
        ))
    }

    /// Upload a `data:image/<type>;base64,...` string
    pub async fn upload_base64_image(&self, image: &str, folder: Option<&str>) -> StorageResult {
        let result = async {
            let (file_type, bytes) = decode_data_url(image)?;
            let key = object_key(folder.unwrap_or(DEFAULT_IMAGE_FOLDER), &file_type);
            self.put_object(&key, bytes, &format!("image/{}", file_type)).await
        }
        .await;

        match result {
            Ok(data) => StorageResult::ok("Successfully uploaded your image!", data),
            Err(err) => {
                log::error!("Upload error: {}", err);
                StorageResult::failed("Unable to complete upload (Could be network)!")
            }
        }
    }

    /// Upload raw bytes under `folder`, naming the object after `original_name`'s extension
    pub async fn upload_file(
        &self,
        bytes: Vec<u8>,
        original_name: &str,
        folder: &str,
        content_type: Option<&str>,
    ) -> StorageResult {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let content_type = content_type.map(str::to_string).unwrap_or_else(|| {
            mime_guess::from_path(original_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });
        let key = object_key(folder, &ext);

        match self.put_object(&key, bytes, &content_type).await {
            Ok(data) => StorageResult::ok(format!("Uploaded {} file successfully.", folder), data),
            Err(err) => {
                log::error!("S3 Upload Error: {}", err);
                StorageResult::failed("Upload failed.")
            }
        }
    }

    pub async fn upload_image(&self, bytes: Vec<u8>, original_name: &str) -> StorageResult {
        self.upload_file(bytes, original_name, "images", None).await
    }

    pub async fn upload_video(&self, bytes: Vec<u8>, original_name: &str) -> StorageResult {
        self.upload_file(bytes, original_name, "videos", None).await
    }

    pub async fn upload_audio(&self, bytes: Vec<u8>, original_name: &str) -> StorageResult {
        self.upload_file(bytes, original_name, "audio", None).await
    }

    pub async fn delete_file(&self, key: &str, version_id: Option<&str>) -> StorageResult {
        let query: Vec<(&str, &str)> = version_id.map(|v| vec![("versionId", v)]).unwrap_or_default();
        match self.send(Method::DELETE, key, &query, Vec::new(), &[]).await {
            Ok(_) => StorageResult {
                success: true,
                message: "Successfully deleted file!".to_string(),
                data: None,
            },
            Err(err) => {
                log::error!("S3 delete error: {}", err);
                StorageResult::failed("Failed to delete file!")
            }
        }
    }

    pub async fn delete_files(&self, keys: &[String]) -> StorageResult {
        if keys.is_empty() {
            return StorageResult::failed("No keys provided.");
        }

        match self.delete_objects(keys).await {
            Ok(deleted) => StorageResult::ok("Files deleted successfully.", json!({ "Deleted": deleted })),
            Err(err) => {
                log::error!("S3 deleteObjects error: {}", err);
                StorageResult::failed("Failed to delete files.")
            }
        }
    }

    /// Delete every object whose key starts with `prefix`
    pub async fn delete_folder(&self, prefix: &str) -> StorageResult {
        let keys = match self.list_keys(prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                log::error!("Error deleting folder files: {}", err);
                return StorageResult::failed("Failed to delete files under prefix.");
            }
        };

        if keys.is_empty() {
            return StorageResult::failed("No files found under prefix.");
        }

        match self.delete_objects(&keys).await {
            Ok(deleted) => StorageResult::ok(
                format!("Deleted {} files.", deleted.len()),
                json!({ "Deleted": deleted }),
            ),
            Err(err) => {
                log::error!("Error deleting folder files: {}", err);
                StorageResult::failed("Failed to delete files under prefix.")
            }
        }
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<serde_json::Value, StorageError> {
        let headers = [("content-type", content_type), ("x-amz-acl", "public-read")];
        let (location, etag) = self.send(Method::PUT, key, &[], body, &headers).await?;
        Ok(json!({
            "Bucket": self.bucket,
            "Key": key,
            "Location": location,
            "ETag": etag,
        }))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let query = [("list-type", "2"), ("prefix", prefix)];
        let body = self.send_text(Method::GET, "", &query, Vec::new(), &[]).await?;
        Ok(extract_tags(&body, "Key"))
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<String>, StorageError> {
        let objects: String = keys
            .iter()
            .map(|k| format!("<Object><Key>{}</Key></Object>", xml_escape(k)))
            .collect();
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Delete><Quiet>false</Quiet>{}</Delete>",
            objects
        );
        let md5 = base64::engine::general_purpose::STANDARD.encode(md5::Md5::digest(body.as_bytes()));

        let headers = [("content-md5", md5.as_str()), ("content-type", "application/xml")];
        let response = self
            .send_text(Method::POST, "", &[("delete", "")], body.into_bytes(), &headers)
            .await?;

        let deleted_block: Vec<String> = extract_tags(&response, "Deleted");
        Ok(deleted_block
            .iter()
            .flat_map(|block| extract_tags(block, "Key"))
            .collect())
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, &str)],
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Result<(String, String), StorageError> {
        let (url, response) = self.execute(method, key, query, body, headers).await?;
        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok((url, etag))
    }

    async fn send_text(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, &str)],
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Result<String, StorageError> {
        let (_, response) = self.execute(method, key, query, body, headers).await?;
        Ok(response.text().await?)
    }

    async fn execute(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, &str)],
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Result<(String, reqwest::Response), StorageError> {
        let object_url = self.object_url(key)?;
        let mut url = object_url.clone();
        if !query.is_empty() {
            url.set_query(Some(&canonical_query(query)));
        }

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(&body));

        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(StorageError::Endpoint(url.to_string())),
        };

        let mut signed: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .collect();
        signed.push(("host".to_string(), host));
        signed.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
        signed.push(("x-amz-date".to_string(), amz_date.clone()));
        signed.sort();

        let authorization = self.authorization(
            method.as_str(),
            url.path(),
            &canonical_query(query),
            &signed,
            &payload_hash,
            &amz_date,
            &date,
        )?;

        let mut request = self.client.request(method, url).body(body);
        for (name, value) in signed.iter().filter(|(n, _)| n != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.header("authorization", authorization).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok((object_url.to_string(), response))
    }

    fn object_url(&self, key: &str) -> Result<Url, StorageError> {
        let encoded_key = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, URI_ENCODE).to_string())
            .collect::<Vec<_>>()
            .join("/");

        let raw = match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, encoded_key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded_key
            ),
        };
        Url::parse(&raw).map_err(|e| StorageError::Endpoint(e.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    fn authorization(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_query: &str,
        headers: &[(String, String)],
        payload_hash: &str,
        amz_date: &str,
        date: &str,
    ) -> Result<String, StorageError> {
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
        );

        let scope = format!("{}/{}/s3/aws4_request", date, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let key = signing_key(&self.secret_access_key, date, &self.region, "s3")?;
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key_id, scope, signed_headers, signature
        ))
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, StorageError> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, URI_ENCODE).to_string(),
                utf8_percent_encode(v, URI_ENCODE).to_string(),
            )
        })
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Split `data:image/<type>;base64,<payload>` into the type and decoded bytes
pub fn decode_data_url(image: &str) -> Result<(String, Vec<u8>), StorageError> {
    let rest = image.strip_prefix("data:image/").ok_or(StorageError::InvalidImage)?;
    let (file_type, payload) = rest.split_once(";base64,").ok_or(StorageError::InvalidImage)?;

    if file_type.is_empty() || !file_type.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StorageError::InvalidImage);
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| StorageError::InvalidImage)?;
    Ok((file_type.to_string(), bytes))
}

/// `<folder>/<random>-<millis>.<ext>`
pub fn object_key(folder: &str, ext: &str) -> String {
    format!(
        "{}/{}-{}.{}",
        folder.trim_matches('/'),
        generate_random_string(32),
        Utc::now().timestamp_millis(),
        ext
    )
}

fn extract_tags(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        match after.find(&close) {
            Some(end) => {
                out.push(xml_unescape(&after[..end]));
                rest = &after[end + close.len()..];
            }
            None => break,
        }
    }
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
