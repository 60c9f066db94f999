//! Object storage for receipt files.
//!
//! Files are stored under their public id. Uploads are best effort from the
//! pipeline's point of view; this module only reports what went wrong.

use std::path::{Path, PathBuf};
use chrono::Utc;
use reqwest::blocking::multipart::Form;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use crate::config::CloudConfig;
use crate::id::PublicId;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("file to upload does not exist: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upload rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

pub trait Uploader {
    fn upload(&mut self, file: &Path, public_id: &PublicId) -> Result<(), UploadError>;
}

/// Signs upload parameters: sorted `key=value` pairs joined with `&`, followed
/// by the API secret, hashed with SHA-256.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Signed uploads to a Cloudinary account.
pub struct CloudinaryUploader {
    http: Client,
    endpoint: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryUploader {
    pub fn new(config: &CloudConfig) -> Result<Self, UploadError> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn form(&self, file: &Path, public_id: &PublicId) -> Result<Form, UploadError> {
        let timestamp = Utc::now().timestamp().to_string();
        let public_id = public_id.to_string();
        let signature = sign_params(
            &[("public_id", public_id.clone()), ("timestamp", timestamp.clone())],
            &self.api_secret,
        );

        let form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("public_id", public_id)
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        form.file("file", file).map_err(|source| UploadError::Io {
            path: file.to_path_buf(),
            source,
        })
    }
}

impl Uploader for CloudinaryUploader {
    fn upload(&mut self, file: &Path, public_id: &PublicId) -> Result<(), UploadError> {
        if !file.is_file() {
            return Err(UploadError::MissingFile(file.to_path_buf()));
        }

        let form = self.form(file, public_id)?;
        let response = self.http.post(&self.endpoint).multipart(form).send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().unwrap_or_default();
        Err(UploadError::Rejected {
            status: status.as_u16(),
            message: rejection_message(&body),
        })
    }
}

// Cloudinary reports failures as {"error": {"message": "..."}}
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
