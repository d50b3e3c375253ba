//! Trail-imagery host client.
//!
//! Upload takes the bare file; coordinates are set by a separate move call
//! right after, since the upload endpoint ignores them.

use reqwest::blocking::{multipart, Client};
use serde_json::Value;
use tracing::{info, warn};

use super::{
    check, check_delete, http_client, BackendClient, Credential, PhotoRef, PhotoUpload, RemotePhoto,
};
use crate::domain::{Backend, GeoDecimal};
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://opentrailview.org/oauth/api";

pub struct TrailClient {
    http: Client,
    base_url: String,
    credential: Credential,
}

impl TrailClient {
    pub fn new(credential: Credential, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            credential,
        })
    }
}

impl BackendClient for TrailClient {
    fn backend(&self) -> Backend {
        Backend::TrailHost
    }

    fn credential(&self) -> &Credential {
        &self.credential
    }

    fn upload_photo(&self, upload: &PhotoUpload<'_>) -> Result<RemotePhoto> {
        let token = self.authorize("upload photos")?;
        let photo = upload.photo;

        let form = multipart::Form::new().file("file", &photo.path)?;
        let resp = self
            .http
            .post(upload_url(&self.base_url))
            .bearer_auth(token)
            .multipart(form)
            .send()?;
        let body: Value = check(Backend::TrailHost, resp)?.json()?;
        let id = parse_pano_id(&body)?;
        info!(photo_id = %photo.photo_id, remote_id = %id, "trail photo uploaded");

        if let Err(err) = self.move_photo(&id, &photo.latitude, &photo.longitude) {
            warn!(photo_id = %photo.photo_id, remote_id = %id, error = %err, "could not position trail photo");
        }

        Ok(RemotePhoto {
            id,
            ..Default::default()
        })
    }

    fn move_photo(&self, remote_photo_id: &str, lat: &GeoDecimal, lon: &GeoDecimal) -> Result<()> {
        let token = self.authorize("move photos")?;
        let resp = self
            .http
            .post(move_url(&self.base_url, remote_photo_id))
            .bearer_auth(token)
            .form(&move_form(lat, lon))
            .send()?;
        check(Backend::TrailHost, resp)?;
        Ok(())
    }

    fn delete_photo(&self, target: &PhotoRef<'_>) -> Result<bool> {
        let token = self.authorize("delete photos")?;
        let resp = self
            .http
            .delete(photo_url(&self.base_url, target.remote_photo_id))
            .bearer_auth(token)
            .send()?;
        check_delete(Backend::TrailHost, resp)
    }
}

pub fn upload_url(base_url: &str) -> String {
    format!("{base_url}/panorama/upload")
}

pub fn photo_url(base_url: &str, pano_id: &str) -> String {
    format!("{base_url}/panorama/{pano_id}")
}

pub fn move_url(base_url: &str, pano_id: &str) -> String {
    format!("{base_url}/panorama/{pano_id}/move")
}

/// Coordinates go over the wire exactly as stored.
pub fn move_form(lat: &GeoDecimal, lon: &GeoDecimal) -> [(&'static str, String); 2] {
    [("lat", lat.as_str().to_string()), ("lon", lon.as_str().to_string())]
}

pub fn parse_pano_id(body: &Value) -> Result<String> {
    body.get("id")
        .and_then(super::id_string)
        .ok_or_else(|| Error::Protocol("trail upload response has no id".into()))
}
