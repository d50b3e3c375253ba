//! Panorama host client (Street View Publish REST surface).

use reqwest::blocking::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{
    check, check_delete, http_client, id_string, num_field, str_field, BackendClient, Credential,
    PanoramaInfo, PhotoRef, PhotoUpload, RemotePhoto, TourRef,
};
use crate::domain::Backend;
use crate::error::{Error, Result};
use crate::upload::{
    chunk_headers, start_headers, Chunk, ResumableUpload, ThreadSleeper, UploadTransport,
    HEADER_SESSION_URL,
};

pub const DEFAULT_BASE_URL: &str = "https://streetviewpublish.googleapis.com/v1";

pub struct PanoramaClient {
    http: Client,
    base_url: String,
    credential: Credential,
}

impl PanoramaClient {
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

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Ask for an upload reference; the bytes go to the returned URL.
    fn start_upload(&self, token: &str) -> Result<String> {
        let resp = self
            .http
            .post(self.url("photo:startUpload"))
            .bearer_auth(token)
            .json(&json!({}))
            .send()?;
        let body: Value = check(Backend::PanoramaHost, resp)?.json()?;
        str_field(&body, "uploadUrl")
            .ok_or_else(|| Error::Protocol("startUpload response has no uploadUrl".into()))
    }
}

impl BackendClient for PanoramaClient {
    fn backend(&self) -> Backend {
        Backend::PanoramaHost
    }

    fn credential(&self) -> &Credential {
        &self.credential
    }

    fn verify(&self) -> Result<()> {
        let token = self.authorize("verify credentials")?;
        let resp = self
            .http
            .get(self.url("photos?view=BASIC&pageSize=1"))
            .bearer_auth(token)
            .send()?;
        check(Backend::PanoramaHost, resp).map(|_| ())
    }

    fn upload_photo(&self, upload: &PhotoUpload<'_>) -> Result<RemotePhoto> {
        let token = self.authorize("upload photos")?;
        let photo = upload.photo;

        let upload_url = self.start_upload(token)?;
        let mut transport = HttpTransport {
            http: &self.http,
            token,
        };
        ResumableUpload::new(&mut transport, &mut ThreadSleeper).run(&upload_url, &photo.path)?;

        let body = create_photo_body(&upload_url, photo.taken.timestamp());
        let resp = self
            .http
            .post(self.url("photo"))
            .bearer_auth(token)
            .json(&body)
            .send()?;
        let created: Value = check(Backend::PanoramaHost, resp)?.json()?;
        let remote = parse_created_photo(&created)?;

        info!(photo_id = %photo.photo_id, remote_id = %remote.id, "panorama photo uploaded");
        Ok(remote)
    }

    fn delete_photo(&self, target: &PhotoRef<'_>) -> Result<bool> {
        let token = self.authorize("delete photos")?;
        let resp = self
            .http
            .delete(self.url(&format!("photo/{}", target.remote_photo_id)))
            .bearer_auth(token)
            .send()?;
        check_delete(Backend::PanoramaHost, resp)
    }

    /// No tour record here: delete the tour's photos in one batch.
    fn delete_tour(&self, target: &TourRef<'_>) -> Result<bool> {
        let token = self.authorize("delete tours")?;
        if target.photo_ids.is_empty() {
            return Ok(true);
        }
        let resp = self
            .http
            .post(self.url("photos:batchDelete"))
            .bearer_auth(token)
            .json(&json!({ "photoIds": target.photo_ids }))
            .send()?;
        let resp = match check(Backend::PanoramaHost, resp) {
            Ok(resp) => resp,
            Err(Error::Rejected { status, message, .. }) => {
                warn!(status, %message, "panorama batch delete refused");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        let body: Value = resp.json()?;
        Ok(batch_delete_succeeded(&body))
    }

    fn photo_info(&self, remote_photo_ids: &[String]) -> Result<Vec<PanoramaInfo>> {
        let token = self.authorize("fetch photo status")?;
        if remote_photo_ids.is_empty() {
            return Ok(Vec::new());
        }
        let resp = self
            .http
            .get(batch_get_url(&self.base_url, remote_photo_ids))
            .bearer_auth(token)
            .send()?;
        let body: Value = check(Backend::PanoramaHost, resp)?.json()?;
        let infos = parse_batch_get(&body);
        debug!(requested = remote_photo_ids.len(), received = infos.len(), "panorama status fetched");
        Ok(infos)
    }
}

/// Sends the resumable protocol over HTTP.
struct HttpTransport<'a> {
    http: &'a Client,
    token: &'a str,
}

impl UploadTransport for HttpTransport<'_> {
    fn start(&mut self, upload_url: &str, total: u64, content_type: &str) -> Result<String> {
        let mut req = self.http.post(upload_url).bearer_auth(self.token);
        for (name, value) in start_headers(total, content_type) {
            req = req.header(name, value);
        }
        let resp = check(Backend::PanoramaHost, req.send()?)?;
        resp.headers()
            .get(HEADER_SESSION_URL)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| Error::Protocol(format!("upload start response has no {HEADER_SESSION_URL}")))
    }

    fn send_chunk(&mut self, session_url: &str, chunk: &Chunk, body: Vec<u8>) -> Result<()> {
        let mut req = self.http.post(session_url).bearer_auth(self.token);
        for (name, value) in chunk_headers(chunk) {
            req = req.header(name, value);
        }
        check(Backend::PanoramaHost, req.body(body).send()?)?;
        Ok(())
    }
}

// ── Wire shapes ──────────────────────────────────────────────────

/// Body of the create-photo call referencing a finished upload.
pub fn create_photo_body(upload_url: &str, capture_seconds: i64) -> Value {
    json!({
        "uploadReference": { "uploadUrl": upload_url },
        "captureTime": { "seconds": capture_seconds },
    })
}

pub fn parse_created_photo(body: &Value) -> Result<RemotePhoto> {
    let id = body
        .get("photoId")
        .and_then(|p| p.get("id"))
        .and_then(id_string)
        .ok_or_else(|| Error::Protocol("created photo has no photoId".into()))?;
    Ok(RemotePhoto {
        id,
        share_link: str_field(body, "shareLink"),
        download_url: str_field(body, "downloadUrl"),
        thumbnail_url: str_field(body, "thumbnailUrl"),
    })
}

pub fn batch_get_url(base_url: &str, ids: &[String]) -> String {
    let query: Vec<String> = ids.iter().map(|id| format!("photoIds={id}")).collect();
    format!("{}/photos:batchGet?{}&view=BASIC", base_url.trim_end_matches('/'), query.join("&"))
}

/// Entries carrying an error status are skipped.
pub fn parse_batch_get(body: &Value) -> Vec<PanoramaInfo> {
    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };
    results
        .iter()
        .filter(|r| status_code(r) == 0)
        .filter_map(|r| r.get("photo"))
        .filter_map(parse_photo_info)
        .collect()
}

fn parse_photo_info(photo: &Value) -> Option<PanoramaInfo> {
    let photo_id = photo.get("photoId").and_then(|p| p.get("id")).and_then(id_string)?;
    let pose = photo.get("pose").cloned().unwrap_or(Value::Null);
    let lat_lng = pose.get("latLngPair").cloned().unwrap_or(Value::Null);
    let level = pose.get("level").and_then(|l| {
        str_field(l, "name").or_else(|| num_field(l, "number").map(|n| n.to_string()))
    });

    Some(PanoramaInfo {
        photo_id,
        share_link: str_field(photo, "shareLink"),
        latitude: num_field(&lat_lng, "latitude").map(|v| v.to_string()),
        longitude: num_field(&lat_lng, "longitude").map(|v| v.to_string()),
        altitude: num_field(&pose, "altitude").map(|v| v.to_string()),
        heading: num_field(&pose, "heading"),
        pitch: num_field(&pose, "pitch"),
        roll: num_field(&pose, "roll"),
        level,
        publish_status: str_field(photo, "mapsPublishStatus"),
    })
}

fn status_code(result: &Value) -> i64 {
    result
        .get("status")
        .and_then(|s| s.get("code"))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Every per-photo status in a batch delete response must be OK.
pub fn batch_delete_succeeded(body: &Value) -> bool {
    match body.get("status").and_then(Value::as_array) {
        Some(statuses) => statuses
            .iter()
            .all(|s| s.get("code").and_then(Value::as_i64).unwrap_or(0) == 0),
        None => true,
    }
}
