//! Tour-metadata host client: the only backend with a tour record and the
//! only one that can be pulled from.

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::blocking::{multipart, Client};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    check, check_delete, http_client, id_string, num_field, str_field, BackendClient, Credential,
    PhotoForm, PhotoRef, PhotoUpload, RemoteConnection, RemotePhoto, RemotePhotoRecord,
    RemoteTour, TourFields, TourRef,
};
use crate::domain::{Backend, GeoDecimal, PanoramaRemote, TourType, Transport, TransportType};
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://staging.explorer.trekview.org/api/v1";

/// Timestamp format of `taken_at` in photo records.
pub const TAKEN_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

const API_KEY_HEADER: &str = "api-key";

pub struct MetadataClient {
    http: Client,
    base_url: String,
    credential: Credential,
    version: String,
}

impl MetadataClient {
    pub fn new(credential: Credential, base_url: Option<&str>, version: &str) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            credential,
            version: version.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn get_json(&self, operation: &'static str, path: &str) -> Result<Value> {
        let key = self.authorize(operation)?;
        let resp = self
            .http
            .get(self.url(path))
            .header(API_KEY_HEADER, key)
            .send()?;
        Ok(check(Backend::MetadataHost, resp)?.json()?)
    }

    /// Form fields plus the client version stamp.
    fn stamped(&self, form: &PhotoForm) -> Vec<(String, String)> {
        let mut fields = form.fields().to_vec();
        fields.push(("tourer[version]".to_string(), self.version.clone()));
        fields
    }
}

impl BackendClient for MetadataClient {
    fn backend(&self) -> Backend {
        Backend::MetadataHost
    }

    fn credential(&self) -> &Credential {
        &self.credential
    }

    fn verify(&self) -> Result<()> {
        self.current_user().map(|_| ())
    }

    fn current_user(&self) -> Result<String> {
        let body = self.get_json("look up the current user", "users")?;
        body.get("user")
            .and_then(|u| u.get("id"))
            .and_then(id_string)
            .ok_or_else(|| Error::Protocol("users response has no user.id".into()))
    }

    fn create_tour(&self, fields: &TourFields) -> Result<String> {
        let key = self.authorize("create tours")?;
        let resp = self
            .http
            .post(self.url("tours"))
            .header(API_KEY_HEADER, key)
            .json(&tour_body(fields, &self.version, true))
            .send()?;
        let body: Value = check(Backend::MetadataHost, resp)?.json()?;
        let id = body
            .get("tour")
            .and_then(|t| t.get("id"))
            .and_then(id_string)
            .ok_or_else(|| Error::Protocol("create tour response has no tour.id".into()))?;
        info!(tour_id = %fields.tour_id, remote_id = %id, "metadata tour created");
        Ok(id)
    }

    fn update_tour(&self, remote_tour_id: &str, fields: &TourFields) -> Result<()> {
        let key = self.authorize("update tours")?;
        let resp = self
            .http
            .put(self.url(&format!("tours/{remote_tour_id}")))
            .header(API_KEY_HEADER, key)
            .json(&tour_body(fields, &self.version, false))
            .send()?;
        check(Backend::MetadataHost, resp)?;
        debug!(tour_id = %fields.tour_id, remote_id = remote_tour_id, "metadata tour updated");
        Ok(())
    }

    fn delete_tour(&self, target: &TourRef<'_>) -> Result<bool> {
        let key = self.authorize("delete tours")?;
        let Some(remote_tour_id) = target.remote_tour_id else {
            return Ok(false);
        };
        let resp = self
            .http
            .delete(self.url(&format!("tours/{remote_tour_id}")))
            .header(API_KEY_HEADER, key)
            .send()?;
        check_delete(Backend::MetadataHost, resp)
    }

    fn list_tours(&self, owner_id: &str) -> Result<Vec<RemoteTour>> {
        let body = self.get_json("list tours", &format!("tours?user_ids[]={owner_id}"))?;
        let tours = body
            .get("tours")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Protocol("tour list response has no tours".into()))?;
        Ok(tours.iter().filter_map(parse_tour).collect())
    }

    fn list_photos(&self, remote_tour_id: &str) -> Result<Vec<RemotePhotoRecord>> {
        let body = self.get_json("list photos", &format!("tours/{remote_tour_id}/photos"))?;
        let photos = body
            .get("photos")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Protocol("photo list response has no photos".into()))?;
        Ok(photos.iter().filter_map(parse_photo).collect())
    }

    fn upload_photo(&self, upload: &PhotoUpload<'_>) -> Result<RemotePhoto> {
        let key = self.authorize("upload photos")?;
        let remote_tour_id = upload.remote_tour_id.ok_or_else(|| {
            Error::Protocol("metadata photo upload needs the remote tour id".into())
        })?;
        let empty = PhotoForm::new();
        let form_fields = self.stamped(upload.form.unwrap_or(&empty));

        let mut form = multipart::Form::new().file("image", &upload.photo.path)?;
        for (name, value) in form_fields {
            form = form.text(name, value);
        }

        let resp = self
            .http
            .post(self.url(&format!("tours/{remote_tour_id}/photos")))
            .header(API_KEY_HEADER, key)
            .multipart(form)
            .send()?;
        let body: Value = check(Backend::MetadataHost, resp)?.json()?;
        let id = body
            .get("photo")
            .and_then(|p| p.get("id"))
            .and_then(id_string)
            .ok_or_else(|| Error::Protocol("add photo response has no photo.id".into()))?;
        info!(photo_id = %upload.photo.photo_id, remote_id = %id, "metadata photo uploaded");
        Ok(RemotePhoto {
            id,
            ..Default::default()
        })
    }

    fn update_photo(&self, remote_tour_id: &str, remote_photo_id: &str, form: &PhotoForm) -> Result<()> {
        let key = self.authorize("update photos")?;
        let resp = self
            .http
            .put(self.url(&format!("tours/{remote_tour_id}/photos/{remote_photo_id}")))
            .header(API_KEY_HEADER, key)
            .form(&self.stamped(form))
            .send()?;
        check(Backend::MetadataHost, resp)?;
        Ok(())
    }

    fn delete_photo(&self, target: &PhotoRef<'_>) -> Result<bool> {
        let key = self.authorize("delete photos")?;
        let Some(remote_tour_id) = target.remote_tour_id else {
            return Ok(false);
        };
        let resp = self
            .http
            .delete(self.url(&format!(
                "tours/{remote_tour_id}/photos/{}",
                target.remote_photo_id
            )))
            .header(API_KEY_HEADER, key)
            .send()?;
        check_delete(Backend::MetadataHost, resp)
    }
}

// ── Wire shapes ──────────────────────────────────────────────────

/// JSON body for tour create (`with_name`) and update.
/// Tags are sent comma-space joined, classification in lower case.
pub fn tour_body(fields: &TourFields, version: &str, with_name: bool) -> Value {
    let mut body = json!({
        "description": fields.description,
        "tags": fields.tags.join(", "),
        "tour_type": fields.transport.tour_type().as_str().to_lowercase(),
        "transport_type": fields.transport.mode().as_str().to_lowercase(),
        "tourer": {
            "tour_id": fields.tour_id,
            "version": version,
        },
    });
    if with_name {
        body["name"] = json!(fields.name);
    }
    body
}

fn parse_tags(value: Option<&Value>) -> Vec<String> {
    let raw: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Some(Value::String(s)) => s.split(',').map(String::from).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn parse_tour(value: &Value) -> Option<RemoteTour> {
    let id = value.get("id").and_then(id_string)?;
    let transport = match (str_field(value, "tour_type"), str_field(value, "transport_type")) {
        (Some(t), Some(m)) => t
            .parse::<TourType>()
            .and_then(|t| Transport::new(t, m.parse::<TransportType>()?))
            .ok(),
        _ => None,
    };
    Some(RemoteTour {
        id,
        name: str_field(value, "name").unwrap_or_default(),
        description: str_field(value, "description").unwrap_or_default(),
        tags: parse_tags(value.get("tags")),
        transport,
    })
}

fn decimal_field(value: &Value, key: &str) -> Option<GeoDecimal> {
    str_field(value, key).and_then(|s| GeoDecimal::parse(&s).ok())
}

fn parse_taken(value: &Value) -> Option<DateTime<Utc>> {
    let text = str_field(value, "taken_at")?;
    NaiveDateTime::parse_from_str(&text, TAKEN_AT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
        .or_else(|| DateTime::parse_from_rfc3339(&text).ok().map(|dt| dt.with_timezone(&Utc)))
}

fn parse_connection(value: &Value) -> Option<RemoteConnection> {
    Some(RemoteConnection {
        photo_id: str_field(value, "photo_id"),
        distance: num_field(value, "distance_meters")?,
        elevation: num_field(value, "elevation_meters")?,
        pitch: num_field(value, "pitch_degrees")?,
        heading: num_field(value, "heading_degrees")?,
        adjusted_heading: num_field(value, "adjusted_heading_degrees"),
    })
}

fn parse_streetview(value: Option<&Value>) -> PanoramaRemote {
    let Some(sv) = value.filter(|v| v.is_object()) else {
        return PanoramaRemote::default();
    };
    PanoramaRemote {
        photo_id: str_field(sv, "photo_id"),
        share_link: str_field(sv, "share_link"),
        download_url: str_field(sv, "download_url"),
        thumbnail_url: str_field(sv, "thumbnail_url"),
        capture_time: str_field(sv, "capture_time"),
        latitude: str_field(sv, "lat"),
        longitude: str_field(sv, "lon"),
        altitude: str_field(sv, "altitude"),
        heading: num_field(sv, "heading"),
        pitch: num_field(sv, "pitch"),
        roll: num_field(sv, "roll"),
        level: str_field(sv, "level"),
        publish_status: None,
    }
}

pub fn parse_photo(value: &Value) -> Option<RemotePhotoRecord> {
    let id = value.get("id").and_then(id_string)?;
    let tourer = value.get("tourer").cloned().unwrap_or(Value::Null);
    let connections = match tourer.get("connections") {
        Some(Value::Array(items)) => items.iter().filter_map(parse_connection).collect(),
        // Indexed objects, as produced by bracketed form fields.
        Some(Value::Object(map)) => {
            let mut entries: Vec<(usize, &Value)> = map
                .iter()
                .filter_map(|(k, v)| k.parse().ok().map(|i| (i, v)))
                .collect();
            entries.sort_by_key(|(i, _)| *i);
            entries.into_iter().filter_map(|(_, v)| parse_connection(v)).collect()
        }
        _ => Vec::new(),
    };

    Some(RemotePhotoRecord {
        id,
        local_photo_id: str_field(&tourer, "photo_id"),
        filename: str_field(value, "filename"),
        taken: parse_taken(value),
        latitude: decimal_field(value, "latitude"),
        longitude: decimal_field(value, "longitude"),
        elevation: decimal_field(value, "elevation_meters"),
        location_code: value
            .get("google")
            .and_then(|g| str_field(g, "plus_code_global_code")),
        camera_make: str_field(value, "camera_make"),
        camera_model: str_field(value, "camera_model"),
        heading: num_field(&tourer, "heading_degrees"),
        connections,
        panorama: parse_streetview(value.get("streetview")),
        trail_id: value
            .get("opentrailview")
            .and_then(|o| str_field(o, "photo_id")),
        country: value.get("address").and_then(|a| str_field(a, "country")),
        country_code: value.get("address").and_then(|a| str_field(a, "country_code")),
    })
}
