pub mod metadata;
pub mod panorama;
pub mod trail;

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use serde_json::Value;

use crate::domain::{Backend, GeoDecimal, PanoramaRemote, Photo, Transport};
use crate::error::{Error, Result};

pub use metadata::MetadataClient;
pub use panorama::PanoramaClient;
pub use trail::TrailClient;

// ── Credentials ──────────────────────────────────────────────────

/// What the credential collaborator handed over for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Ready-to-use secret (bearer token or API key).
    Bearer(String),
    /// Nothing configured.
    Unconfigured,
    /// Configured but refused by the backend.
    Invalid(String),
}

impl Credential {
    /// Empty or missing secrets count as unconfigured.
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret.map(str::trim) {
            Some(s) if !s.is_empty() => Credential::Bearer(s.to_string()),
            _ => Credential::Unconfigured,
        }
    }

    pub fn secret(&self) -> Option<&str> {
        match self {
            Credential::Bearer(s) => Some(s),
            Credential::Unconfigured | Credential::Invalid(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.secret().is_some()
    }

    pub fn describe(&self) -> String {
        match self {
            Credential::Bearer(_) => "active".to_string(),
            Credential::Unconfigured => "not configured".to_string(),
            Credential::Invalid(reason) => format!("invalid credentials ({reason})"),
        }
    }
}

// ── Request and response shapes ──────────────────────────────────

/// Ordered form fields sent alongside a photo to the metadata host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoForm {
    fields: Vec<(String, String)>,
}

impl PhotoForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// Push only when a value is present.
    pub fn push_opt(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.push(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Everything a client may need to push one photo.
pub struct PhotoUpload<'a> {
    pub photo: &'a Photo,
    /// Tour record the photo is attached to, for backends that keep one.
    pub remote_tour_id: Option<&'a str>,
    /// Metadata snapshot, for backends that consume one.
    pub form: Option<&'a PhotoForm>,
}

/// Identifiers returned by a successful photo upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePhoto {
    pub id: String,
    pub share_link: Option<String>,
    pub download_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// A remote photo to delete.
#[derive(Debug, Clone, Copy)]
pub struct PhotoRef<'a> {
    pub remote_tour_id: Option<&'a str>,
    pub remote_photo_id: &'a str,
}

/// A remote tour to delete. Backends without a tour record delete the
/// listed photos instead.
#[derive(Debug, Clone, Copy)]
pub struct TourRef<'a> {
    pub remote_tour_id: Option<&'a str>,
    pub photo_ids: &'a [String],
}

/// Tour-level fields sent when creating or updating a remote tour record.
#[derive(Debug, Clone, PartialEq)]
pub struct TourFields {
    pub tour_id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub transport: Transport,
}

/// Tour summary listed by a pull-capable backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTour {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub transport: Option<Transport>,
}

/// Connection as stored remotely; `photo_id` is the backend's id of the target.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConnection {
    pub photo_id: Option<String>,
    pub distance: f64,
    pub elevation: f64,
    pub pitch: f64,
    pub heading: f64,
    pub adjusted_heading: Option<f64>,
}

/// Photo record listed by a pull-capable backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePhotoRecord {
    pub id: String,
    /// Local photo id echoed back by the backend.
    pub local_photo_id: Option<String>,
    pub filename: Option<String>,
    pub taken: Option<DateTime<Utc>>,
    pub latitude: Option<GeoDecimal>,
    pub longitude: Option<GeoDecimal>,
    pub elevation: Option<GeoDecimal>,
    pub location_code: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub heading: Option<f64>,
    pub connections: Vec<RemoteConnection>,
    pub panorama: PanoramaRemote,
    pub trail_id: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

/// Publish state of one photo on the panorama host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanoramaInfo {
    pub photo_id: String,
    pub share_link: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub altitude: Option<String>,
    pub heading: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub level: Option<String>,
    pub publish_status: Option<String>,
}

// ── Client contract ──────────────────────────────────────────────

/// Capability surface shared by every backend.
///
/// A client without usable credentials is disabled: every operation fails
/// with [`Error::Capability`] before touching the network. Operations a
/// backend does not offer fail with [`Error::Unsupported`].
pub trait BackendClient {
    fn backend(&self) -> Backend;

    fn credential(&self) -> &Credential;

    fn is_enabled(&self) -> bool {
        self.credential().is_ready()
    }

    /// The secret to authenticate with, or a capability error.
    fn authorize(&self, operation: &'static str) -> Result<&str> {
        self.credential().secret().ok_or(Error::Capability {
            backend: self.backend(),
            operation,
        })
    }

    /// Error for an operation this backend does not provide.
    fn refuse(&self, operation: &'static str) -> Error {
        match self.authorize(operation) {
            Ok(_) => Error::Unsupported {
                backend: self.backend(),
                operation,
            },
            Err(err) => err,
        }
    }

    /// Cheap authenticated call used to tell valid credentials from rejected ones.
    fn verify(&self) -> Result<()> {
        self.authorize("verify credentials").map(|_| ())
    }

    fn upload_photo(&self, upload: &PhotoUpload<'_>) -> Result<RemotePhoto>;

    /// `Ok(false)` when the backend refused or does not know the photo.
    fn delete_photo(&self, target: &PhotoRef<'_>) -> Result<bool>;

    fn delete_tour(&self, _target: &TourRef<'_>) -> Result<bool> {
        Err(self.refuse("delete tours"))
    }

    fn create_tour(&self, _fields: &TourFields) -> Result<String> {
        Err(self.refuse("create tours"))
    }

    fn update_tour(&self, _remote_tour_id: &str, _fields: &TourFields) -> Result<()> {
        Err(self.refuse("update tours"))
    }

    /// Owner id of the authenticated account.
    fn current_user(&self) -> Result<String> {
        Err(self.refuse("look up the current user"))
    }

    fn list_tours(&self, _owner_id: &str) -> Result<Vec<RemoteTour>> {
        Err(self.refuse("list tours"))
    }

    fn list_photos(&self, _remote_tour_id: &str) -> Result<Vec<RemotePhotoRecord>> {
        Err(self.refuse("list photos"))
    }

    fn update_photo(
        &self,
        _remote_tour_id: &str,
        _remote_photo_id: &str,
        _form: &PhotoForm,
    ) -> Result<()> {
        Err(self.refuse("update photos"))
    }

    fn move_photo(&self, _remote_photo_id: &str, _lat: &GeoDecimal, _lon: &GeoDecimal) -> Result<()> {
        Err(self.refuse("move photos"))
    }

    fn photo_info(&self, _remote_photo_ids: &[String]) -> Result<Vec<PanoramaInfo>> {
        Err(self.refuse("fetch photo status"))
    }
}

/// One client per backend, built once and shared by every operation.
pub struct Clients {
    panorama: Box<dyn BackendClient>,
    trail: Box<dyn BackendClient>,
    metadata: Box<dyn BackendClient>,
}

impl Clients {
    pub fn new(
        panorama: Box<dyn BackendClient>,
        trail: Box<dyn BackendClient>,
        metadata: Box<dyn BackendClient>,
    ) -> Self {
        Self {
            panorama,
            trail,
            metadata,
        }
    }

    pub fn get(&self, backend: Backend) -> &dyn BackendClient {
        match backend {
            Backend::PanoramaHost => self.panorama.as_ref(),
            Backend::TrailHost => self.trail.as_ref(),
            Backend::MetadataHost => self.metadata.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn BackendClient> + '_ {
        Backend::ALL.into_iter().map(move |b| self.get(b))
    }
}

// ── HTTP helpers ─────────────────────────────────────────────────

/// Blocking HTTP client shared by the concrete backends. No overall
/// request timeout: large chunk uploads on slow links must not be cut off.
pub(crate) fn http_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("tourer/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .timeout(None::<Duration>)
        .build()?;
    Ok(client)
}

/// Classify a non-success status: throttling and server errors may succeed
/// later, everything else is a rejection of this request.
pub fn status_error(backend: Backend, status: u16, message: String) -> Error {
    if status == 429 || (500..600).contains(&status) {
        Error::Transient(format!("{backend} returned {status}: {message}"))
    } else {
        Error::Rejected {
            backend,
            status,
            message,
        }
    }
}

/// Pass through a successful response, turn anything else into an error.
pub(crate) fn check(backend: Backend, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(status_error(backend, status.as_u16(), body))
}

/// Like [`check`] for delete calls: a refused delete is a `false`, not an error.
pub(crate) fn check_delete(backend: Backend, resp: Response) -> Result<bool> {
    match check(backend, resp) {
        Ok(_) => Ok(true),
        Err(Error::Rejected { status, message, .. }) => {
            tracing::warn!(%backend, status, %message, "delete refused");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Remote ids arrive as strings or numbers depending on the backend.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers may come back as JSON numbers or as the text they were posted as.
pub(crate) fn num_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Disabled(Credential);

    impl BackendClient for Disabled {
        fn backend(&self) -> Backend {
            Backend::TrailHost
        }
        fn credential(&self) -> &Credential {
            &self.0
        }
        fn upload_photo(&self, _: &PhotoUpload<'_>) -> Result<RemotePhoto> {
            Err(self.refuse("upload photos"))
        }
        fn delete_photo(&self, _: &PhotoRef<'_>) -> Result<bool> {
            Err(self.refuse("delete photos"))
        }
    }

    struct Enabled(Credential);

    impl BackendClient for Enabled {
        fn backend(&self) -> Backend {
            Backend::TrailHost
        }
        fn credential(&self) -> &Credential {
            &self.0
        }
        fn upload_photo(&self, _: &PhotoUpload<'_>) -> Result<RemotePhoto> {
            Ok(RemotePhoto::default())
        }
        fn delete_photo(&self, _: &PhotoRef<'_>) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_credential_from_secret() {
        assert_eq!(Credential::from_secret(None), Credential::Unconfigured);
        assert_eq!(Credential::from_secret(Some("  ")), Credential::Unconfigured);
        assert_eq!(
            Credential::from_secret(Some("tok")),
            Credential::Bearer("tok".to_string())
        );
        assert!(!Credential::Invalid("401".into()).is_ready());
    }

    #[test]
    fn test_disabled_client_reports_capability_error() {
        let client = Disabled(Credential::Unconfigured);
        assert!(!client.is_enabled());
        let err = client.create_tour(&TourFields {
            tour_id: "t".into(),
            name: "n".into(),
            description: String::new(),
            tags: vec![],
            transport: "Land-Hike".parse().unwrap(),
        });
        assert!(matches!(err, Err(Error::Capability { backend: Backend::TrailHost, .. })));
        assert!(matches!(client.verify(), Err(Error::Capability { .. })));
    }

    #[test]
    fn test_enabled_client_reports_unsupported() {
        let client = Enabled(Credential::Bearer("k".into()));
        assert!(client.verify().is_ok());
        let err = client.list_tours("1").unwrap_err();
        assert!(matches!(err, Error::Unsupported { operation: "list tours", .. }));
    }

    #[test]
    fn test_status_error_classification() {
        assert!(status_error(Backend::MetadataHost, 429, String::new()).is_transient());
        assert!(status_error(Backend::MetadataHost, 503, String::new()).is_transient());
        let err = status_error(Backend::MetadataHost, 404, "gone".into());
        assert!(matches!(err, Error::Rejected { status: 404, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_json_field_helpers() {
        let v = json!({"a": 12, "b": "x", "c": "", "d": "1.5", "e": null});
        assert_eq!(id_string(&v["a"]), Some("12".to_string()));
        assert_eq!(str_field(&v, "b"), Some("x".to_string()));
        assert_eq!(str_field(&v, "c"), None);
        assert_eq!(num_field(&v, "d"), Some(1.5));
        assert_eq!(num_field(&v, "a"), Some(12.0));
        assert_eq!(num_field(&v, "e"), None);
    }

    #[test]
    fn test_photo_form_skips_absent_values() {
        let mut form = PhotoForm::new();
        form.push("tourer[photo_id]", "p1");
        form.push_opt("camera_make", None::<String>);
        form.push_opt("camera_model", Some("MAX"));
        assert_eq!(form.len(), 2);
        assert!(!form.contains("camera_make"));
        assert_eq!(form.get("camera_model"), Some("MAX"));
    }
}
