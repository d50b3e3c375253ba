use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geodesy;

pub const MAX_NAME_LEN: usize = 300;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_TAGS_LEN: usize = 500;

/// Generate a fresh 8-character identifier for a tour or photo.
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

// ── Backends ─────────────────────────────────────────────────────

/// The imagery-publishing services a tour can be synced to.
/// Ordering is the push order: photo hosts first, so the metadata host
/// receives their remote ids in the same pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Backend {
    /// Panorama host: push-only, resumable chunked uploads.
    PanoramaHost,
    /// Trail-imagery host: push-only, coordinates set after upload.
    TrailHost,
    /// Tour-metadata host: push and pull, owns a tour-level record.
    MetadataHost,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::PanoramaHost, Backend::TrailHost, Backend::MetadataHost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::PanoramaHost => "panorama-host",
            Backend::TrailHost => "trail-host",
            Backend::MetadataHost => "metadata-host",
        }
    }

    /// Human readable service name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::PanoramaHost => "Google Street View",
            Backend::TrailHost => "Open Trail View",
            Backend::MetadataHost => "Trek View Explorer",
        }
    }

    /// Whether the backend keeps a tour-level record of its own.
    pub fn has_tour_record(&self) -> bool {
        matches!(self, Backend::MetadataHost)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "panorama-host" | "panorama" => Ok(Backend::PanoramaHost),
            "trail-host" | "trail" => Ok(Backend::TrailHost),
            "metadata-host" | "metadata" => Ok(Backend::MetadataHost),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}

/// Set of backends currently holding synced data for a tour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationSet(BTreeSet<Backend>);

impl IntegrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, backend: Backend) -> bool {
        self.0.contains(&backend)
    }

    pub fn insert(&mut self, backend: Backend) -> bool {
        self.0.insert(backend)
    }

    pub fn remove(&mut self, backend: Backend) -> bool {
        self.0.remove(&backend)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Backend> + '_ {
        self.0.iter().copied()
    }

    /// Storage form: comma-separated backend names in push order.
    pub fn encode(&self) -> String {
        self.0.iter().map(Backend::as_str).collect::<Vec<_>>().join(",")
    }

    pub fn decode(s: &str) -> Result<Self> {
        let mut set = BTreeSet::new();
        for part in s.split(',').filter(|p| !p.trim().is_empty()) {
            set.insert(part.parse()?);
        }
        Ok(Self(set))
    }
}

impl FromIterator<Backend> for IntegrationSet {
    fn from_iter<I: IntoIterator<Item = Backend>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── Transport ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TourType {
    Land,
    Water,
    Air,
}

impl TourType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TourType::Land => "Land",
            TourType::Water => "Water",
            TourType::Air => "Air",
        }
    }
}

impl FromStr for TourType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "land" => Ok(TourType::Land),
            "water" => Ok(TourType::Water),
            "air" => Ok(TourType::Air),
            _ => Err(Error::InvalidTransport {
                domain: s.to_string(),
                mode: String::new(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    Drive,
    Hike,
    Bike,
    Climb,
    Ski,
    Snowboard,
    Skateboard,
    Rollerblade,
    OtherLand,
    Sail,
    Kayak,
    Raft,
    StandupPaddleBoard,
    OtherWater,
    Drone,
    HangGlide,
    Parachute,
    Windsuit,
    Plane,
    OtherAir,
}

impl TransportType {
    pub const ALL: [TransportType; 20] = [
        TransportType::Drive,
        TransportType::Hike,
        TransportType::Bike,
        TransportType::Climb,
        TransportType::Ski,
        TransportType::Snowboard,
        TransportType::Skateboard,
        TransportType::Rollerblade,
        TransportType::OtherLand,
        TransportType::Sail,
        TransportType::Kayak,
        TransportType::Raft,
        TransportType::StandupPaddleBoard,
        TransportType::OtherWater,
        TransportType::Drone,
        TransportType::HangGlide,
        TransportType::Parachute,
        TransportType::Windsuit,
        TransportType::Plane,
        TransportType::OtherAir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Drive => "Drive",
            TransportType::Hike => "Hike",
            TransportType::Bike => "Bike",
            TransportType::Climb => "Climb",
            TransportType::Ski => "Ski",
            TransportType::Snowboard => "Snowboard",
            TransportType::Skateboard => "Skateboard",
            TransportType::Rollerblade => "Rollerblade",
            TransportType::OtherLand => "OtherLand",
            TransportType::Sail => "Sail",
            TransportType::Kayak => "Kayak",
            TransportType::Raft => "Raft",
            TransportType::StandupPaddleBoard => "StandupPaddleBoard",
            TransportType::OtherWater => "OtherWater",
            TransportType::Drone => "Drone",
            TransportType::HangGlide => "HangGlide",
            TransportType::Parachute => "Parachute",
            TransportType::Windsuit => "Windsuit",
            TransportType::Plane => "Plane",
            TransportType::OtherAir => "OtherAir",
        }
    }

    /// The only domain this mode of transport belongs to.
    pub fn domain(&self) -> TourType {
        match self {
            TransportType::Drive
            | TransportType::Hike
            | TransportType::Bike
            | TransportType::Climb
            | TransportType::Ski
            | TransportType::Snowboard
            | TransportType::Skateboard
            | TransportType::Rollerblade
            | TransportType::OtherLand => TourType::Land,
            TransportType::Sail
            | TransportType::Kayak
            | TransportType::Raft
            | TransportType::StandupPaddleBoard
            | TransportType::OtherWater => TourType::Water,
            TransportType::Drone
            | TransportType::HangGlide
            | TransportType::Parachute
            | TransportType::Windsuit
            | TransportType::Plane
            | TransportType::OtherAir => TourType::Air,
        }
    }
}

impl FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TransportType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidTransport {
                domain: String::new(),
                mode: s.to_string(),
            })
    }
}

/// Tour classification: a domain crossed with a mode valid for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transport {
    tour_type: TourType,
    mode: TransportType,
}

impl Transport {
    pub fn new(tour_type: TourType, mode: TransportType) -> Result<Self> {
        if mode.domain() != tour_type {
            return Err(Error::InvalidTransport {
                domain: tour_type.as_str().to_string(),
                mode: mode.as_str().to_string(),
            });
        }
        Ok(Self { tour_type, mode })
    }

    /// Every valid (domain, mode) pair, in catalogue order.
    pub fn all() -> Vec<Transport> {
        TransportType::ALL
            .into_iter()
            .map(|mode| Transport {
                tour_type: mode.domain(),
                mode,
            })
            .collect()
    }

    pub fn tour_type(&self) -> TourType {
        self.tour_type
    }

    pub fn mode(&self) -> TransportType {
        self.mode
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tour_type.as_str(), self.mode.as_str())
    }
}

/// Parses `Land-Hike` style labels (case-insensitive).
impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (domain, mode) = s.split_once('-').ok_or_else(|| Error::InvalidTransport {
            domain: s.to_string(),
            mode: String::new(),
        })?;
        Transport::new(domain.parse()?, mode.parse()?)
    }
}

// ── Coordinates ──────────────────────────────────────────────────

/// A decimal number kept in its original text form so that values survive
/// store/remote round-trips exactly. Arithmetic goes through `value()`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoDecimal {
    text: String,
    value: f64,
}

impl GeoDecimal {
    pub fn parse(s: &str) -> Result<Self> {
        let text = s.trim();
        let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        let well_formed = !(int_part.is_empty() && frac_part.is_empty())
            && int_part.bytes().all(|b| b.is_ascii_digit())
            && frac_part.bytes().all(|b| b.is_ascii_digit());
        let value = match text.parse::<f64>() {
            Ok(v) if well_formed && v.is_finite() => v,
            _ => return Err(Error::InvalidDecimal(s.to_string())),
        };
        Ok(Self {
            text: text.to_string(),
            value,
        })
    }

    /// Shortest text that parses back to exactly `value`.
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::InvalidDecimal(value.to_string()));
        }
        Ok(Self {
            text: format!("{value}"),
            value,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl fmt::Display for GeoDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for GeoDecimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GeoDecimal::parse(s)
    }
}

// ── Tours and photos ─────────────────────────────────────────────

/// Directed edge from one photo to a nearby photo of the same tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Local id of the target photo.
    pub photo_id: String,
    /// Horizontal distance in meters.
    pub distance: f64,
    /// Target elevation minus source elevation, in meters.
    pub elevation: f64,
    pub pitch: f64,
    /// Bearing from source to target, degrees in [0, 360).
    pub heading: f64,
    /// Source heading minus `heading`; set when the source has a direction of travel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted_heading: Option<f64>,
}

/// Panorama-host copy of a photo: its id plus the values echoed back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanoramaRemote {
    pub photo_id: Option<String>,
    pub share_link: Option<String>,
    pub download_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub capture_time: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub altitude: Option<String>,
    pub heading: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub level: Option<String>,
    pub publish_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub photo_id: String,
    pub tour_id: String,
    pub filename: String,
    pub directory: PathBuf,
    pub path: PathBuf,
    pub taken: DateTime<Utc>,
    pub latitude: GeoDecimal,
    pub longitude: GeoDecimal,
    pub elevation: GeoDecimal,
    /// Open Location Code of the capture position.
    pub location_code: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    /// Bearing toward the temporally next photo.
    pub heading: Option<f64>,
    pub connections: Vec<Connection>,
    pub panorama: PanoramaRemote,
    pub trail_id: Option<String>,
    pub metadata_id: Option<String>,
    pub created: i64,
    /// Reverse-geocoded country name and ISO alpha-2 code.
    pub country: Option<String>,
    pub country_code: Option<String>,
}

impl Photo {
    /// Build a new, not yet synced photo from a validated source file.
    pub fn from_validated(file: &ValidatedFile, tour_id: &str) -> Self {
        let filename = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = file
            .path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        let (latitude, longitude) = (file.latitude.value(), file.longitude.value());
        let (country, country_code) = geodesy::country(latitude, longitude).unzip();

        Self {
            photo_id: short_id(),
            tour_id: tour_id.to_string(),
            filename,
            directory,
            path: file.path.clone(),
            taken: file.taken,
            location_code: Some(geodesy::plus_code(latitude, longitude)),
            latitude: file.latitude.clone(),
            longitude: file.longitude.clone(),
            elevation: file.altitude.clone(),
            camera_make: file.camera_make.clone(),
            camera_model: file.camera_model.clone(),
            heading: None,
            connections: Vec::new(),
            panorama: PanoramaRemote::default(),
            trail_id: None,
            metadata_id: None,
            created: Utc::now().timestamp(),
            country,
            country_code,
        }
    }

    /// The id this photo carries on `backend`, if it has been pushed there.
    pub fn remote_id(&self, backend: Backend) -> Option<&str> {
        let id = match backend {
            Backend::PanoramaHost => self.panorama.photo_id.as_deref(),
            Backend::TrailHost => self.trail_id.as_deref(),
            Backend::MetadataHost => self.metadata_id.as_deref(),
        };
        id.filter(|s| !s.is_empty())
    }

    /// Forget everything this photo knows about its copy on `backend`.
    pub fn clear_remote(&mut self, backend: Backend) {
        match backend {
            Backend::PanoramaHost => self.panorama = PanoramaRemote::default(),
            Backend::TrailHost => self.trail_id = None,
            Backend::MetadataHost => self.metadata_id = None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tour {
    pub tour_id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub transport: Transport,
    pub integrations: IntegrationSet,
    /// Tour record id on the metadata host.
    pub metadata_tour_id: Option<String>,
    pub created: i64,
}

impl Tour {
    /// The tour-level record id on `backend`; only the metadata host keeps one.
    pub fn remote_tour_id(&self, backend: Backend) -> Option<&str> {
        match backend {
            Backend::MetadataHost => self.metadata_tour_id.as_deref().filter(|s| !s.is_empty()),
            Backend::PanoramaHost | Backend::TrailHost => None,
        }
    }
}

/// Fields supplied when creating a tour.
#[derive(Debug, Clone)]
pub struct TourDraft {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub transport: Transport,
}

impl TourDraft {
    pub fn validate(&self) -> Result<()> {
        check_len("Tour name", &self.name, MAX_NAME_LEN)?;
        check_len("Tour description", &self.description, MAX_DESCRIPTION_LEN)?;
        check_len("Tour tags", &self.tags.join(","), MAX_TAGS_LEN)
    }
}

/// Tour fields an edit may change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TourEdit {
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub transport: Option<Transport>,
}

impl TourEdit {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref description) = self.description {
            check_len("Tour description", description, MAX_DESCRIPTION_LEN)?;
        }
        if let Some(ref tags) = self.tags {
            check_len("Tour tags", &tags.join(","), MAX_TAGS_LEN)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.tags.is_none() && self.transport.is_none()
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(Error::FieldTooLong { field, max });
    }
    Ok(())
}

/// A source image that passed validation, with the EXIF/GPS data the
/// catalog needs to build a photo.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFile {
    pub path: PathBuf,
    pub taken: DateTime<Utc>,
    pub latitude: GeoDecimal,
    pub longitude: GeoDecimal,
    pub altitude: GeoDecimal,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_roundtrip() {
        for backend in Backend::ALL {
            assert_eq!(backend.as_str().parse::<Backend>().unwrap(), backend);
        }
        assert!(matches!(
            "flickr".parse::<Backend>(),
            Err(Error::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_integration_set_encode_decode() {
        let mut set = IntegrationSet::new();
        set.insert(Backend::MetadataHost);
        set.insert(Backend::PanoramaHost);
        assert_eq!(set.encode(), "panorama-host,metadata-host");

        let decoded = IntegrationSet::decode("panorama-host,metadata-host").unwrap();
        assert_eq!(decoded, set);
        assert!(IntegrationSet::decode("").unwrap().is_empty());
        assert!(IntegrationSet::decode("panorama-host,bogus").is_err());
    }

    #[test]
    fn test_integration_set_insert_is_additive() {
        let mut set = IntegrationSet::new();
        assert!(set.insert(Backend::TrailHost));
        assert!(!set.insert(Backend::TrailHost));
        assert_eq!(set.len(), 1);
        assert!(set.remove(Backend::TrailHost));
        assert!(set.is_empty());
    }

    #[test]
    fn test_transport_rejects_mode_from_other_domain() {
        assert!(Transport::new(TourType::Land, TransportType::Hike).is_ok());
        let err = Transport::new(TourType::Water, TransportType::Hike).unwrap_err();
        assert!(matches!(err, Error::InvalidTransport { .. }));
    }

    #[test]
    fn test_transport_catalogue() {
        let all = Transport::all();
        assert_eq!(all.len(), 20);
        assert_eq!(all.iter().filter(|t| t.tour_type() == TourType::Land).count(), 9);
        assert_eq!(all.iter().filter(|t| t.tour_type() == TourType::Water).count(), 5);
        assert_eq!(all.iter().filter(|t| t.tour_type() == TourType::Air).count(), 6);
    }

    #[test]
    fn test_transport_parse_and_display() {
        let t: Transport = "water-standuppaddleboard".parse().unwrap();
        assert_eq!(t.to_string(), "Water-StandupPaddleBoard");
        assert!("Air-Kayak".parse::<Transport>().is_err());
        assert!("Hike".parse::<Transport>().is_err());
    }

    #[test]
    fn test_geodecimal_preserves_text() {
        let d = GeoDecimal::parse("51.50000000").unwrap();
        assert_eq!(d.as_str(), "51.50000000");
        assert_eq!(d.value(), 51.5);

        let neg = GeoDecimal::parse("-0.1275").unwrap();
        assert_eq!(neg.value(), -0.1275);
    }

    #[test]
    fn test_geodecimal_rejects_non_decimal() {
        for bad in ["", "abc", "1e5", "NaN", "inf", "1.2.3", "-", "."] {
            assert!(GeoDecimal::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_geodecimal_from_f64_roundtrips() {
        let d = GeoDecimal::from_f64(0.00005).unwrap();
        assert_eq!(d.as_str(), "0.00005");
        assert_eq!(GeoDecimal::parse(d.as_str()).unwrap().value(), 0.00005);
        assert!(GeoDecimal::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn test_short_id_length() {
        let a = short_id();
        let b = short_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_draft_validation_limits() {
        let draft = TourDraft {
            name: "x".repeat(301),
            description: String::new(),
            tags: vec![],
            transport: Transport::new(TourType::Land, TransportType::Hike).unwrap(),
        };
        assert!(matches!(
            draft.validate(),
            Err(Error::FieldTooLong { max: 300, .. })
        ));
    }
}
