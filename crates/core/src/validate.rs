//! Source image validation: EXIF/GPS extraction and the acceptance rules
//! a file must pass before it can become a photo.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use exif::{Field, In, Tag, Value};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::domain::{GeoDecimal, ValidatedFile};
use crate::error::{Error, Result};

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "tiff"];
pub const MAX_FILE_SIZE: u64 = 75_000_000;
pub const MIN_PIXELS: u64 = 7_500_000;
pub const MAX_PIXELS: u64 = 100_000_000;

/// What the acceptance rules need from a file's EXIF block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifFacts {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    /// GPS date + time, always UTC.
    pub gps_time: Option<DateTime<Utc>>,
    /// `DateTimeOriginal`, read as UTC.
    pub original_time: Option<DateTime<Utc>>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted { file: ValidatedFile, warnings: Vec<String> },
    Rejected { reasons: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub path: PathBuf,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub accepted: Vec<ValidatedFile>,
    pub rejected: Vec<Rejection>,
    pub warnings: Vec<(PathBuf, String)>,
}

/// Validate a single file, or every visible file directly inside a directory.
pub fn validate_path(path: &Path) -> Result<Validation> {
    if !path.exists() {
        return Err(Error::PathNotFound(path.to_path_buf()));
    }

    let mut validation = Validation::default();
    for file in candidate_files(path)? {
        match validate_file(&file) {
            Verdict::Accepted { file, warnings } => {
                for warning in warnings {
                    validation.warnings.push((file.path.clone(), warning));
                }
                validation.accepted.push(file);
            }
            Verdict::Rejected { reasons } => {
                debug!(path = %file.display(), reasons = ?reasons, "file rejected");
                validation.rejected.push(Rejection { path: file, reasons });
            }
        }
    }
    Ok(validation)
}

pub fn validate_file(path: &Path) -> Verdict {
    if !is_supported(path) {
        return Verdict::Rejected {
            reasons: vec!["unsupported file type".to_string()],
        };
    }
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) => {
            return Verdict::Rejected {
                reasons: vec![format!("cannot read file: {err}")],
            }
        }
    };
    match read_exif(path) {
        Ok(facts) => check(path, size, &facts),
        Err(err) => Verdict::Rejected {
            reasons: vec![format!("cannot read EXIF data: {err}")],
        },
    }
}

fn candidate_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

// ── Rules ────────────────────────────────────────────────────────

/// Apply the acceptance rules. A non-2:1 panorama is only a warning.
pub fn check(path: &Path, size: u64, facts: &ExifFacts) -> Verdict {
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    if !is_supported(path) {
        reasons.push("unsupported file type".to_string());
    }
    if facts.latitude.is_none() {
        reasons.push("no GPS latitude".to_string());
    }
    if facts.longitude.is_none() {
        reasons.push("no GPS longitude".to_string());
    }
    if facts.altitude.is_none() {
        reasons.push("no GPS altitude".to_string());
    }
    let taken = facts.gps_time.or(facts.original_time);
    if taken.is_none() {
        reasons.push("no capture time".to_string());
    }
    if size >= MAX_FILE_SIZE {
        reasons.push(format!("file too large ({size} bytes, limit {MAX_FILE_SIZE})"));
    }

    if let (Some(width), Some(height)) = (facts.width, facts.height) {
        if width > 1 && height > 1 {
            let pixels = u64::from(width) * u64::from(height);
            if pixels < MIN_PIXELS {
                reasons.push(format!("resolution too small ({})", megapixels(pixels)));
            }
            if pixels > MAX_PIXELS {
                reasons.push(format!("resolution too large ({})", megapixels(pixels)));
            }
            if u64::from(width) != 2 * u64::from(height) {
                warnings.push(format!("aspect ratio {width}x{height} is not 2:1"));
            }
        }
    }

    let (Some(lat), Some(lon), Some(alt), Some(taken)) =
        (facts.latitude, facts.longitude, facts.altitude, taken)
    else {
        return Verdict::Rejected { reasons };
    };
    if !reasons.is_empty() {
        return Verdict::Rejected { reasons };
    }

    let coordinates = (
        GeoDecimal::from_f64(lat),
        GeoDecimal::from_f64(lon),
        GeoDecimal::from_f64(alt),
    );
    match coordinates {
        (Ok(latitude), Ok(longitude), Ok(altitude)) => Verdict::Accepted {
            file: ValidatedFile {
                path: path.to_path_buf(),
                taken,
                latitude,
                longitude,
                altitude,
                camera_make: facts.camera_make.clone(),
                camera_model: facts.camera_model.clone(),
                size,
            },
            warnings,
        },
        _ => Verdict::Rejected {
            reasons: vec!["GPS position is not a finite number".to_string()],
        },
    }
}

fn megapixels(pixels: u64) -> String {
    format!("{:.1} MP", pixels as f64 / 1_000_000.0)
}

// ── EXIF extraction ──────────────────────────────────────────────

pub fn read_exif(path: &Path) -> Result<ExifFacts> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader)?;
    let field = |tag| exif.get_field(tag, In::PRIMARY);

    let altitude = rationals(field(Tag::GPSAltitude))
        .and_then(|v| v.first().copied())
        .map(|alt| match field(Tag::GPSAltitudeRef).and_then(|f| f.value.get_uint(0)) {
            Some(1) => -alt,
            _ => alt,
        });

    let gps_time = match (ascii(field(Tag::GPSDateStamp)), rationals(field(Tag::GPSTimeStamp))) {
        (Some(date), Some(hms)) => gps_timestamp(&date, &hms),
        _ => None,
    };

    let dimension = |primary, fallback| {
        field(primary)
            .or_else(|| field(fallback))
            .and_then(|f| f.value.get_uint(0))
    };

    Ok(ExifFacts {
        latitude: rationals(field(Tag::GPSLatitude))
            .and_then(|dms| dms_to_decimal(&dms, ascii(field(Tag::GPSLatitudeRef)).as_deref())),
        longitude: rationals(field(Tag::GPSLongitude))
            .and_then(|dms| dms_to_decimal(&dms, ascii(field(Tag::GPSLongitudeRef)).as_deref())),
        altitude,
        gps_time,
        original_time: ascii(field(Tag::DateTimeOriginal)).and_then(|s| original_timestamp(&s)),
        camera_make: ascii(field(Tag::Make)),
        camera_model: ascii(field(Tag::Model)),
        width: dimension(Tag::PixelXDimension, Tag::ImageWidth),
        height: dimension(Tag::PixelYDimension, Tag::ImageLength),
    })
}

fn rationals(field: Option<&Field>) -> Option<Vec<f64>> {
    match field?.value {
        Value::Rational(ref values) => Some(values.iter().map(|r| r.to_f64()).collect()),
        _ => None,
    }
}

fn ascii(field: Option<&Field>) -> Option<String> {
    match field?.value {
        Value::Ascii(ref values) => values
            .first()
            .map(|s| String::from_utf8_lossy(s).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Degrees/minutes/seconds (or bare degrees) to signed decimal degrees.
pub fn dms_to_decimal(dms: &[f64], reference: Option<&str>) -> Option<f64> {
    let degrees = match *dms {
        [d] => d,
        [d, m] => d + m / 60.0,
        [d, m, s] => d + m / 60.0 + s / 3600.0,
        _ => return None,
    };
    match reference {
        Some("S") | Some("W") => Some(-degrees),
        _ => Some(degrees),
    }
}

/// `GPSDateStamp` ("2021:05:04") plus `GPSTimeStamp` ([h, m, s]) as UTC.
pub fn gps_timestamp(date: &str, hms: &[f64]) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y:%m:%d").ok()?;
    let [h, m, s] = *hms else {
        return None;
    };
    let whole = s.floor();
    let nanos = ((s - whole) * 1e9).round() as u32;
    let time = NaiveTime::from_hms_nano_opt(h as u32, m as u32, whole as u32, nanos)?;
    Some(date.and_time(time).and_utc())
}

/// `DateTimeOriginal` ("2021:05:04 09:30:00"); no zone is recorded, UTC is assumed.
pub fn original_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn facts() -> ExifFacts {
        ExifFacts {
            latitude: Some(51.2741),
            longitude: Some(-0.8456),
            altitude: Some(84.2),
            gps_time: Some(Utc.with_ymd_and_hms(2021, 5, 4, 9, 30, 0).unwrap()),
            original_time: Some(Utc.with_ymd_and_hms(2021, 5, 4, 10, 30, 0).unwrap()),
            camera_make: Some("GoPro".to_string()),
            camera_model: Some("MAX".to_string()),
            width: Some(5376),
            height: Some(2688),
        }
    }

    fn rejected(verdict: Verdict) -> Vec<String> {
        match verdict {
            Verdict::Rejected { reasons } => reasons,
            Verdict::Accepted { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_accepts_complete_panorama() {
        let verdict = check(Path::new("/p/a.JPG"), 9_000_000, &facts());
        match verdict {
            Verdict::Accepted { file, warnings } => {
                assert!(warnings.is_empty());
                assert_eq!(file.latitude.as_str(), "51.2741");
                assert_eq!(file.altitude.value(), 84.2);
                // GPS time wins over DateTimeOriginal.
                assert_eq!(file.taken, Utc.with_ymd_and_hms(2021, 5, 4, 9, 30, 0).unwrap());
                assert_eq!(file.size, 9_000_000);
            }
            Verdict::Rejected { reasons } => panic!("rejected: {reasons:?}"),
        }
    }

    #[test]
    fn test_falls_back_to_original_time() {
        let mut f = facts();
        f.gps_time = None;
        match check(Path::new("/p/a.jpg"), 1, &f) {
            Verdict::Accepted { file, .. } => {
                assert_eq!(file.taken, Utc.with_ymd_and_hms(2021, 5, 4, 10, 30, 0).unwrap())
            }
            Verdict::Rejected { reasons } => panic!("rejected: {reasons:?}"),
        }
    }

    #[test]
    fn test_missing_gps_and_time_rejected() {
        let f = ExifFacts {
            width: Some(5376),
            height: Some(2688),
            ..Default::default()
        };
        let reasons = rejected(check(Path::new("/p/a.jpg"), 1, &f));
        assert_eq!(
            reasons,
            vec!["no GPS latitude", "no GPS longitude", "no GPS altitude", "no capture time"]
        );
    }

    #[test]
    fn test_size_and_resolution_limits() {
        let reasons = rejected(check(Path::new("/p/a.jpg"), MAX_FILE_SIZE, &facts()));
        assert!(reasons[0].starts_with("file too large"));

        let mut small = facts();
        small.width = Some(3000);
        small.height = Some(1500);
        let reasons = rejected(check(Path::new("/p/a.jpg"), 1, &small));
        assert_eq!(reasons, vec!["resolution too small (4.5 MP)"]);

        let mut huge = facts();
        huge.width = Some(16000);
        huge.height = Some(8000);
        let reasons = rejected(check(Path::new("/p/a.jpg"), 1, &huge));
        assert_eq!(reasons, vec!["resolution too large (128.0 MP)"]);
    }

    #[test]
    fn test_aspect_ratio_is_only_a_warning() {
        let mut f = facts();
        f.width = Some(4000);
        f.height = Some(3000);
        match check(Path::new("/p/a.jpeg"), 1, &f) {
            Verdict::Accepted { warnings, .. } => {
                assert_eq!(warnings, vec!["aspect ratio 4000x3000 is not 2:1"])
            }
            Verdict::Rejected { reasons } => panic!("rejected: {reasons:?}"),
        }
    }

    #[test]
    fn test_unknown_dimensions_pass() {
        let mut f = facts();
        f.width = None;
        f.height = None;
        assert!(matches!(check(Path::new("/p/a.tiff"), 1, &f), Verdict::Accepted { .. }));
    }

    #[test]
    fn test_dms_conversion() {
        let lat = dms_to_decimal(&[51.0, 16.0, 26.76], Some("N")).unwrap();
        assert!((lat - 51.2741).abs() < 1e-9);
        let lon = dms_to_decimal(&[0.0, 50.0, 44.16], Some("W")).unwrap();
        assert!((lon + 0.8456).abs() < 1e-9);
        assert_eq!(dms_to_decimal(&[12.5], None), Some(12.5));
        assert_eq!(dms_to_decimal(&[], Some("N")), None);
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(
            gps_timestamp("2021:05:04", &[9.0, 30.0, 15.5]),
            Some(Utc.with_ymd_and_hms(2021, 5, 4, 9, 30, 15).unwrap() + chrono::Duration::milliseconds(500))
        );
        assert_eq!(gps_timestamp("2021:05:04", &[9.0, 30.0]), None);
        assert_eq!(gps_timestamp("garbage", &[9.0, 30.0, 0.0]), None);
        assert_eq!(
            original_timestamp("2021:05:04 10:30:00"),
            Some(Utc.with_ymd_and_hms(2021, 5, 4, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_validate_directory_skips_hidden_and_reports_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
        std::fs::write(dir.path().join(".hidden.jpg"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/deep.jpg"), b"x").unwrap();

        let validation = validate_path(dir.path()).unwrap();
        assert!(validation.accepted.is_empty());
        let names: Vec<String> = validation
            .rejected
            .iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["broken.jpg", "notes.txt"]);
        assert_eq!(validation.rejected[1].reasons, vec!["unsupported file type"]);
        assert!(validation.rejected[0].reasons[0].starts_with("cannot read EXIF data"));
    }

    #[test]
    fn test_validate_missing_path() {
        let err = validate_path(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }
}
