//! Translation of a local photo into the metadata host's bracketed form fields.

use std::collections::HashMap;

use crate::backend::metadata::TAKEN_AT_FORMAT;
use crate::backend::PhotoForm;
use crate::domain::{Backend, Photo};

/// A photo's form plus the number of connections whose target has no
/// metadata-host id yet (sent without a `photo_id`).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub form: PhotoForm,
    pub unresolved: usize,
}

/// Local photo id → metadata-host photo id, for every photo that has one.
pub fn metadata_ids(photos: &[Photo]) -> HashMap<String, String> {
    photos
        .iter()
        .filter_map(|p| {
            p.remote_id(Backend::MetadataHost)
                .map(|id| (p.photo_id.clone(), id.to_string()))
        })
        .collect()
}

pub fn photo_snapshot(photo: &Photo, metadata_ids: &HashMap<String, String>) -> Snapshot {
    let mut form = PhotoForm::new();

    form.push("tourer[photo_id]", photo.photo_id.as_str());
    form.push("filename", photo.filename.as_str());
    form.push("taken_at", photo.taken.format(TAKEN_AT_FORMAT).to_string());
    form.push("latitude", photo.latitude.as_str());
    form.push("longitude", photo.longitude.as_str());
    form.push("elevation_meters", photo.elevation.as_str());
    form.push_opt("camera_make", photo.camera_make.as_deref());
    form.push_opt("camera_model", photo.camera_model.as_deref());
    form.push_opt("google[plus_code_global_code]", photo.location_code.as_deref());
    form.push_opt("address[country]", photo.country.as_deref());
    form.push_opt("address[country_code]", photo.country_code.as_deref());

    let sv = &photo.panorama;
    if let Some(id) = photo.remote_id(Backend::PanoramaHost) {
        form.push("streetview[photo_id]", id);
        form.push_opt("streetview[capture_time]", sv.capture_time.as_deref());
        form.push_opt("streetview[share_link]", sv.share_link.as_deref());
        form.push_opt("streetview[download_url]", sv.download_url.as_deref());
        form.push_opt("streetview[thumbnail_url]", sv.thumbnail_url.as_deref());
        form.push_opt("streetview[lat]", sv.latitude.as_deref());
        form.push_opt("streetview[lon]", sv.longitude.as_deref());
        form.push_opt("streetview[altitude]", sv.altitude.as_deref());
        form.push("streetview[heading]", sv.heading.unwrap_or(0.0).to_string());
        form.push("streetview[pitch]", sv.pitch.unwrap_or(0.0).to_string());
        form.push("streetview[roll]", sv.roll.unwrap_or(0.0).to_string());
        form.push_opt("streetview[level]", sv.level.as_deref());
    }
    form.push_opt("opentrailview[photo_id]", photo.remote_id(Backend::TrailHost));

    form.push_opt("tourer[heading_degrees]", photo.heading.map(|h| h.to_string()));

    let mut unresolved = 0;
    for (i, c) in photo.connections.iter().enumerate() {
        let prefix = format!("tourer[connections][{i}]");
        match metadata_ids.get(&c.photo_id) {
            Some(remote) => form.push(format!("{prefix}[photo_id]"), remote.as_str()),
            None => unresolved += 1,
        }
        form.push(format!("{prefix}[distance_meters]"), c.distance.to_string());
        form.push(format!("{prefix}[elevation_meters]"), c.elevation.to_string());
        form.push(format!("{prefix}[pitch_degrees]"), c.pitch.to_string());
        form.push(format!("{prefix}[heading_degrees]"), c.heading.to_string());
        form.push_opt(
            format!("{prefix}[adjusted_heading_degrees]"),
            c.adjusted_heading.map(|h| h.to_string()),
        );
    }

    Snapshot { form, unresolved }
}
