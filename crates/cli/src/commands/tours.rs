use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tourer_core::domain::{Backend, Photo, Tour};
use tourer_core::Tourer;

pub fn list(tourer: &Tourer) -> Result<()> {
    let tours = tourer.tours()?;
    if tours.is_empty() {
        println!("No tours yet. Create one with `tourer createtour <path> --name <name>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID"),
        Cell::new("Name"),
        Cell::new("Transport"),
        Cell::new("Photos"),
        Cell::new("Integrations"),
        Cell::new("Created"),
    ]);

    for tour in &tours {
        let photo_count = tourer.photos(&tour.tour_id)?.len();
        table.add_row(vec![
            Cell::new(&tour.tour_id),
            Cell::new(&tour.name),
            Cell::new(tour.transport),
            Cell::new(photo_count),
            Cell::new(integration_names(tour)),
            Cell::new(format_timestamp(tour.created)),
        ]);
    }

    println!("{table}");
    Ok(())
}

pub fn photos(tourer: &Tourer, tour_id: &str) -> Result<()> {
    let tour = tourer.tour(tour_id)?;
    let photos = tourer.photos(tour_id)?;

    println!();
    println!("  {} ({})", tour.name, tour.tour_id);
    println!("  {}", "-".repeat(tour.name.chars().count() + tour.tour_id.len() + 3));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let mut header = vec![
        Cell::new("ID"),
        Cell::new("File"),
        Cell::new("Taken"),
        Cell::new("Position"),
        Cell::new("Links"),
    ];
    header.extend(tour.integrations.iter().map(|b| Cell::new(b.display_name())));
    table.set_header(header);

    for photo in &photos {
        let mut row = vec![
            Cell::new(&photo.photo_id),
            Cell::new(&photo.filename),
            Cell::new(photo.taken.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(position(photo)),
            Cell::new(photo.connections.len()),
        ];
        row.extend(tour.integrations.iter().map(|b| sync_cell(photo, b)));
        table.add_row(row);
    }

    println!("{table}");
    println!("  {} photos", photos.len());
    Ok(())
}

fn sync_cell(photo: &Photo, backend: Backend) -> Cell {
    match photo.remote_id(backend) {
        Some(_) => Cell::new("✓").fg(Color::Green),
        None => Cell::new("pending").fg(Color::Yellow),
    }
}

pub(crate) fn integration_names(tour: &Tour) -> String {
    if tour.integrations.is_empty() {
        return "-".to_string();
    }
    tour.integrations
        .iter()
        .map(|b| b.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn position(photo: &Photo) -> String {
    format!(
        "{}, {} ({} m)",
        photo.latitude.as_str(),
        photo.longitude.as_str(),
        photo.elevation.as_str()
    )
}

pub(crate) fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourer_core::domain::{IntegrationSet, TourType, Transport, TransportType};

    fn tour(integrations: IntegrationSet) -> Tour {
        Tour {
            tour_id: "abcd1234".into(),
            name: "Coast".into(),
            description: String::new(),
            tags: vec![],
            transport: Transport::new(TourType::Land, TransportType::Hike).unwrap(),
            integrations,
            metadata_tour_id: None,
            created: 0,
        }
    }

    #[test]
    fn test_integration_names_empty() {
        assert_eq!(integration_names(&tour(IntegrationSet::new())), "-");
    }

    #[test]
    fn test_integration_names_in_push_order() {
        let set: IntegrationSet = [Backend::MetadataHost, Backend::TrailHost].into_iter().collect();
        assert_eq!(
            integration_names(&tour(set)),
            "Open Trail View, Trek View Explorer"
        );
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13");
    }
}
