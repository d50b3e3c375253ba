use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tourer_core::sync::IntegrationStatus;
use tourer_core::{CatalogStatus, Tourer};

pub fn run(tourer: &Tourer) -> Result<()> {
    let integrations = tourer.integrations_status();
    let status = tourer.status()?;

    println!();
    println!("  Integrations");
    println!("  ------------");
    println!("{}", integrations_table(&integrations));

    println!();
    println!("  Catalog");
    println!("  -------");
    for line in summary_lines(&status) {
        println!("  {line}");
    }
    println!();
    Ok(())
}

fn integrations_table(integrations: &[IntegrationStatus]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Backend"),
        Cell::new("Status"),
        Cell::new("Detail"),
    ]);
    for integration in integrations {
        let state = if integration.enabled {
            Cell::new("Active").fg(Color::Green)
        } else {
            Cell::new("Disabled").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(integration.backend.display_name()),
            state,
            Cell::new(&integration.detail),
        ]);
    }
    table
}

pub(crate) fn summary_lines(status: &CatalogStatus) -> Vec<String> {
    let mut lines = vec![
        format!("{:<20} {}", "Tours", status.tours),
        format!("{:<20} {}", "Photos", status.photos),
    ];
    for (backend, synced) in &status.synced {
        lines.push(format!(
            "{:<20} {}/{} synced",
            backend.display_name(),
            synced,
            status.photos
        ));
    }
    lines
}
