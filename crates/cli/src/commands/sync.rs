use anyhow::Result;
use tourer_core::domain::Backend;
use tourer_core::sync::{PullReport, SyncProgress};
use tourer_core::Tourer;
use tracing::warn;

use super::{confirmer, print_report, ProgressView};

pub fn pull(tourer: &mut Tourer, yes: bool) -> Result<()> {
    let mut gate = confirmer(yes);
    let report = tourer.engine(gate.as_mut()).sync_pull()?;

    println!();
    for line in pull_lines(&report) {
        println!("  {line}");
    }
    Ok(())
}

pub fn force(tourer: &mut Tourer, yes: bool) -> Result<()> {
    let mut gate = confirmer(yes);

    if tourer.enabled_backends().contains(&Backend::PanoramaHost) {
        match tourer.engine(gate.as_mut()).refresh_panorama_status() {
            Ok(updated) => println!("  Refreshed {updated} panorama records"),
            Err(err) => warn!(error = %err, "panorama status refresh failed"),
        }
    }

    let mut view = ProgressView::new();
    let mut on_progress = |event: SyncProgress| view.handle(event);
    let report = tourer
        .engine(gate.as_mut())
        .with_progress(&mut on_progress)
        .sync_push()?;

    print_report(&report);
    if report.is_clean() {
        println!();
        println!("  Everything is in sync.");
    }
    Ok(())
}

pub(crate) fn pull_lines(report: &PullReport) -> Vec<String> {
    let mut lines = vec![
        format!("Tours updated:   {}", report.tours_updated),
        format!("Photos updated:  {}", report.photos_updated),
    ];
    if report.tours_skipped > 0 || report.photos_skipped > 0 {
        lines.push(format!(
            "Skipped {} tours and {} photos not present locally",
            report.tours_skipped, report.photos_skipped
        ));
    }
    lines
}
