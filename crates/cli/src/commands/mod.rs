pub mod create;
pub mod status;
pub mod sync;
pub mod tours;
pub mod update;

use std::time::Duration;

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use dialoguer::Confirm;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tourer_core::domain::{Backend, Transport};
use tourer_core::sync::{ConfirmGate, Preconfirmed, Prompt, SyncProgress, SyncReport};
use tourer_core::validate::Validation;
use tracing::warn;

// ── Argument parsing ─────────────────────────────────────────────

pub(crate) fn parse_backend(s: &str) -> Result<Backend, String> {
    s.parse::<Backend>().map_err(|e| e.to_string())
}

pub(crate) fn parse_transport(s: &str) -> Result<Transport, String> {
    s.parse::<Transport>().map_err(|e| e.to_string())
}

/// Split a comma separated tag list, dropping blanks.
pub(crate) fn parse_tags(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

// ── Prompts ──────────────────────────────────────────────────────

/// A failed prompt (closed terminal, no tty) is logged and counts as "no".
pub(crate) fn answer_or_no(answer: dialoguer::Result<bool>) -> bool {
    match answer {
        Ok(answer) => answer,
        Err(err) => {
            warn!(error = %err, "prompt failed, treating the answer as no");
            false
        }
    }
}

fn ask_yes_no(question: &str) -> bool {
    answer_or_no(
        Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact(),
    )
}

fn ask(prompt: &Prompt) -> bool {
    ask_yes_no(&prompt.message())
}

/// The confirmation gate handed to the engine.
pub(crate) fn confirmer(yes: bool) -> Box<dyn ConfirmGate> {
    if yes {
        Box::new(Preconfirmed(true))
    } else {
        Box::new(ask)
    }
}

/// A yes/no question outside the engine; `--yes` answers it.
pub(crate) fn confirm(question: &str, yes: bool) -> bool {
    yes || ask_yes_no(question)
}

// ── Progress ─────────────────────────────────────────────────────

fn active_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {bar:30.cyan/blue} {spinner:.green} {pos:>5}/{len:<5} {prefix:.dim} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("  {bar:30.green} {prefix:.green} {msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Renders engine progress events as one bar per backend.
pub(crate) struct ProgressView {
    mp: MultiProgress,
    bar: Option<ProgressBar>,
    failed: usize,
}

impl ProgressView {
    pub(crate) fn new() -> Self {
        Self {
            mp: MultiProgress::new(),
            bar: None,
            failed: 0,
        }
    }

    pub(crate) fn handle(&mut self, event: SyncProgress) {
        match event {
            SyncProgress::TourStart { tour_id, name } => {
                self.mp.println(String::new()).ok();
                self.mp.println(format!("  Syncing {name} ({tour_id})")).ok();
            }
            SyncProgress::BackendStart { backend, pending } => {
                if let Some(pb) = self.bar.take() {
                    pb.finish_and_clear();
                    self.mp.remove(&pb);
                }
                self.failed = 0;
                let pb = self.mp.add(ProgressBar::new(pending as u64));
                pb.set_style(active_style());
                pb.set_prefix(backend.display_name());
                pb.set_message(String::new());
                pb.enable_steady_tick(Duration::from_millis(80));
                self.bar = Some(pb);
            }
            SyncProgress::PhotoPushed { photo_id, .. } => {
                if let Some(ref pb) = self.bar {
                    pb.set_message(photo_id);
                    pb.inc(1);
                }
            }
            SyncProgress::PhotoFailed {
                photo_id, message, ..
            } => {
                self.failed += 1;
                if let Some(ref pb) = self.bar {
                    pb.inc(1);
                    pb.println(format!("  ✗ {photo_id}: {message}"));
                }
            }
            SyncProgress::BackendDone { backend, uploaded } => {
                if let Some(pb) = self.bar.take() {
                    pb.set_style(done_style());
                    pb.set_prefix(backend.display_name());
                    pb.finish_with_message(backend_summary(uploaded, self.failed));
                }
            }
        }
    }
}

pub(crate) fn backend_summary(uploaded: usize, failed: usize) -> String {
    match failed {
        0 => format!("{uploaded} uploaded"),
        n => format!("{uploaded} uploaded, {n} failed"),
    }
}

// ── Reports ──────────────────────────────────────────────────────

pub(crate) fn print_report(report: &SyncReport) {
    println!();
    for (backend, entry) in &report.backends {
        let mut parts = Vec::new();
        if entry.uploaded > 0 {
            parts.push(format!("{} uploaded", entry.uploaded));
        }
        if entry.updated > 0 {
            parts.push(format!("{} updated", entry.updated));
        }
        if entry.deleted > 0 {
            parts.push(format!("{} deleted", entry.deleted));
        }
        if entry.membership_granted {
            parts.push("integration added".to_string());
        }
        if parts.is_empty() {
            parts.push("nothing to do".to_string());
        }
        println!("  {:<20} {}", backend.display_name(), parts.join(", "));
    }

    if report.is_clean() {
        return;
    }

    println!();
    println!("  Failures");
    println!("  --------");
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Backend"),
        Cell::new("Tour"),
        Cell::new("Photo"),
        Cell::new("Error"),
    ]);
    for failure in &report.failures {
        table.add_row(vec![
            Cell::new(failure.backend.display_name()),
            Cell::new(&failure.tour_id),
            Cell::new(failure.photo_id.as_deref().unwrap_or("-")),
            Cell::new(&failure.message).fg(Color::Red),
        ]);
    }
    println!("{table}");
    println!("  Run `tourer forcesync` to retry.");
}

/// Print rejected files and warnings; returns how many files were accepted.
pub(crate) fn print_validation(validation: &Validation) -> usize {
    for rejection in &validation.rejected {
        println!(
            "  ✗ {}: {}",
            rejection.path.display(),
            rejection.reasons.join("; ")
        );
    }
    for (path, warning) in &validation.warnings {
        println!("  ! {}: {warning}", path.display());
    }
    println!(
        "  {} valid, {} rejected",
        validation.accepted.len(),
        validation.rejected.len()
    );
    validation.accepted.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_tags ──────────────────────────────────────────────────

    #[test]
    fn test_parse_tags_trims_and_drops_blanks() {
        assert_eq!(parse_tags(" city, old town ,,"), vec!["city", "old town"]);
    }

    #[test]
    fn test_parse_tags_empty() {
        assert!(parse_tags("").is_empty());
    }

    // ── parse_backend / parse_transport ─────────────────────────────

    #[test]
    fn test_parse_backend_short_names() {
        assert_eq!(parse_backend("trail"), Ok(Backend::TrailHost));
        assert_eq!(parse_backend("panorama-host"), Ok(Backend::PanoramaHost));
        assert!(parse_backend("flickr").is_err());
    }

    #[test]
    fn test_parse_transport() {
        let transport = parse_transport("land-hike").unwrap();
        assert_eq!(transport.to_string(), "Land-Hike");
        assert!(parse_transport("Water-Hike").is_err());
    }

    // ── backend_summary ─────────────────────────────────────────────

    #[test]
    fn test_backend_summary() {
        assert_eq!(backend_summary(3, 0), "3 uploaded");
        assert_eq!(backend_summary(1, 2), "1 uploaded, 2 failed");
    }

    #[test]
    fn test_failed_prompt_counts_as_no() {
        let closed = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "terminal closed");
        assert!(!answer_or_no(Err(closed.into())));
        assert!(answer_or_no(Ok(true)));
    }

    #[test]
    fn test_preconfirmed_when_yes() {
        let mut gate = confirmer(true);
        assert!(gate.confirm(&Prompt::PanoramaTerms));
    }
}
