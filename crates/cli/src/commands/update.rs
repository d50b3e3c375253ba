use std::path::Path;

use anyhow::{bail, Result};
use dialoguer::Input;
use tourer_core::domain::{Backend, TourEdit, Transport};
use tourer_core::sync::{SyncProgress, SyncReport, SyncEngine};
use tourer_core::Tourer;

use super::create::validated_files;
use super::{confirm, confirmer, parse_tags, print_report, ProgressView};

/// Run one engine operation with prompts and progress bars attached.
fn with_engine<F>(tourer: &mut Tourer, yes: bool, op: F) -> Result<SyncReport>
where
    F: FnOnce(&mut SyncEngine<'_>) -> tourer_core::error::Result<SyncReport>,
{
    let mut gate = confirmer(yes);
    let mut view = ProgressView::new();
    let mut on_progress = |event: SyncProgress| view.handle(event);
    let mut engine = tourer.engine(gate.as_mut()).with_progress(&mut on_progress);
    Ok(op(&mut engine)?)
}

pub fn edit(
    tourer: &mut Tourer,
    tour_id: &str,
    description: Option<String>,
    tags: Option<String>,
    transport: Option<Transport>,
    yes: bool,
) -> Result<()> {
    let edit = TourEdit {
        description,
        tags: tags.as_deref().map(parse_tags),
        transport,
    };
    if edit.is_empty() {
        bail!("nothing to change: pass --description, --tags or --transport");
    }

    let report = with_engine(tourer, yes, |engine| engine.edit_tour(tour_id, edit))?;
    println!("  Updated tour {tour_id}");
    print_report(&report);
    Ok(())
}

pub fn add_photos(tourer: &mut Tourer, tour_id: &str, path: &Path, yes: bool) -> Result<()> {
    let tour = tourer.tour(tour_id)?;
    let files = validated_files(path, yes)?;

    let report = with_engine(tourer, yes, |engine| engine.add_photos(tour_id, &files))?;
    println!();
    println!("  Added {} photos to {}", files.len(), tour.name);
    print_report(&report);
    Ok(())
}

pub fn delete_photo(tourer: &mut Tourer, tour_id: &str, photo_id: &str, yes: bool) -> Result<()> {
    let photo = tourer.photo(photo_id)?;
    if photo.tour_id != tour_id {
        bail!("photo {photo_id} does not belong to tour {tour_id}");
    }
    if !confirm(&format!("Delete photo {} ({})?", photo.filename, photo_id), yes) {
        bail!("cancelled");
    }

    let report = with_engine(tourer, yes, |engine| engine.delete_photo(photo_id))?;
    println!("  Deleted photo {photo_id}");
    print_report(&report);
    Ok(())
}

pub fn add_integration(tourer: &mut Tourer, tour_id: &str, backend: Backend, yes: bool) -> Result<()> {
    let report = with_engine(tourer, yes, |engine| engine.add_integration(tour_id, backend))?;
    if report.backend(backend).membership_granted {
        println!("  {tour_id} is now on {}", backend.display_name());
    } else {
        println!("  {tour_id} could not be added to {}", backend.display_name());
    }
    print_report(&report);
    Ok(())
}

pub fn remove_integration(
    tourer: &mut Tourer,
    tour_id: &str,
    backend: Backend,
    yes: bool,
) -> Result<()> {
    let tour = tourer.tour(tour_id)?;
    if !confirm(
        &format!("Delete {} from {}?", tour.name, backend.display_name()),
        yes,
    ) {
        bail!("cancelled");
    }

    let report = with_engine(tourer, yes, |engine| engine.remove_integration(tour_id, backend))?;
    println!("  Removed {tour_id} from {}", backend.display_name());
    print_report(&report);
    Ok(())
}

pub fn delete(tourer: &mut Tourer, tour_id: &str, yes: bool) -> Result<()> {
    let tour = tourer.tour(tour_id)?;
    if !yes {
        let typed: String = Input::new()
            .with_prompt(format!(
                "This deletes {} locally and from every integration. Type DELETE to continue",
                tour.name
            ))
            .allow_empty(true)
            .interact_text()?;
        if !delete_confirmed(&typed) {
            bail!("cancelled");
        }
    }

    let report = with_engine(tourer, yes, |engine| engine.delete_tour(tour_id))?;
    println!("  Deleted tour {} ({tour_id})", tour.name);
    print_report(&report);
    Ok(())
}

pub(crate) fn delete_confirmed(typed: &str) -> bool {
    typed.trim() == "DELETE"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_confirmed_requires_exact_word() {
        assert!(delete_confirmed("DELETE"));
        assert!(delete_confirmed("  DELETE\n"));
        assert!(!delete_confirmed("delete"));
        assert!(!delete_confirmed(""));
    }
}
