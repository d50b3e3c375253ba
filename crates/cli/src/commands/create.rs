use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use dialoguer::Select;
use tourer_core::domain::{Backend, TourDraft, Transport, ValidatedFile};
use tourer_core::sync::SyncProgress;
use tourer_core::validate;
use tourer_core::Tourer;

use super::{confirm, confirmer, parse_tags, print_report, print_validation, ProgressView};

pub struct CreateArgs {
    pub path: PathBuf,
    pub name: String,
    pub description: String,
    pub tags: String,
    pub transport: Option<Transport>,
    pub integrations: Vec<Backend>,
}

pub fn run(tourer: &mut Tourer, args: CreateArgs, yes: bool) -> Result<()> {
    let files = validated_files(&args.path, yes)?;

    let transport = match args.transport {
        Some(transport) => transport,
        None if yes => bail!("--transport is required with --yes"),
        None => choose_transport()?,
    };
    let draft = TourDraft {
        name: args.name,
        description: args.description,
        tags: parse_tags(&args.tags),
        transport,
    };

    let mut gate = confirmer(yes);
    let mut view = ProgressView::new();
    let mut on_progress = |event: SyncProgress| view.handle(event);
    let (tour, report) = tourer
        .engine(gate.as_mut())
        .with_progress(&mut on_progress)
        .create_tour(draft, &files, &args.integrations)?;

    println!();
    println!("  Created tour {} ({}) with {} photos", tour.name, tour.tour_id, files.len());
    print_report(&report);
    Ok(())
}

/// Validate `path` and return the accepted files; rejections are printed
/// and, unless `yes`, the operator decides whether to go on without them.
pub(crate) fn validated_files(path: &Path, yes: bool) -> Result<Vec<ValidatedFile>> {
    println!();
    println!("  Validating {}", path.display());
    let validation = validate::validate_path(path)?;
    let accepted = print_validation(&validation);

    if accepted == 0 {
        bail!("no valid photos found in {}", path.display());
    }
    if !validation.rejected.is_empty()
        && !confirm(&format!("Continue with the {accepted} valid photos?"), yes)
    {
        bail!("cancelled");
    }
    Ok(validation.accepted)
}

fn choose_transport() -> Result<Transport> {
    let choices = Transport::all();
    let labels: Vec<String> = choices.iter().map(|t| t.to_string()).collect();
    let index = Select::new()
        .with_prompt("Transport")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(choices[index])
}
