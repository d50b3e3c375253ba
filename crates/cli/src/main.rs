mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tourer_core::config::{self, Config};
use tourer_core::domain::{Backend, Transport};
use tourer_core::Tourer;
use tracing_subscriber::EnvFilter;

/// Tourer: sync 360° photo tours to Street View, Open Trail View and Explorer
#[derive(Parser)]
#[command(name = "tourer", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value_os_t = config::default_path())]
    config: PathBuf,

    /// Answer yes to every confirmation prompt
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every tour in the catalog
    Listtours,
    /// List the photos of one tour
    Listphotos {
        /// Tour ID
        tour_id: String,
    },
    /// Show integration and catalog status
    Status,
    /// Create a tour from a photo file or directory and push it
    Createtour {
        /// Photo file, or directory of photos
        path: PathBuf,
        /// Tour name (must be unique)
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Comma separated tags
        #[arg(long, default_value = "")]
        tags: String,
        /// Transport such as Land-Hike (prompted when omitted)
        #[arg(long, value_parser = commands::parse_transport)]
        transport: Option<Transport>,
        /// Backend to push to; repeat for several
        #[arg(long = "integration", value_parser = commands::parse_backend)]
        integrations: Vec<Backend>,
    },
    /// Change an existing tour
    Updatetour {
        /// Tour ID
        tour_id: String,
        #[command(subcommand)]
        action: UpdateAction,
    },
    /// Pull tour and photo records from the metadata host
    Pull,
    /// Re-push every tour to every backend it belongs to
    Forcesync,
}

#[derive(Subcommand)]
enum UpdateAction {
    /// Edit description, tags or transport
    Edit {
        #[arg(long)]
        description: Option<String>,
        /// Comma separated tags
        #[arg(long)]
        tags: Option<String>,
        #[arg(long, value_parser = commands::parse_transport)]
        transport: Option<Transport>,
    },
    /// Import more photos into the tour
    AddPhotos {
        /// Photo file, or directory of photos
        path: PathBuf,
    },
    /// Delete one photo locally and from every backend
    DeletePhoto {
        /// Photo ID
        photo_id: String,
    },
    /// Push the tour to one more backend
    AddIntegration {
        #[arg(value_parser = commands::parse_backend)]
        backend: Backend,
    },
    /// Delete the tour from one backend
    RemoveIntegration {
        #[arg(value_parser = commands::parse_backend)]
        backend: Backend,
    },
    /// Delete the tour locally and from every backend
    Delete,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("tourer=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Listtours => commands::tours::list(&Tourer::open_offline(&config)?)?,
        Commands::Listphotos { tour_id } => {
            commands::tours::photos(&Tourer::open_offline(&config)?, &tour_id)?
        }
        Commands::Status => commands::status::run(&Tourer::connect(&config)?)?,
        Commands::Createtour {
            path,
            name,
            description,
            tags,
            transport,
            integrations,
        } => {
            let mut tourer = Tourer::connect(&config)?;
            let args = commands::create::CreateArgs {
                path,
                name,
                description,
                tags,
                transport,
                integrations,
            };
            commands::create::run(&mut tourer, args, cli.yes)?
        }
        Commands::Updatetour { tour_id, action } => {
            let mut tourer = Tourer::connect(&config)?;
            let yes = cli.yes;
            match action {
                UpdateAction::Edit {
                    description,
                    tags,
                    transport,
                } => commands::update::edit(&mut tourer, &tour_id, description, tags, transport, yes)?,
                UpdateAction::AddPhotos { path } => {
                    commands::update::add_photos(&mut tourer, &tour_id, &path, yes)?
                }
                UpdateAction::DeletePhoto { photo_id } => {
                    commands::update::delete_photo(&mut tourer, &tour_id, &photo_id, yes)?
                }
                UpdateAction::AddIntegration { backend } => {
                    commands::update::add_integration(&mut tourer, &tour_id, backend, yes)?
                }
                UpdateAction::RemoveIntegration { backend } => {
                    commands::update::remove_integration(&mut tourer, &tour_id, backend, yes)?
                }
                UpdateAction::Delete => commands::update::delete(&mut tourer, &tour_id, yes)?,
            }
        }
        Commands::Pull => commands::sync::pull(&mut Tourer::connect(&config)?, cli.yes)?,
        Commands::Forcesync => commands::sync::force(&mut Tourer::connect(&config)?, cli.yes)?,
    }

    Ok(())
}
