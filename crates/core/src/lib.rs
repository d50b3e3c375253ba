pub mod backend;
pub mod catalog;
pub mod config;
pub mod connections;
pub mod domain;
pub mod error;
pub mod geodesy;
pub mod sync;
pub mod upload;
pub mod validate;

use std::collections::BTreeMap;

use tracing::{info, warn};

use backend::{BackendClient, Clients, Credential, MetadataClient, PanoramaClient, TrailClient};
use catalog::Catalog;
use config::Config;
use domain::*;
use error::{Error, Result};
use sync::{ConfirmGate, IntegrationStatus, SyncEngine};

/// Catalog-wide counts shown by `tourer status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStatus {
    pub tours: usize,
    pub photos: usize,
    /// Photos holding a remote id, per backend.
    pub synced: BTreeMap<Backend, usize>,
}

/// The main entry point for the tourer library: the catalog plus one
/// client per backend, built once and passed to every operation.
pub struct Tourer {
    catalog: Catalog,
    clients: Clients,
}

impl Tourer {
    /// Open the catalog and build the backend clients, checking each
    /// configured credential against its backend. Rejected credentials
    /// leave that client disabled.
    pub fn connect(config: &Config) -> Result<Self> {
        let catalog = Catalog::open(&config.database_path())?;
        let clients = build_clients(config, true)?;
        Ok(Self { catalog, clients })
    }

    /// Like [`Tourer::connect`], without contacting any backend.
    pub fn open_offline(config: &Config) -> Result<Self> {
        let catalog = Catalog::open(&config.database_path())?;
        let clients = build_clients(config, false)?;
        Ok(Self { catalog, clients })
    }

    pub fn with_clients(catalog: Catalog, clients: Clients) -> Self {
        Self { catalog, clients }
    }

    /// A sync engine over this catalog and these clients.
    pub fn engine<'a>(&'a mut self, confirm: &'a mut dyn ConfirmGate) -> SyncEngine<'a> {
        SyncEngine::new(&mut self.catalog, &self.clients, confirm)
    }

    pub fn tours(&self) -> Result<Vec<Tour>> {
        self.catalog.list_tours()
    }

    pub fn tour(&self, tour_id: &str) -> Result<Tour> {
        self.catalog.get_tour(tour_id)
    }

    /// Photos of one tour, in import order.
    pub fn photos(&self, tour_id: &str) -> Result<Vec<Photo>> {
        self.catalog.get_tour(tour_id)?;
        self.catalog.list_photos(tour_id)
    }

    pub fn photo(&self, photo_id: &str) -> Result<Photo> {
        self.catalog.get_photo(photo_id)
    }

    pub fn status(&self) -> Result<CatalogStatus> {
        let photos = self.catalog.list_all_photos()?;
        let mut synced = BTreeMap::new();
        for backend in Backend::ALL {
            let count = photos.iter().filter(|p| p.remote_id(backend).is_some()).count();
            synced.insert(backend, count);
        }
        Ok(CatalogStatus {
            tours: self.catalog.list_tours()?.len(),
            photos: photos.len(),
            synced,
        })
    }

    pub fn integrations_status(&self) -> Vec<IntegrationStatus> {
        sync::integrations_status(&self.clients)
    }

    /// Backends whose clients can be used right now.
    pub fn enabled_backends(&self) -> Vec<Backend> {
        self.clients
            .iter()
            .filter(|c| c.is_enabled())
            .map(|c| c.backend())
            .collect()
    }
}

// ── Client construction ──────────────────────────────────────────

fn build_clients(config: &Config, verify: bool) -> Result<Clients> {
    let panorama = connect_client(config.credential(Backend::PanoramaHost), verify, |credential| {
        PanoramaClient::new(credential, config.base_url(Backend::PanoramaHost))
    })?;
    let trail = connect_client(config.credential(Backend::TrailHost), verify, |credential| {
        TrailClient::new(credential, config.base_url(Backend::TrailHost))
    })?;
    let metadata = connect_client(config.credential(Backend::MetadataHost), verify, |credential| {
        MetadataClient::new(
            credential,
            config.base_url(Backend::MetadataHost),
            config.client_version(),
        )
    })?;
    Ok(Clients::new(panorama, trail, metadata))
}

/// Build a client; when `verify` is set and the backend refuses the
/// credential, rebuild it disabled with the refusal as the reason.
/// Network trouble during the check leaves the client enabled.
fn connect_client<C, F>(credential: Credential, verify: bool, make: F) -> Result<Box<dyn BackendClient>>
where
    C: BackendClient + 'static,
    F: Fn(Credential) -> Result<C>,
{
    let client = make(credential)?;
    if !verify || !client.is_enabled() {
        return Ok(Box::new(client));
    }

    let backend = client.backend();
    match client.verify() {
        Ok(()) => {
            info!(%backend, "credentials accepted");
            Ok(Box::new(client))
        }
        Err(Error::Rejected { status, message, .. }) => {
            warn!(%backend, status, %message, "credentials rejected, integration disabled");
            Ok(Box::new(make(Credential::Invalid(format!("status {status}")))?))
        }
        Err(err) => {
            warn!(%backend, error = %err, "could not verify credentials");
            Ok(Box::new(client))
        }
    }
}
