//! Reconciliation of local tours with the remote backends.
//!
//! Every remote success is written to the catalog before the next call,
//! so an interrupted run resumes at the first photo still missing a
//! remote id. Per-photo failures never abort a tour, per-backend failures
//! never abort other backends; both are collected in a [`SyncReport`].

pub mod snapshot;

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::backend::{
    BackendClient, Clients, PhotoRef, PhotoUpload, RemotePhoto, RemotePhotoRecord, RemoteTour,
    TourFields, TourRef,
};
use crate::catalog::Catalog;
use crate::connections::build_connections;
use crate::domain::*;
use crate::error::{Error, Result};
use snapshot::{metadata_ids, photo_snapshot};

// ── Operator interaction ─────────────────────────────────────────

/// Questions the engine may put to the operator mid-operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Accept the panorama host's terms of service before pushing to it.
    PanoramaTerms,
    /// A remote photo could not be deleted; continue without it?
    SkipFailedPhotoDelete { backend: Backend, photo_id: String },
    /// A remote tour record could not be deleted; continue without it?
    SkipFailedTourDelete { backend: Backend, tour_id: String },
}

impl Prompt {
    pub fn message(&self) -> String {
        match self {
            Prompt::PanoramaTerms => format!(
                "{}: do you agree to Google's Terms of Service? https://policies.google.com/terms",
                Backend::PanoramaHost.display_name()
            ),
            Prompt::SkipFailedPhotoDelete { backend, photo_id } => format!(
                "{}: photo {photo_id} cannot be deleted right now. Continue anyway? \
                 It will no longer be tracked and cannot be deleted later with tourer",
                backend.display_name()
            ),
            Prompt::SkipFailedTourDelete { backend, tour_id } => format!(
                "{}: tour {tour_id} cannot be deleted right now. Continue anyway? \
                 It will no longer be tracked and cannot be deleted later with tourer",
                backend.display_name()
            ),
        }
    }
}

/// Confirmation gate for continue-anyway decisions.
pub trait ConfirmGate {
    fn confirm(&mut self, prompt: &Prompt) -> bool;
}

/// Answers every prompt the same way (`--yes`, tests).
pub struct Preconfirmed(pub bool);

impl ConfirmGate for Preconfirmed {
    fn confirm(&mut self, _prompt: &Prompt) -> bool {
        self.0
    }
}

impl<F: FnMut(&Prompt) -> bool> ConfirmGate for F {
    fn confirm(&mut self, prompt: &Prompt) -> bool {
        self(prompt)
    }
}

// ── Progress and reports ─────────────────────────────────────────

/// Progress events emitted while syncing.
pub enum SyncProgress {
    TourStart { tour_id: String, name: String },
    BackendStart { backend: Backend, pending: usize },
    PhotoPushed { backend: Backend, photo_id: String },
    PhotoFailed { backend: Backend, photo_id: String, message: String },
    BackendDone { backend: Backend, uploaded: usize },
}

/// One entity that could not be synced, with enough detail to retry by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub backend: Backend,
    pub tour_id: String,
    pub photo_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendReport {
    pub uploaded: usize,
    pub updated: usize,
    pub deleted: usize,
    pub membership_granted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub backends: BTreeMap<Backend, BackendReport>,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn backend(&self, backend: Backend) -> BackendReport {
        self.backends.get(&backend).cloned().unwrap_or_default()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_uploaded(&self) -> usize {
        self.backends.values().map(|r| r.uploaded).sum()
    }

    fn entry(&mut self, backend: Backend) -> &mut BackendReport {
        self.backends.entry(backend).or_default()
    }

    fn fail(&mut self, backend: Backend, tour_id: &str, photo_id: Option<&str>, message: String) {
        self.failures.push(SyncFailure {
            backend,
            tour_id: tour_id.to_string(),
            photo_id: photo_id.map(String::from),
            message,
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub tours_updated: usize,
    pub photos_updated: usize,
    /// Remote tours with no local counterpart.
    pub tours_skipped: usize,
    /// Remote photos with no local counterpart.
    pub photos_skipped: usize,
}

/// How a push treats entities that already exist remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// First push of a new tour.
    Basic,
    /// The tour's photo set changed; refresh what exists, add what is missing.
    Update,
    /// Push an existing tour to one more backend.
    Integration,
    /// Repair pass over every member backend; no operator prompts.
    Force,
}

impl PushMode {
    fn refreshes_existing(&self) -> bool {
        matches!(self, PushMode::Update | PushMode::Force)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationStatus {
    pub backend: Backend,
    pub enabled: bool,
    pub detail: String,
}

// ── Engine ───────────────────────────────────────────────────────

pub struct SyncEngine<'a> {
    catalog: &'a mut Catalog,
    clients: &'a Clients,
    confirm: &'a mut dyn ConfirmGate,
    progress: Option<&'a mut dyn FnMut(SyncProgress)>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(catalog: &'a mut Catalog, clients: &'a Clients, confirm: &'a mut dyn ConfirmGate) -> Self {
        Self {
            catalog,
            clients,
            confirm,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a mut dyn FnMut(SyncProgress)) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&mut self, event: SyncProgress) {
        if let Some(ref mut cb) = self.progress {
            cb(event);
        }
    }

    fn client(&self, backend: Backend) -> &'a dyn BackendClient {
        let clients: &'a Clients = self.clients;
        clients.get(backend)
    }

    fn require_enabled(&self, backend: Backend, operation: &'static str) -> Result<()> {
        if self.client(backend).is_enabled() {
            Ok(())
        } else {
            Err(Error::Capability { backend, operation })
        }
    }

    // ── Tours ────────────────────────────────────────────────────

    /// Create a tour from validated files and push it to `backends`.
    pub fn create_tour(
        &mut self,
        draft: TourDraft,
        files: &[ValidatedFile],
        backends: &[Backend],
    ) -> Result<(Tour, SyncReport)> {
        draft.validate()?;
        if self.catalog.find_tour_by_name(&draft.name)?.is_some() {
            return Err(Error::TourNameTaken(draft.name));
        }

        let tour = Tour {
            tour_id: short_id(),
            name: draft.name,
            description: draft.description,
            tags: draft.tags,
            transport: draft.transport,
            integrations: IntegrationSet::new(),
            metadata_tour_id: None,
            created: chrono::Utc::now().timestamp(),
        };
        self.catalog.insert_tour(&tour)?;
        info!(tour_id = %tour.tour_id, name = %tour.name, "tour created");

        self.import_photos(&tour.tour_id, files)?;

        let mut report = SyncReport::default();
        let selected: IntegrationSet = backends.iter().copied().collect();
        for backend in selected.iter() {
            self.push_backend(&tour.tour_id, backend, PushMode::Basic, &mut report)?;
        }

        let tour = self.catalog.get_tour(&tour.tour_id)?;
        Ok((tour, report))
    }

    /// Add photos to an existing tour and push them to every member backend.
    pub fn add_photos(&mut self, tour_id: &str, files: &[ValidatedFile]) -> Result<SyncReport> {
        let tour = self.catalog.get_tour(tour_id)?;
        let added = self.import_photos(tour_id, files)?;
        info!(tour_id, added, "photos added");

        let mut report = SyncReport::default();
        for backend in tour.integrations.iter() {
            self.push_backend(tour_id, backend, PushMode::Update, &mut report)?;
        }
        Ok(report)
    }

    /// Change tour fields locally, then on the metadata host when it is a member.
    pub fn edit_tour(&mut self, tour_id: &str, edit: TourEdit) -> Result<SyncReport> {
        edit.validate()?;
        let mut tour = self.catalog.get_tour(tour_id)?;
        if edit.is_empty() {
            debug!(tour_id, "empty edit, nothing to send");
            return Ok(SyncReport::default());
        }
        if let Some(description) = edit.description {
            tour.description = description;
        }
        if let Some(tags) = edit.tags {
            tour.tags = tags;
        }
        if let Some(transport) = edit.transport {
            tour.transport = transport;
        }
        self.catalog.update_tour(&tour)?;

        let mut report = SyncReport::default();
        let backend = Backend::MetadataHost;
        if let Some(remote_tour_id) = tour.remote_tour_id(backend) {
            match self.client(backend).update_tour(remote_tour_id, &tour_fields(&tour)) {
                Ok(()) => report.entry(backend).updated += 1,
                Err(err) => {
                    warn!(tour_id, %backend, error = %err, "tour update failed");
                    report.fail(backend, tour_id, None, err.to_string());
                }
            }
        }
        Ok(report)
    }

    /// Push an existing tour to one backend it is not yet synced to.
    pub fn add_integration(&mut self, tour_id: &str, backend: Backend) -> Result<SyncReport> {
        let tour = self.catalog.get_tour(tour_id)?;
        if tour.integrations.contains(backend) {
            return Err(Error::AlreadyIntegrated {
                tour_id: tour_id.to_string(),
                backend,
            });
        }
        self.require_enabled(backend, "add integrations")?;

        let mut report = SyncReport::default();
        self.push_backend(tour_id, backend, PushMode::Integration, &mut report)?;
        Ok(report)
    }

    /// Delete the tour from one backend and drop it from the membership set.
    pub fn remove_integration(&mut self, tour_id: &str, backend: Backend) -> Result<SyncReport> {
        let mut tour = self.catalog.get_tour(tour_id)?;
        if !tour.integrations.contains(backend) {
            return Err(Error::NotIntegrated {
                tour_id: tour_id.to_string(),
                backend,
            });
        }
        self.require_enabled(backend, "remove integrations")?;

        let mut photos = self.catalog.list_photos(tour_id)?;
        ensure_in_sync(&tour, &photos, &[backend])?;

        let mut report = SyncReport::default();
        self.delete_remote(&mut tour, &mut photos, backend, &mut report)?;
        Ok(report)
    }

    /// Delete a tour everywhere it is synced, then locally.
    ///
    /// The local record survives unless every member backend reported
    /// success or the operator agreed to skip the failures.
    pub fn delete_tour(&mut self, tour_id: &str) -> Result<SyncReport> {
        let mut tour = self.catalog.get_tour(tour_id)?;
        let mut photos = self.catalog.list_photos(tour_id)?;
        let members: Vec<Backend> = tour.integrations.iter().collect();

        for &backend in &members {
            self.require_enabled(backend, "delete tours")?;
        }
        ensure_in_sync(&tour, &photos, &members)?;

        let mut report = SyncReport::default();
        for backend in members {
            self.delete_remote(&mut tour, &mut photos, backend, &mut report)?;
        }

        let removed = self.catalog.delete_tour(tour_id)?;
        info!(tour_id, photos = removed, "tour deleted");
        Ok(report)
    }

    /// Delete one photo everywhere it is synced, then locally, and rebuild
    /// the tour's connection graph.
    pub fn delete_photo(&mut self, photo_id: &str) -> Result<SyncReport> {
        let photo = self.catalog.get_photo(photo_id)?;
        let tour = self.catalog.get_tour(&photo.tour_id)?;
        let members: Vec<Backend> = tour.integrations.iter().collect();

        for &backend in &members {
            self.require_enabled(backend, "delete photos")?;
            if backend.has_tour_record() && tour.remote_tour_id(backend).is_none() {
                return Err(out_of_sync(backend, &tour, None));
            }
            if photo.remote_id(backend).is_none() {
                return Err(out_of_sync(backend, &tour, Some(photo_id)));
            }
        }

        let mut report = SyncReport::default();
        for &backend in &members {
            let remote_photo_id = photo.remote_id(backend).unwrap_or_default();
            let target = PhotoRef {
                remote_tour_id: tour.remote_tour_id(backend),
                remote_photo_id,
            };
            let deleted = match self.client(backend).delete_photo(&target) {
                Ok(deleted) => deleted,
                Err(err) => {
                    warn!(photo_id, %backend, error = %err, "photo delete failed");
                    false
                }
            };
            if deleted {
                report.entry(backend).deleted += 1;
                continue;
            }
            let prompt = Prompt::SkipFailedPhotoDelete {
                backend,
                photo_id: photo_id.to_string(),
            };
            if !self.confirm.confirm(&prompt) {
                return Err(Error::ConfirmationDeclined(format!(
                    "photo {photo_id} was not deleted from {backend}"
                )));
            }
            report.fail(backend, &tour.tour_id, Some(photo_id), "remote copy left behind".into());
        }

        self.catalog.delete_photo(photo_id)?;
        info!(photo_id, tour_id = %tour.tour_id, "photo deleted");

        let photos = self.recompute_connections(&tour.tour_id)?;
        if let Some(remote_tour_id) = tour.remote_tour_id(Backend::MetadataHost) {
            self.refresh_metadata_snapshots(&tour.tour_id, remote_tour_id, &photos, &mut report);
        }
        Ok(report)
    }

    // ── Pull and push ────────────────────────────────────────────

    /// Overwrite local tours and photos with their metadata-host versions.
    pub fn sync_pull(&mut self) -> Result<PullReport> {
        let client = self.client(Backend::MetadataHost);
        let owner = client.current_user()?;
        let remote_tours = client.list_tours(&owner)?;
        info!(owner = %owner, tours = remote_tours.len(), "pulling tours");

        let mut report = PullReport::default();
        for remote in &remote_tours {
            let Some(mut tour) = self.catalog.find_tour_by_metadata_id(&remote.id)? else {
                debug!(remote_id = %remote.id, "remote tour has no local counterpart");
                report.tours_skipped += 1;
                continue;
            };
            self.apply_remote_tour(&mut tour, remote)?;
            self.catalog.update_tour(&tour)?;
            report.tours_updated += 1;

            let remote_photos = match client.list_photos(&remote.id) {
                Ok(photos) => photos,
                Err(err) => {
                    warn!(tour_id = %tour.tour_id, error = %err, "could not list remote photos");
                    continue;
                }
            };

            let local_photos = self.catalog.list_photos(&tour.tour_id)?;
            let mut to_local: HashMap<String, String> = metadata_ids(&local_photos)
                .into_iter()
                .map(|(local, remote)| (remote, local))
                .collect();

            let mut matched = Vec::new();
            for record in &remote_photos {
                match self.match_remote_photo(&tour.tour_id, record)? {
                    Some(photo) => {
                        to_local.insert(record.id.clone(), photo.photo_id.clone());
                        matched.push((photo, record));
                    }
                    None => report.photos_skipped += 1,
                }
            }

            for (mut photo, record) in matched {
                apply_remote_photo(&mut photo, record, &tour.integrations, &to_local);
                self.catalog.upsert_photo(&photo)?;
                report.photos_updated += 1;
            }
        }
        Ok(report)
    }

    /// The local photo a pulled record belongs to. Records are matched by
    /// metadata id; a record whose local id names a photo of the same tour
    /// that has no metadata id yet is taken over by that photo.
    fn match_remote_photo(&self, tour_id: &str, record: &RemotePhotoRecord) -> Result<Option<Photo>> {
        if let Some(photo) = self
            .catalog
            .find_photo_by_remote(Backend::MetadataHost, &record.id)?
        {
            return Ok((photo.tour_id == tour_id).then_some(photo));
        }
        let Some(ref local_id) = record.local_photo_id else {
            return Ok(None);
        };
        match self.catalog.get_photo(local_id) {
            Ok(photo) if photo.tour_id == tour_id && photo.metadata_id.is_none() => Ok(Some(photo)),
            Ok(_) | Err(Error::PhotoNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Force sync: for every tour and member backend, upload what is missing
    /// and resend the current metadata snapshot.
    pub fn sync_push(&mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for tour in self.catalog.list_tours()? {
            self.emit(SyncProgress::TourStart {
                tour_id: tour.tour_id.clone(),
                name: tour.name.clone(),
            });
            for backend in tour.integrations.iter() {
                self.push_backend(&tour.tour_id, backend, PushMode::Force, &mut report)?;
            }
        }
        Ok(report)
    }

    /// Store the panorama host's current share links, poses and publish
    /// status. Returns the number of photos updated.
    pub fn refresh_panorama_status(&mut self) -> Result<usize> {
        let client = self.client(Backend::PanoramaHost);
        let photos = self.catalog.list_all_photos()?;
        let ids: Vec<String> = photos
            .iter()
            .filter_map(|p| p.remote_id(Backend::PanoramaHost).map(String::from))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let infos = client.photo_info(&ids)?;
        let mut updated = 0;
        for info in infos {
            let Some(photo) = photos
                .iter()
                .find(|p| p.remote_id(Backend::PanoramaHost) == Some(info.photo_id.as_str()))
            else {
                continue;
            };
            let mut photo = photo.clone();
            let pano = &mut photo.panorama;
            if info.share_link.is_some() {
                pano.share_link = info.share_link;
            }
            pano.latitude = info.latitude.or(pano.latitude.take());
            pano.longitude = info.longitude.or(pano.longitude.take());
            pano.altitude = info.altitude.or(pano.altitude.take());
            pano.heading = info.heading.or(pano.heading);
            pano.pitch = info.pitch.or(pano.pitch);
            pano.roll = info.roll.or(pano.roll);
            pano.level = info.level.or(pano.level.take());
            pano.publish_status = info.publish_status.or(pano.publish_status.take());
            self.catalog.upsert_photo(&photo)?;
            updated += 1;
        }
        info!(updated, "panorama status refreshed");
        Ok(updated)
    }

    pub fn integrations_status(&self) -> Vec<IntegrationStatus> {
        integrations_status(self.clients)
    }

    // ── Internals ────────────────────────────────────────────────

    fn import_photos(&mut self, tour_id: &str, files: &[ValidatedFile]) -> Result<usize> {
        let photos: Vec<Photo> = files
            .iter()
            .map(|file| Photo::from_validated(file, tour_id))
            .collect();
        self.catalog.upsert_photos_batch(&photos)?;
        for photo in &photos {
            debug!(tour_id, photo_id = %photo.photo_id, path = %photo.path.display(), "photo imported");
        }
        self.recompute_connections(tour_id)?;
        Ok(photos.len())
    }

    fn recompute_connections(&mut self, tour_id: &str) -> Result<Vec<Photo>> {
        let mut photos = self.catalog.list_photos(tour_id)?;
        build_connections(&mut photos);
        self.catalog.save_connections(&photos)?;
        Ok(photos)
    }

    fn push_backend(
        &mut self,
        tour_id: &str,
        backend: Backend,
        mode: PushMode,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut tour = self.catalog.get_tour(tour_id)?;
        let client = self.client(backend);

        if !client.is_enabled() {
            let err = Error::Capability {
                backend,
                operation: "push tours",
            };
            warn!(tour_id, %backend, "backend disabled, skipping");
            report.fail(backend, tour_id, None, err.to_string());
            return Ok(());
        }

        if backend == Backend::PanoramaHost
            && mode != PushMode::Force
            && !self.confirm.confirm(&Prompt::PanoramaTerms)
        {
            let err = Error::ConfirmationDeclined("terms of service not accepted".into());
            report.fail(backend, tour_id, None, err.to_string());
            return Ok(());
        }

        match backend {
            Backend::MetadataHost => self.push_metadata(&mut tour, mode, report),
            Backend::PanoramaHost | Backend::TrailHost => self.push_photos(&mut tour, backend, report),
        }
    }

    /// Upload every photo missing on a backend without a tour record.
    /// Membership is granted, and stored, with the first successful upload.
    fn push_photos(&mut self, tour: &mut Tour, backend: Backend, report: &mut SyncReport) -> Result<()> {
        let client = self.client(backend);
        let mut photos = self.catalog.list_photos(&tour.tour_id)?;
        let pending = photos.iter().filter(|p| p.remote_id(backend).is_none()).count();
        self.emit(SyncProgress::BackendStart { backend, pending });

        let mut uploaded = 0;
        for photo in photos.iter_mut() {
            if photo.remote_id(backend).is_some() {
                continue;
            }
            let upload = PhotoUpload {
                photo: &*photo,
                remote_tour_id: None,
                form: None,
            };
            match client.upload_photo(&upload) {
                Ok(remote) => {
                    apply_upload(photo, backend, &remote);
                    self.catalog.upsert_photo(photo)?;
                    if tour.integrations.insert(backend) {
                        self.catalog.update_tour(tour)?;
                        report.entry(backend).membership_granted = true;
                        info!(tour_id = %tour.tour_id, %backend, "integration added");
                    }
                    uploaded += 1;
                    self.emit(SyncProgress::PhotoPushed {
                        backend,
                        photo_id: photo.photo_id.clone(),
                    });
                }
                Err(err) => self.photo_failed(tour, photo, backend, err, report),
            }
        }

        report.entry(backend).uploaded += uploaded;
        self.emit(SyncProgress::BackendDone { backend, uploaded });
        Ok(())
    }

    /// Metadata host: ensure the tour record, add missing photos, refresh
    /// existing ones (update/force), then relink connections that pointed at
    /// photos uploaded later in the same pass.
    fn push_metadata(&mut self, tour: &mut Tour, mode: PushMode, report: &mut SyncReport) -> Result<()> {
        let backend = Backend::MetadataHost;
        let client = self.client(backend);
        let fields = tour_fields(tour);

        let remote_tour_id = match tour.remote_tour_id(backend) {
            Some(id) => {
                let id = id.to_string();
                if tour.integrations.insert(backend) {
                    self.catalog.update_tour(tour)?;
                }
                id
            }
            None => match client.create_tour(&fields) {
                Ok(id) => {
                    tour.metadata_tour_id = Some(id.clone());
                    tour.integrations.insert(backend);
                    self.catalog.update_tour(tour)?;
                    report.entry(backend).membership_granted = true;
                    info!(tour_id = %tour.tour_id, remote_id = %id, "integration added");
                    id
                }
                Err(err) => {
                    warn!(tour_id = %tour.tour_id, error = %err, "tour record creation failed");
                    report.fail(
                        backend,
                        &tour.tour_id,
                        None,
                        format!("tour record creation failed: {err}"),
                    );
                    return Ok(());
                }
            },
        };

        let mut photos = self.catalog.list_photos(&tour.tour_id)?;
        let mut ids = metadata_ids(&photos);
        let pending = photos.iter().filter(|p| p.remote_id(backend).is_none()).count();
        self.emit(SyncProgress::BackendStart { backend, pending });

        let mut uploaded = 0;
        let mut relink: Vec<(usize, usize)> = Vec::new();
        for (index, photo) in photos.iter_mut().enumerate() {
            let snap = photo_snapshot(photo, &ids);
            match photo.remote_id(backend).map(String::from) {
                Some(remote_photo_id) => {
                    if !mode.refreshes_existing() {
                        continue;
                    }
                    match client.update_photo(&remote_tour_id, &remote_photo_id, &snap.form) {
                        Ok(()) => report.entry(backend).updated += 1,
                        Err(err) => self.photo_failed(tour, photo, backend, err, report),
                    }
                }
                None => {
                    let upload = PhotoUpload {
                        photo: &*photo,
                        remote_tour_id: Some(remote_tour_id.as_str()),
                        form: Some(&snap.form),
                    };
                    match client.upload_photo(&upload) {
                        Ok(remote) => {
                            apply_upload(photo, backend, &remote);
                            self.catalog.upsert_photo(photo)?;
                            ids.insert(photo.photo_id.clone(), remote.id);
                            uploaded += 1;
                            self.emit(SyncProgress::PhotoPushed {
                                backend,
                                photo_id: photo.photo_id.clone(),
                            });
                        }
                        Err(err) => {
                            self.photo_failed(tour, photo, backend, err, report);
                            continue;
                        }
                    }
                }
            }
            if snap.unresolved > 0 {
                relink.push((index, snap.unresolved));
            }
        }

        for (index, unresolved_before) in relink {
            let photo = &photos[index];
            let snap = photo_snapshot(photo, &ids);
            if snap.unresolved >= unresolved_before {
                continue;
            }
            let Some(remote_photo_id) = photo.remote_id(backend) else {
                continue;
            };
            if let Err(err) = client.update_photo(&remote_tour_id, remote_photo_id, &snap.form) {
                self.photo_failed(tour, photo, backend, err, report);
            }
        }

        if mode.refreshes_existing() {
            if let Err(err) = client.update_tour(&remote_tour_id, &fields) {
                warn!(tour_id = %tour.tour_id, error = %err, "tour record update failed");
                report.fail(backend, &tour.tour_id, None, err.to_string());
            }
        }

        report.entry(backend).uploaded += uploaded;
        self.emit(SyncProgress::BackendDone { backend, uploaded });
        Ok(())
    }

    /// Resend every metadata snapshot after the connection graph changed.
    fn refresh_metadata_snapshots(
        &mut self,
        tour_id: &str,
        remote_tour_id: &str,
        photos: &[Photo],
        report: &mut SyncReport,
    ) {
        let backend = Backend::MetadataHost;
        let client = self.client(backend);
        let ids = metadata_ids(photos);
        for photo in photos {
            let Some(remote_photo_id) = photo.remote_id(backend) else {
                continue;
            };
            let snap = photo_snapshot(photo, &ids);
            match client.update_photo(remote_tour_id, remote_photo_id, &snap.form) {
                Ok(()) => report.entry(backend).updated += 1,
                Err(err) => {
                    warn!(tour_id, photo_id = %photo.photo_id, error = %err, "snapshot refresh failed");
                    report.fail(backend, tour_id, Some(&photo.photo_id), err.to_string());
                }
            }
        }
    }

    fn photo_failed(
        &mut self,
        tour: &Tour,
        photo: &Photo,
        backend: Backend,
        err: Error,
        report: &mut SyncReport,
    ) {
        warn!(
            tour_id = %tour.tour_id,
            photo_id = %photo.photo_id,
            %backend,
            error = %err,
            "photo sync failed"
        );
        let message = err.to_string();
        report.fail(backend, &tour.tour_id, Some(&photo.photo_id), message.clone());
        self.emit(SyncProgress::PhotoFailed {
            backend,
            photo_id: photo.photo_id.clone(),
            message,
        });
    }

    /// Delete a tour's data from one backend, then forget it locally:
    /// remote ids cleared, membership removed, all persisted together.
    ///
    /// A failure the operator declines to skip aborts with nothing
    /// cleared, so the whole removal can be retried.
    fn delete_remote(
        &mut self,
        tour: &mut Tour,
        photos: &mut [Photo],
        backend: Backend,
        report: &mut SyncReport,
    ) -> Result<()> {
        let client = self.client(backend);
        let remote_ids: Vec<String> = photos
            .iter()
            .filter_map(|p| p.remote_id(backend).map(String::from))
            .collect();

        if backend.has_tour_record() {
            let target = TourRef {
                remote_tour_id: tour.remote_tour_id(backend),
                photo_ids: &remote_ids,
            };
            let deleted = match client.delete_tour(&target) {
                Ok(deleted) => deleted,
                Err(err) => {
                    warn!(tour_id = %tour.tour_id, %backend, error = %err, "tour delete failed");
                    false
                }
            };
            if deleted {
                report.entry(backend).deleted += remote_ids.len();
            } else {
                let prompt = Prompt::SkipFailedTourDelete {
                    backend,
                    tour_id: tour.tour_id.clone(),
                };
                if !self.confirm.confirm(&prompt) {
                    return Err(Error::ConfirmationDeclined(format!(
                        "tour {} was not deleted from {backend}",
                        tour.tour_id
                    )));
                }
                report.fail(backend, &tour.tour_id, None, "remote tour left behind".into());
            }
        } else {
            let batch_deleted = backend == Backend::PanoramaHost
                && matches!(
                    client.delete_tour(&TourRef {
                        remote_tour_id: None,
                        photo_ids: &remote_ids,
                    }),
                    Ok(true)
                );

            if batch_deleted {
                report.entry(backend).deleted += remote_ids.len();
            } else {
                for photo in photos.iter() {
                    let Some(remote_photo_id) = photo.remote_id(backend) else {
                        continue;
                    };
                    let target = PhotoRef {
                        remote_tour_id: None,
                        remote_photo_id,
                    };
                    let deleted = match client.delete_photo(&target) {
                        Ok(deleted) => deleted,
                        Err(err) => {
                            warn!(photo_id = %photo.photo_id, %backend, error = %err, "photo delete failed");
                            false
                        }
                    };
                    if deleted {
                        report.entry(backend).deleted += 1;
                        continue;
                    }
                    let prompt = Prompt::SkipFailedPhotoDelete {
                        backend,
                        photo_id: photo.photo_id.clone(),
                    };
                    if !self.confirm.confirm(&prompt) {
                        return Err(Error::ConfirmationDeclined(format!(
                            "photo {} was not deleted from {backend}",
                            photo.photo_id
                        )));
                    }
                    report.fail(
                        backend,
                        &tour.tour_id,
                        Some(&photo.photo_id),
                        "remote copy left behind".into(),
                    );
                }
            }
        }

        for photo in photos.iter_mut() {
            if photo.remote_id(backend).is_some() {
                photo.clear_remote(backend);
            }
        }
        self.catalog.upsert_photos_batch(photos)?;
        if backend.has_tour_record() {
            tour.metadata_tour_id = None;
        }
        tour.integrations.remove(backend);
        self.catalog.update_tour(tour)?;
        info!(tour_id = %tour.tour_id, %backend, "integration removed");
        Ok(())
    }

    fn apply_remote_tour(&mut self, tour: &mut Tour, remote: &RemoteTour) -> Result<()> {
        if !remote.name.is_empty() && remote.name != tour.name {
            match self.catalog.find_tour_by_name(&remote.name)? {
                Some(other) if other.tour_id != tour.tour_id => {
                    warn!(tour_id = %tour.tour_id, name = %remote.name, "remote name already used locally, keeping local name");
                }
                _ => tour.name = remote.name.clone(),
            }
        }
        tour.description = remote.description.clone();
        tour.tags = remote.tags.clone();
        if let Some(transport) = remote.transport {
            tour.transport = transport;
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Per backend: whether its client is usable, and if not, why.
pub fn integrations_status(clients: &Clients) -> Vec<IntegrationStatus> {
    clients
        .iter()
        .map(|client| IntegrationStatus {
            backend: client.backend(),
            enabled: client.is_enabled(),
            detail: client.credential().describe(),
        })
        .collect()
}

fn out_of_sync(backend: Backend, tour: &Tour, photo_id: Option<&str>) -> Error {
    Error::OutOfSync {
        backend,
        tour_id: tour.tour_id.clone(),
        photo_id: photo_id.map(String::from),
    }
}

/// Refuse to delete what cannot be shown to exist remotely.
fn ensure_in_sync(tour: &Tour, photos: &[Photo], backends: &[Backend]) -> Result<()> {
    for &backend in backends {
        if backend.has_tour_record() {
            if tour.remote_tour_id(backend).is_none() {
                return Err(out_of_sync(backend, tour, None));
            }
            continue;
        }
        if let Some(photo) = photos.iter().find(|p| p.remote_id(backend).is_none()) {
            return Err(out_of_sync(backend, tour, Some(&photo.photo_id)));
        }
    }
    Ok(())
}

pub fn tour_fields(tour: &Tour) -> TourFields {
    TourFields {
        tour_id: tour.tour_id.clone(),
        name: tour.name.clone(),
        description: tour.description.clone(),
        tags: tour.tags.clone(),
        transport: tour.transport,
    }
}

/// Record what a backend returned for a freshly uploaded photo.
fn apply_upload(photo: &mut Photo, backend: Backend, remote: &RemotePhoto) {
    match backend {
        Backend::PanoramaHost => {
            photo.panorama = PanoramaRemote {
                photo_id: Some(remote.id.clone()),
                share_link: remote.share_link.clone(),
                download_url: remote.download_url.clone(),
                thumbnail_url: remote.thumbnail_url.clone(),
                capture_time: Some(photo.taken.to_rfc3339()),
                latitude: Some(photo.latitude.to_string()),
                longitude: Some(photo.longitude.to_string()),
                altitude: Some(photo.elevation.to_string()),
                ..Default::default()
            };
        }
        Backend::TrailHost => photo.trail_id = Some(remote.id.clone()),
        Backend::MetadataHost => photo.metadata_id = Some(remote.id.clone()),
    }
}

/// Overwrite a local photo with its pulled version. Remote connection
/// targets are translated back to local ids; unknown targets are dropped.
/// Panorama and trail ids are taken over only for backends the tour is a
/// member of.
fn apply_remote_photo(
    photo: &mut Photo,
    record: &RemotePhotoRecord,
    members: &IntegrationSet,
    to_local: &HashMap<String, String>,
) {
    photo.metadata_id = Some(record.id.clone());
    if let Some(ref filename) = record.filename {
        photo.filename = filename.clone();
    }
    if let Some(taken) = record.taken {
        photo.taken = taken;
    }
    if let Some(ref lat) = record.latitude {
        photo.latitude = lat.clone();
    }
    if let Some(ref lon) = record.longitude {
        photo.longitude = lon.clone();
    }
    if let Some(ref elevation) = record.elevation {
        photo.elevation = elevation.clone();
    }
    if record.location_code.is_some() {
        photo.location_code = record.location_code.clone();
    }
    if record.camera_make.is_some() {
        photo.camera_make = record.camera_make.clone();
    }
    if record.camera_model.is_some() {
        photo.camera_model = record.camera_model.clone();
    }
    if record.heading.is_some() {
        photo.heading = record.heading;
    }
    if record.country.is_some() {
        photo.country = record.country.clone();
    }
    if record.country_code.is_some() {
        photo.country_code = record.country_code.clone();
    }

    photo.connections = record
        .connections
        .iter()
        .filter_map(|c| {
            let target = to_local.get(c.photo_id.as_deref()?)?;
            Some(Connection {
                photo_id: target.clone(),
                distance: c.distance,
                elevation: c.elevation,
                pitch: c.pitch,
                heading: c.heading,
                adjusted_heading: c.adjusted_heading,
            })
        })
        .collect();

    if members.contains(Backend::PanoramaHost) && record.panorama.photo_id.is_some() {
        let publish_status = photo.panorama.publish_status.take();
        photo.panorama = record.panorama.clone();
        photo.panorama.publish_status = publish_status;
    }
    if members.contains(Backend::TrailHost) && record.trail_id.is_some() {
        photo.trail_id = record.trail_id.clone();
    }
}
