pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::*;
use crate::error::{Error, Result};

const TOUR_COLUMNS: &str = "tour_id, name, description, tags, tour_type, transport_type,
     integrations, metadata_tour_id, created";

const PHOTO_COLUMNS: &str = "photo_id, tour_id, filename, directory, path, taken,
     latitude, longitude, elevation, location_code, camera_make, camera_model, heading, connections,
     panorama_photo_id, panorama_share_link, panorama_download_url, panorama_thumbnail_url,
     panorama_capture_time, panorama_lat, panorama_lon, panorama_altitude, panorama_heading,
     panorama_pitch, panorama_roll, panorama_level, panorama_publish_status,
     trail_pano_id, metadata_photo_id, created, country, country_code";

/// SQLite-backed store for tours and their photos.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create a catalog at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory catalog (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    // ── Tours ────────────────────────────────────────────────────────

    pub fn insert_tour(&self, tour: &Tour) -> Result<()> {
        if self.find_tour_by_name(&tour.name)?.is_some() {
            return Err(Error::TourNameTaken(tour.name.clone()));
        }
        self.conn.execute(
            &format!("INSERT INTO tours ({TOUR_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)"),
            params![
                tour.tour_id,
                tour.name,
                tour.description,
                tour.tags.join(","),
                tour.transport.tour_type().as_str(),
                tour.transport.mode().as_str(),
                tour.integrations.encode(),
                tour.metadata_tour_id,
                tour.created,
            ],
        )?;
        Ok(())
    }

    /// Write every mutable tour field back to the store.
    pub fn update_tour(&self, tour: &Tour) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE tours SET name=?1, description=?2, tags=?3, tour_type=?4, transport_type=?5,
             integrations=?6, metadata_tour_id=?7
             WHERE tour_id=?8",
            params![
                tour.name,
                tour.description,
                tour.tags.join(","),
                tour.transport.tour_type().as_str(),
                tour.transport.mode().as_str(),
                tour.integrations.encode(),
                tour.metadata_tour_id,
                tour.tour_id,
            ],
        )?;
        if updated == 0 {
            return Err(Error::TourNotFound(tour.tour_id.clone()));
        }
        Ok(())
    }

    pub fn get_tour(&self, tour_id: &str) -> Result<Tour> {
        self.conn
            .query_row(
                &format!("SELECT {TOUR_COLUMNS} FROM tours WHERE tour_id = ?1"),
                params![tour_id],
                row_to_tour,
            )
            .optional()?
            .ok_or_else(|| Error::TourNotFound(tour_id.to_string()))
    }

    pub fn find_tour_by_name(&self, name: &str) -> Result<Option<Tour>> {
        let tour = self
            .conn
            .query_row(
                &format!("SELECT {TOUR_COLUMNS} FROM tours WHERE name = ?1"),
                params![name],
                row_to_tour,
            )
            .optional()?;
        Ok(tour)
    }

    pub fn find_tour_by_metadata_id(&self, metadata_tour_id: &str) -> Result<Option<Tour>> {
        let tour = self
            .conn
            .query_row(
                &format!("SELECT {TOUR_COLUMNS} FROM tours WHERE metadata_tour_id = ?1"),
                params![metadata_tour_id],
                row_to_tour,
            )
            .optional()?;
        Ok(tour)
    }

    /// All tours, oldest first.
    pub fn list_tours(&self) -> Result<Vec<Tour>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TOUR_COLUMNS} FROM tours ORDER BY created, rowid"
        ))?;
        let tours = stmt
            .query_map([], row_to_tour)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tours)
    }

    /// Remove a tour and, through the cascade, all its photos.
    /// Returns the number of photos removed.
    pub fn delete_tour(&self, tour_id: &str) -> Result<usize> {
        let photo_count = self.count_photos(tour_id)?;
        let deleted = self
            .conn
            .execute("DELETE FROM tours WHERE tour_id = ?1", params![tour_id])?;
        if deleted == 0 {
            return Err(Error::TourNotFound(tour_id.to_string()));
        }
        Ok(photo_count)
    }

    // ── Photos ───────────────────────────────────────────────────────

    pub fn upsert_photo(&self, photo: &Photo) -> Result<()> {
        upsert_photo_with(&self.conn, photo)
    }

    /// Upsert multiple photos in a single transaction.
    pub fn upsert_photos_batch(&mut self, photos: &[Photo]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for photo in photos {
            upsert_photo_with(&tx, photo)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Persist a recomputed connection graph (headings and connections only).
    pub fn save_connections(&mut self, photos: &[Photo]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for photo in photos {
            tx.execute(
                "UPDATE photos SET heading = ?1, connections = ?2 WHERE photo_id = ?3",
                params![
                    photo.heading,
                    serde_json::to_string(&photo.connections)?,
                    photo.photo_id,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_photo(&self, photo_id: &str) -> Result<Photo> {
        self.conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE photo_id = ?1"),
                params![photo_id],
                row_to_photo,
            )
            .optional()?
            .ok_or_else(|| Error::PhotoNotFound(photo_id.to_string()))
    }

    /// Photos of a tour in import order.
    pub fn list_photos(&self, tour_id: &str) -> Result<Vec<Photo>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE tour_id = ?1 ORDER BY rowid"
        ))?;
        let photos = stmt
            .query_map(params![tour_id], row_to_photo)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    pub fn list_all_photos(&self) -> Result<Vec<Photo>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PHOTO_COLUMNS} FROM photos ORDER BY rowid"))?;
        let photos = stmt
            .query_map([], row_to_photo)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    /// Look up a photo by the id it carries on `backend`.
    pub fn find_photo_by_remote(&self, backend: Backend, remote_id: &str) -> Result<Option<Photo>> {
        let column = match backend {
            Backend::PanoramaHost => "panorama_photo_id",
            Backend::TrailHost => "trail_pano_id",
            Backend::MetadataHost => "metadata_photo_id",
        };
        let photo = self
            .conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE {column} = ?1"),
                params![remote_id],
                row_to_photo,
            )
            .optional()?;
        Ok(photo)
    }

    pub fn count_photos(&self, tour_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE tour_id = ?1",
            params![tour_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Remove a single photo. Returns true if a row was deleted.
    pub fn delete_photo(&self, photo_id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM photos WHERE photo_id = ?1", params![photo_id])?;
        Ok(deleted > 0)
    }
}

fn upsert_photo_with(conn: &Connection, photo: &Photo) -> Result<()> {
    let p = &photo.panorama;
    conn.execute(
        &format!(
            "INSERT INTO photos ({PHOTO_COLUMNS}) VALUES
             (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,
              ?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32)
             ON CONFLICT(photo_id) DO UPDATE SET
                tour_id=excluded.tour_id, filename=excluded.filename, directory=excluded.directory,
                path=excluded.path, taken=excluded.taken, latitude=excluded.latitude,
                longitude=excluded.longitude, elevation=excluded.elevation,
                location_code=excluded.location_code, camera_make=excluded.camera_make,
                camera_model=excluded.camera_model, heading=excluded.heading,
                connections=excluded.connections,
                panorama_photo_id=excluded.panorama_photo_id,
                panorama_share_link=excluded.panorama_share_link,
                panorama_download_url=excluded.panorama_download_url,
                panorama_thumbnail_url=excluded.panorama_thumbnail_url,
                panorama_capture_time=excluded.panorama_capture_time,
                panorama_lat=excluded.panorama_lat, panorama_lon=excluded.panorama_lon,
                panorama_altitude=excluded.panorama_altitude,
                panorama_heading=excluded.panorama_heading, panorama_pitch=excluded.panorama_pitch,
                panorama_roll=excluded.panorama_roll, panorama_level=excluded.panorama_level,
                panorama_publish_status=excluded.panorama_publish_status,
                trail_pano_id=excluded.trail_pano_id, metadata_photo_id=excluded.metadata_photo_id,
                country=excluded.country, country_code=excluded.country_code"
        ),
        params![
            photo.photo_id,
            photo.tour_id,
            photo.filename,
            photo.directory.to_string_lossy(),
            photo.path.to_string_lossy(),
            photo.taken.timestamp(),
            photo.latitude.as_str(),
            photo.longitude.as_str(),
            photo.elevation.as_str(),
            photo.location_code,
            photo.camera_make,
            photo.camera_model,
            photo.heading,
            serde_json::to_string(&photo.connections)?,
            p.photo_id,
            p.share_link,
            p.download_url,
            p.thumbnail_url,
            p.capture_time,
            p.latitude,
            p.longitude,
            p.altitude,
            p.heading,
            p.pitch,
            p.roll,
            p.level,
            p.publish_status,
            photo.trail_id,
            photo.metadata_id,
            photo.created,
            photo.country,
            photo.country_code,
        ],
    )?;
    Ok(())
}

fn conversion_error(index: usize, err: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, err.to_string().into())
}

fn timestamp(index: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Integer,
            format!("timestamp out of range: {secs}").into(),
        )
    })
}

fn row_to_tour(row: &Row<'_>) -> rusqlite::Result<Tour> {
    let tags: String = row.get(3)?;
    let tour_type: String = row.get(4)?;
    let transport_type: String = row.get(5)?;
    let integrations: String = row.get(6)?;

    let transport = tour_type
        .parse::<TourType>()
        .and_then(|t| Transport::new(t, transport_type.parse()?))
        .map_err(|e| conversion_error(4, e))?;

    Ok(Tour {
        tour_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        tags: split_tags(&tags),
        transport,
        integrations: IntegrationSet::decode(&integrations).map_err(|e| conversion_error(6, e))?,
        metadata_tour_id: row.get(7)?,
        created: row.get(8)?,
    })
}

fn row_to_photo(row: &Row<'_>) -> rusqlite::Result<Photo> {
    let decimal = |index: usize| -> rusqlite::Result<GeoDecimal> {
        let text: String = row.get(index)?;
        GeoDecimal::parse(&text).map_err(|e| conversion_error(index, e))
    };
    let taken: i64 = row.get(5)?;
    let connections: String = row.get(13)?;

    Ok(Photo {
        photo_id: row.get(0)?,
        tour_id: row.get(1)?,
        filename: row.get(2)?,
        directory: PathBuf::from(row.get::<_, String>(3)?),
        path: PathBuf::from(row.get::<_, String>(4)?),
        taken: timestamp(5, taken)?,
        latitude: decimal(6)?,
        longitude: decimal(7)?,
        elevation: decimal(8)?,
        location_code: row.get(9)?,
        camera_make: row.get(10)?,
        camera_model: row.get(11)?,
        heading: row.get(12)?,
        connections: serde_json::from_str(&connections)
            .map_err(|e| conversion_error(13, e))?,
        panorama: PanoramaRemote {
            photo_id: row.get(14)?,
            share_link: row.get(15)?,
            download_url: row.get(16)?,
            thumbnail_url: row.get(17)?,
            capture_time: row.get(18)?,
            latitude: row.get(19)?,
            longitude: row.get(20)?,
            altitude: row.get(21)?,
            heading: row.get(22)?,
            pitch: row.get(23)?,
            roll: row.get(24)?,
            level: row.get(25)?,
            publish_status: row.get(26)?,
        },
        trail_id: row.get(27)?,
        metadata_id: row.get(28)?,
        created: row.get(29)?,
        country: row.get(30)?,
        country_code: row.get(31)?,
    })
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_tour(id: &str, name: &str) -> Tour {
        Tour {
            tour_id: id.to_string(),
            name: name.to_string(),
            description: "Coastal walk".to_string(),
            tags: vec!["coast".to_string(), "hike".to_string()],
            transport: Transport::new(TourType::Land, TransportType::Hike).unwrap(),
            integrations: IntegrationSet::new(),
            metadata_tour_id: None,
            created: 1_700_000_000,
        }
    }

    fn make_photo(id: &str, tour_id: &str, lat: &str) -> Photo {
        Photo {
            photo_id: id.to_string(),
            tour_id: tour_id.to_string(),
            filename: format!("{id}.jpg"),
            directory: PathBuf::from("/photos"),
            path: PathBuf::from(format!("/photos/{id}.jpg")),
            taken: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            latitude: GeoDecimal::parse(lat).unwrap(),
            longitude: GeoDecimal::parse("-3.18827000").unwrap(),
            elevation: GeoDecimal::parse("12.5").unwrap(),
            location_code: Some("9C7RXR26+HR".to_string()),
            camera_make: Some("GoPro".to_string()),
            camera_model: Some("MAX".to_string()),
            heading: None,
            connections: Vec::new(),
            panorama: PanoramaRemote::default(),
            trail_id: None,
            metadata_id: None,
            created: 1_700_000_000,
            country: Some("United Kingdom".to_string()),
            country_code: Some("GB".to_string()),
        }
    }

    fn catalog_with_tour() -> Catalog {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.insert_tour(&make_tour("t1", "Arthur's Seat")).unwrap();
        catalog
    }

    // ── Tour tests ───────────────────────────────────────────────

    #[test]
    fn test_insert_and_get_tour() {
        let catalog = catalog_with_tour();
        let tour = catalog.get_tour("t1").unwrap();
        assert_eq!(tour, make_tour("t1", "Arthur's Seat"));
    }

    #[test]
    fn test_duplicate_tour_name_rejected() {
        let catalog = catalog_with_tour();
        let err = catalog.insert_tour(&make_tour("t2", "Arthur's Seat")).unwrap_err();
        assert!(matches!(err, Error::TourNameTaken(_)));
    }

    #[test]
    fn test_get_tour_not_found() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(matches!(catalog.get_tour("nope"), Err(Error::TourNotFound(_))));
    }

    #[test]
    fn test_update_tour_persists_membership_and_remote_id() {
        let catalog = catalog_with_tour();
        let mut tour = catalog.get_tour("t1").unwrap();
        tour.integrations.insert(Backend::MetadataHost);
        tour.integrations.insert(Backend::TrailHost);
        tour.metadata_tour_id = Some("4411".to_string());
        tour.transport = Transport::new(TourType::Water, TransportType::Kayak).unwrap();
        catalog.update_tour(&tour).unwrap();

        let reloaded = catalog.get_tour("t1").unwrap();
        assert_eq!(reloaded.integrations.encode(), "trail-host,metadata-host");
        assert_eq!(reloaded.metadata_tour_id.as_deref(), Some("4411"));
        assert_eq!(reloaded.transport.mode(), TransportType::Kayak);

        let found = catalog.find_tour_by_metadata_id("4411").unwrap().unwrap();
        assert_eq!(found.tour_id, "t1");
    }

    #[test]
    fn test_update_missing_tour_fails() {
        let catalog = Catalog::open_in_memory().unwrap();
        let err = catalog.update_tour(&make_tour("ghost", "Ghost")).unwrap_err();
        assert!(matches!(err, Error::TourNotFound(_)));
    }

    #[test]
    fn test_list_tours_in_creation_order() {
        let catalog = Catalog::open_in_memory().unwrap();
        let mut late = make_tour("b", "Later");
        late.created = 2_000_000_000;
        catalog.insert_tour(&late).unwrap();
        catalog.insert_tour(&make_tour("a", "Earlier")).unwrap();

        let ids: Vec<String> = catalog.list_tours().unwrap().into_iter().map(|t| t.tour_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_delete_tour_cascades_photos() {
        let catalog = catalog_with_tour();
        catalog.upsert_photo(&make_photo("p1", "t1", "55.9")).unwrap();
        catalog.upsert_photo(&make_photo("p2", "t1", "55.8")).unwrap();

        let removed = catalog.delete_tour("t1").unwrap();
        assert_eq!(removed, 2);
        assert!(catalog.list_all_photos().unwrap().is_empty());
        assert!(matches!(catalog.get_tour("t1"), Err(Error::TourNotFound(_))));
    }

    // ── Photo tests ──────────────────────────────────────────────

    #[test]
    fn test_photo_roundtrip_preserves_decimal_text() {
        let catalog = catalog_with_tour();
        let photo = make_photo("p1", "t1", "55.94410000");
        catalog.upsert_photo(&photo).unwrap();

        let loaded = catalog.get_photo("p1").unwrap();
        assert_eq!(loaded.latitude.as_str(), "55.94410000");
        assert_eq!(loaded.longitude.as_str(), "-3.18827000");
        assert_eq!(loaded, photo);
    }

    #[test]
    fn test_upsert_photo_updates_remote_fields() {
        let catalog = catalog_with_tour();
        let mut photo = make_photo("p1", "t1", "55.9");
        catalog.upsert_photo(&photo).unwrap();

        photo.panorama.photo_id = Some("CAoSLEFG".to_string());
        photo.panorama.share_link = Some("https://goo.gl/maps/x".to_string());
        photo.trail_id = Some("981".to_string());
        photo.connections = vec![Connection {
            photo_id: "p2".to_string(),
            distance: 4.2,
            elevation: 1.0,
            pitch: 0.238,
            heading: 271.5,
            adjusted_heading: Some(-10.0),
        }];
        catalog.upsert_photo(&photo).unwrap();

        assert_eq!(catalog.count_photos("t1").unwrap(), 1);
        let loaded = catalog.get_photo("p1").unwrap();
        assert_eq!(loaded, photo);
    }

    #[test]
    fn test_find_photo_by_remote_id() {
        let catalog = catalog_with_tour();
        let mut photo = make_photo("p1", "t1", "55.9");
        photo.metadata_id = Some("77".to_string());
        photo.panorama.photo_id = Some("pano-1".to_string());
        catalog.upsert_photo(&photo).unwrap();

        let by_meta = catalog.find_photo_by_remote(Backend::MetadataHost, "77").unwrap();
        assert_eq!(by_meta.unwrap().photo_id, "p1");
        let by_pano = catalog.find_photo_by_remote(Backend::PanoramaHost, "pano-1").unwrap();
        assert!(by_pano.is_some());
        assert!(catalog.find_photo_by_remote(Backend::TrailHost, "77").unwrap().is_none());
    }

    #[test]
    fn test_list_photos_in_import_order() {
        let catalog = catalog_with_tour();
        for id in ["z", "a", "m"] {
            catalog.upsert_photo(&make_photo(id, "t1", "55.9")).unwrap();
        }
        let ids: Vec<String> = catalog.list_photos("t1").unwrap().into_iter().map(|p| p.photo_id).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_save_connections_only_touches_graph() {
        let mut catalog = catalog_with_tour();
        let mut photo = make_photo("p1", "t1", "55.9");
        photo.trail_id = Some("5".to_string());
        catalog.upsert_photo(&photo).unwrap();

        let mut changed = photo.clone();
        changed.heading = Some(45.0);
        changed.trail_id = None;
        catalog.save_connections(&[changed]).unwrap();

        let loaded = catalog.get_photo("p1").unwrap();
        assert_eq!(loaded.heading, Some(45.0));
        assert_eq!(loaded.trail_id.as_deref(), Some("5"));
    }

    #[test]
    fn test_delete_photo() {
        let catalog = catalog_with_tour();
        catalog.upsert_photo(&make_photo("p1", "t1", "55.9")).unwrap();
        assert!(catalog.delete_photo("p1").unwrap());
        assert!(!catalog.delete_photo("p1").unwrap());
        assert!(matches!(catalog.get_photo("p1"), Err(Error::PhotoNotFound(_))));
    }

    #[test]
    fn test_foreign_key_photo_requires_tour() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(catalog.upsert_photo(&make_photo("p1", "missing", "55.9")).is_err());
    }

    #[test]
    fn test_corrupt_timestamp_is_an_error() {
        let catalog = catalog_with_tour();
        catalog.upsert_photo(&make_photo("p1", "t1", "55.9")).unwrap();
        catalog
            .conn
            .execute("UPDATE photos SET taken = ?1 WHERE photo_id = 'p1'", params![i64::MAX])
            .unwrap();

        assert!(matches!(catalog.get_photo("p1"), Err(Error::Database(_))));
    }

    // ── Schema version tracking ─────────────────────────────────

    #[test]
    fn test_schema_version_set_on_fresh_db() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert_eq!(
            schema::stored_version(&catalog.conn).unwrap(),
            Some(schema::SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_version_one_catalog_gains_country_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("catalog.db");
        {
            let catalog = Catalog::open(&db_path).unwrap();
            catalog
                .conn
                .execute_batch(
                    "ALTER TABLE photos DROP COLUMN country;
                     ALTER TABLE photos DROP COLUMN country_code;
                     UPDATE config SET value = '1' WHERE key = 'schema_version';",
                )
                .unwrap();
        }

        let catalog = Catalog::open(&db_path).unwrap();
        catalog.insert_tour(&make_tour("t1", "Arthur's Seat")).unwrap();
        catalog.upsert_photo(&make_photo("p1", "t1", "55.9")).unwrap();
        assert_eq!(catalog.get_photo("p1").unwrap().country_code.as_deref(), Some("GB"));
        assert_eq!(schema::stored_version(&catalog.conn).unwrap(), Some(2));
    }

    #[test]
    fn test_unreadable_config_table_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE config (key TEXT PRIMARY KEY)").unwrap();
        assert!(matches!(schema::stored_version(&conn), Err(Error::Database(_))));
    }

    #[test]
    fn test_reject_future_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('schema_version', '999')",
            [],
        )
        .unwrap();

        let err = schema::migrate(&conn).unwrap_err();
        assert!(matches!(err, Error::SchemaTooNew { db: 999, code: 2 }));
    }

    #[test]
    fn test_data_survives_close_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested/catalog.db");
        {
            let catalog = Catalog::open(&db_path).unwrap();
            catalog.insert_tour(&make_tour("t1", "Arthur's Seat")).unwrap();
            catalog.upsert_photo(&make_photo("p1", "t1", "55.9")).unwrap();
        }
        let catalog = Catalog::open(&db_path).unwrap();
        assert_eq!(catalog.list_tours().unwrap().len(), 1);
        assert_eq!(catalog.count_photos("t1").unwrap(), 1);
    }

    // ── Schema structure pinning ────────────────────────────────

    #[test]
    fn test_catalog_tables_exist() {
        let catalog = Catalog::open_in_memory().unwrap();
        let mut stmt = catalog
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(tables, vec!["config", "photos", "tours"]);
    }
}
