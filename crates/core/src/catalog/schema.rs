use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

/// Schema version this build reads and writes.
pub const SCHEMA_VERSION: u32 = 2;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tours (
            tour_id          TEXT PRIMARY KEY,
            name             TEXT NOT NULL UNIQUE,
            description      TEXT NOT NULL DEFAULT '',
            tags             TEXT NOT NULL DEFAULT '',
            tour_type        TEXT NOT NULL,
            transport_type   TEXT NOT NULL,
            integrations     TEXT NOT NULL DEFAULT '',
            metadata_tour_id TEXT,
            created          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tours_metadata ON tours(metadata_tour_id);

        CREATE TABLE IF NOT EXISTS photos (
            photo_id       TEXT PRIMARY KEY,
            tour_id        TEXT NOT NULL REFERENCES tours(tour_id) ON DELETE CASCADE,
            filename       TEXT NOT NULL,
            directory      TEXT NOT NULL,
            path           TEXT NOT NULL,
            taken          INTEGER NOT NULL,
            latitude       TEXT NOT NULL,
            longitude      TEXT NOT NULL,
            elevation      TEXT NOT NULL,
            location_code  TEXT,
            camera_make    TEXT,
            camera_model   TEXT,
            heading        REAL,
            connections    TEXT NOT NULL DEFAULT '[]',
            panorama_photo_id       TEXT,
            panorama_share_link     TEXT,
            panorama_download_url   TEXT,
            panorama_thumbnail_url  TEXT,
            panorama_capture_time   TEXT,
            panorama_lat            TEXT,
            panorama_lon            TEXT,
            panorama_altitude       TEXT,
            panorama_heading        REAL,
            panorama_pitch          REAL,
            panorama_roll           REAL,
            panorama_level          TEXT,
            panorama_publish_status TEXT,
            trail_pano_id     TEXT,
            metadata_photo_id TEXT,
            created        INTEGER NOT NULL,
            country        TEXT,
            country_code   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_photos_tour ON photos(tour_id);
        CREATE INDEX IF NOT EXISTS idx_photos_panorama ON photos(panorama_photo_id);
        CREATE INDEX IF NOT EXISTS idx_photos_trail ON photos(trail_pano_id);
        CREATE INDEX IF NOT EXISTS idx_photos_metadata ON photos(metadata_photo_id);

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// The version recorded in the `config` table, if any.
pub fn stored_version(conn: &Connection) -> Result<Option<u32>> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.and_then(|v| v.parse::<u32>().ok()))
}

/// Stamp a fresh database with the current version, bring an older one
/// up to date, or refuse one written by a newer build.
pub fn migrate(conn: &Connection) -> Result<()> {
    match stored_version(conn)? {
        Some(db) if db > SCHEMA_VERSION => {
            return Err(Error::SchemaTooNew {
                db,
                code: SCHEMA_VERSION,
            });
        }
        Some(db) if db == SCHEMA_VERSION => return Ok(()),
        Some(1) => {
            // Version 2 adds the reverse-geocoded country of each photo.
            conn.execute_batch(
                "ALTER TABLE photos ADD COLUMN country TEXT;
                 ALTER TABLE photos ADD COLUMN country_code TEXT;",
            )?;
        }
        Some(_) | None => {}
    }

    conn.execute(
        "INSERT INTO config (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
