use crate::error::AppError;
use crate::fraction::fraction_to_f64;
use crate::hashing::photo_id;
use crate::metadata::{ExifMap, ExifScalar, ExifValue, PhotoRecord};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Every record, keyed by id.
pub type Catalog = BTreeMap<String, PhotoRecord>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CatalogBackend {
    #[default]
    Sqlite,
    Json,
}

/// Values used for fields a record leaves empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDefaults {
    pub author: String,
    pub license: String,
}

impl Default for RecordDefaults {
    fn default() -> Self {
        RecordDefaults {
            author: "Waldo Jaquith".to_string(),
            license: "CC BY-NC-SA 4.0".to_string(),
        }
    }
}

pub fn filename_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

/// `"2023:07:04 18:30:00"` → `"July 4, 2023"`.
pub fn format_exif_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let raw = raw.replace(['.', '\\'], ":");
    let parsed = NaiveDateTime::parse_from_str(&raw, "%Y:%m:%d %H:%M:%S").ok()?;
    Some(parsed.format("%B %-d, %Y").to_string())
}

pub fn date_taken_from_exif(exif: &ExifMap) -> Option<String> {
    format_exif_date(&exif.get("DateTimeOriginal")?.to_text()?)
}

/// Fills title, author, license and date from their fallbacks where empty.
pub fn apply_defaults(record: &mut PhotoRecord, defaults: &RecordDefaults) {
    if record.title.is_empty() {
        record.title = filename_stem(&record.filename);
    }
    if record.date_taken.is_empty() {
        if let Some(date) = date_taken_from_exif(&record.exif) {
            record.date_taken = date;
        }
    }
    if record.author.is_empty() {
        record.author = defaults.author.clone();
    }
    if record.license.is_empty() {
        record.license = defaults.license.clone();
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn dimension_field(map: &Map<String, Value>, key: &str) -> Option<u32> {
    match map.get(key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(|f| u32::try_from(f as i64).ok()),
        _ => None,
    }
}

fn float_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Keeps the EXIF tags that parse; a non-mapping `exif` reads as empty.
fn exif_field(map: &Map<String, Value>) -> ExifMap {
    let Some(Value::Object(tags)) = map.get("exif") else {
        return ExifMap::new();
    };
    tags.iter()
        .filter_map(|(tag, value)| {
            serde_json::from_value::<ExifValue>(value.clone())
                .map_err(|e| log::debug!("Dropping unreadable EXIF tag {}: {}", tag, e))
                .ok()
                .map(|v| (tag.clone(), collapse_single(v)))
        })
        .collect()
}

/// A one-element sequence reads as its element, as it does from SQLite.
fn collapse_single(value: ExifValue) -> ExifValue {
    match value {
        ExifValue::List(mut items) if items.len() == 1 => ExifValue::Scalar(items.remove(0)),
        other => other,
    }
}

fn record_from_json(key: &str, value: &Value, defaults: &RecordDefaults) -> Result<PhotoRecord, AppError> {
    let map = match value {
        Value::Object(map) => map.clone(),
        Value::Array(_) => {
            return Err(AppError::CatalogFormat(format!("record {:?} is a list, not a mapping", key)));
        }
        // A bare string is a title.
        Value::String(title) => {
            let mut map = Map::new();
            map.insert("title".into(), Value::String(title.clone()));
            map
        }
        other => {
            return Err(AppError::CatalogFormat(format!(
                "record {:?} is {}, not a mapping",
                key,
                json_kind(other)
            )));
        }
    };

    let filename = non_empty(text_field(&map, "filename")).unwrap_or_else(|| key.to_string());
    let id = non_empty(text_field(&map, "id")).unwrap_or_else(|| photo_id(&filename));

    let mut record = PhotoRecord::new(id, filename);
    record.title = text_field(&map, "title").unwrap_or_default();
    record.description = text_field(&map, "description").unwrap_or_default();
    record.date_taken = text_field(&map, "date_taken").unwrap_or_default();
    record.author = text_field(&map, "author").unwrap_or_default();
    record.license = text_field(&map, "license").unwrap_or_default();
    record.width = dimension_field(&map, "width");
    record.height = dimension_field(&map, "height");
    record.hash = non_empty(text_field(&map, "hash"));
    record.original_hash = non_empty(text_field(&map, "original_hash"));
    record.exif = exif_field(&map);
    record.gps_latitude = float_field(&map, "gps_latitude");
    record.gps_longitude = float_field(&map, "gps_longitude");
    record.gps_img_direction = float_field(&map, "gps_img_direction");
    record.gps_img_direction_ref = non_empty(text_field(&map, "gps_img_direction_ref"));
    apply_defaults(&mut record, defaults);
    Ok(record)
}

/// Normalises a parsed catalog document and re-keys it by record id.
pub fn normalize_document(document: Value, defaults: &RecordDefaults) -> Result<Catalog, AppError> {
    let entries = match document {
        Value::Null => return Ok(Catalog::new()),
        Value::Object(entries) => entries,
        other => {
            return Err(AppError::CatalogFormat(format!(
                "expected a mapping of records, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut catalog = Catalog::new();
    for (key, value) in &entries {
        let record = record_from_json(key, value, defaults)?;
        catalog.insert(record.id.clone(), record);
    }
    Ok(catalog)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Edits the user-facing fields of one record.
pub fn update_photo_metadata<'a>(
    catalog: &'a mut Catalog,
    id: &str,
    title: &str,
    description: &str,
    date_taken: Option<&str>,
) -> Result<&'a PhotoRecord, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Invalid("title is required".into()));
    }
    let record = catalog
        .get_mut(id)
        .ok_or_else(|| AppError::NotFound(format!("photo {}", id)))?;

    record.title = title.to_string();
    record.description = description.to_string();
    record.date_taken = date_taken.map(str::trim).unwrap_or("").to_string();
    Ok(record)
}

pub trait CatalogStore {
    fn load(&self) -> Result<Catalog, AppError>;

    /// Replaces the stored catalog with `catalog` as one unit.
    fn save(&mut self, catalog: &Catalog) -> Result<(), AppError>;

    fn path(&self) -> &Path;
}

/// Opens the configured store at `path`.
pub fn open_store(
    backend: CatalogBackend,
    path: &Path,
    defaults: RecordDefaults,
) -> Result<Box<dyn CatalogStore>, AppError> {
    Ok(match backend {
        CatalogBackend::Json => Box::new(JsonCatalogStore::new(path, defaults)),
        CatalogBackend::Sqlite => Box::new(SqliteCatalogStore::open(path, defaults)?),
    })
}

/// Copies the catalog file into `directory` as `catalog-{unix time}.{ext}`.
pub fn backup_catalog(path: &Path, directory: &Path) -> Result<Option<PathBuf>, AppError> {
    if !path.is_file() {
        return Ok(None);
    }
    fs::create_dir_all(directory)?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("bak");
    let backup = directory.join(format!("catalog-{}.{}", chrono::Utc::now().timestamp(), extension));
    fs::copy(path, &backup)?;
    log::info!("Backed up catalog to {:?}", backup);
    Ok(Some(backup))
}

/// A pretty-printed JSON object keyed by id.
pub struct JsonCatalogStore {
    path: PathBuf,
    defaults: RecordDefaults,
}

impl JsonCatalogStore {
    pub fn new(path: impl Into<PathBuf>, defaults: RecordDefaults) -> Self {
        JsonCatalogStore { path: path.into(), defaults }
    }
}

impl CatalogStore for JsonCatalogStore {
    fn load(&self) -> Result<Catalog, AppError> {
        if !self.path.is_file() {
            log::debug!("No catalog at {:?}; starting empty", self.path);
            return Ok(Catalog::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Catalog::new());
        }
        let document: Value = serde_json::from_str(&contents).map_err(|e| {
            AppError::CatalogFormat(format!("unable to parse {}: {}", self.path.display(), e))
        })?;
        normalize_document(document, &self.defaults)
    }

    fn save(&mut self, catalog: &Catalog) -> Result<(), AppError> {
        let mut json = serde_json::to_string_pretty(catalog)?;
        json.push('\n');

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "catalog.json".into());
        let temp = self.path.with_file_name(format!(".{}.tmp", file_name));
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        log::info!("Saved {} records to {:?}", catalog.len(), self.path);
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// `photos` plus one `photo_exif` row per tag value.
pub struct SqliteCatalogStore {
    conn: Connection,
    path: PathBuf,
    defaults: RecordDefaults,
}

impl SqliteCatalogStore {
    pub fn open(path: impl Into<PathBuf>, defaults: RecordDefaults) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        log::debug!("Catalog database opened at: {}", path.display());

        let store = SqliteCatalogStore { conn, path, defaults };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), AppError> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS photos (
                id                      TEXT PRIMARY KEY,
                filename                TEXT NOT NULL,
                title                   TEXT DEFAULT '',
                description             TEXT DEFAULT '',
                date_taken              TEXT DEFAULT '',
                width                   INTEGER,
                height                  INTEGER,
                hash                    TEXT,
                original_hash           TEXT,
                author                  TEXT DEFAULT '',
                license                 TEXT DEFAULT '',
                gps_latitude            REAL,
                gps_longitude           REAL,
                gps_img_direction       REAL,
                gps_img_direction_ref   TEXT,
                created_at              INTEGER DEFAULT (strftime('%s', 'now')),
                updated_at              INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE TABLE IF NOT EXISTS photo_exif (
                photo_id    TEXT NOT NULL,
                tag         TEXT NOT NULL,
                value       TEXT,
                value_num   REAL,
                sequence    INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (photo_id, tag, sequence),
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_photos_hash ON photos(hash);
            CREATE INDEX IF NOT EXISTS idx_photos_filename ON photos(filename);",
        )?;
        Ok(())
    }

    fn load_exif(&self) -> Result<BTreeMap<String, ExifMap>, AppError> {
        let mut stmt = self.conn.prepare(
            "SELECT photo_id, tag, value, value_num, sequence
             FROM photo_exif
             ORDER BY photo_id, tag, sequence",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut grouped: BTreeMap<String, BTreeMap<String, Vec<(i64, ExifScalar)>>> = BTreeMap::new();
        for row in rows {
            let (photo_id, tag, value, value_num, sequence) = row?;
            grouped
                .entry(photo_id)
                .or_default()
                .entry(tag)
                .or_default()
                .push((sequence, scalar_from_row(value, value_num)));
        }

        Ok(grouped
            .into_iter()
            .map(|(photo_id, tags)| {
                let exif = tags
                    .into_iter()
                    .map(|(tag, mut values)| {
                        let value = if values.len() == 1 && values[0].0 == 0 {
                            ExifValue::Scalar(values.remove(0).1)
                        } else {
                            ExifValue::List(values.into_iter().map(|(_, v)| v).collect())
                        };
                        (tag, value)
                    })
                    .collect();
                (photo_id, exif)
            })
            .collect())
    }
}

fn scalar_to_row(value: &ExifScalar) -> (String, Option<f64>) {
    match value {
        ExifScalar::Int(n) => (n.to_string(), Some(*n as f64)),
        ExifScalar::Float(f) => (f.to_string(), Some(*f)),
        ExifScalar::Text(s) => (s.clone(), fraction_to_f64(value)),
        ExifScalar::Ratio { .. } => (value.to_string(), fraction_to_f64(value)),
    }
}

fn scalar_from_row(value: Option<String>, value_num: Option<f64>) -> ExifScalar {
    let value = value.unwrap_or_default();
    if let Some(num) = value_num {
        if let Ok(n) = value.parse::<i64>() {
            if n as f64 == num {
                return ExifScalar::Int(n);
            }
        }
        if value.parse::<f64>().ok() == Some(num) {
            return ExifScalar::Float(num);
        }
    }
    ExifScalar::Text(value)
}

fn dimension_from_row(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

impl CatalogStore for SqliteCatalogStore {
    fn load(&self) -> Result<Catalog, AppError> {
        let mut exif_by_photo = self.load_exif()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, filename, title, description, date_taken, width, height, hash, original_hash,
                    author, license, gps_latitude, gps_longitude, gps_img_direction, gps_img_direction_ref
             FROM photos
             ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let mut record = PhotoRecord::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
            record.title = row.get::<_, Option<String>>(2)?.unwrap_or_default();
            record.description = row.get::<_, Option<String>>(3)?.unwrap_or_default();
            record.date_taken = row.get::<_, Option<String>>(4)?.unwrap_or_default();
            record.width = dimension_from_row(row.get(5)?);
            record.height = dimension_from_row(row.get(6)?);
            record.hash = row.get::<_, Option<String>>(7)?.filter(|h| !h.is_empty());
            record.original_hash = row.get::<_, Option<String>>(8)?.filter(|h| !h.is_empty());
            record.author = row.get::<_, Option<String>>(9)?.unwrap_or_default();
            record.license = row.get::<_, Option<String>>(10)?.unwrap_or_default();
            record.gps_latitude = row.get(11)?;
            record.gps_longitude = row.get(12)?;
            record.gps_img_direction = row.get(13)?;
            record.gps_img_direction_ref = row.get::<_, Option<String>>(14)?.filter(|r| !r.is_empty());
            Ok(record)
        })?;

        let mut catalog = Catalog::new();
        for row in rows {
            let mut record = row?;
            if record.id.is_empty() || record.filename.is_empty() {
                return Err(AppError::CatalogFormat(format!(
                    "photos row with empty id or filename ({:?} / {:?})",
                    record.id, record.filename
                )));
            }
            record.exif = exif_by_photo.remove(&record.id).unwrap_or_default();
            apply_defaults(&mut record, &self.defaults);
            catalog.insert(record.id.clone(), record);
        }

        if let Some(orphan) = exif_by_photo.keys().next() {
            return Err(AppError::CatalogFormat(format!("EXIF rows for unknown photo {}", orphan)));
        }
        log::debug!("Loaded {} records from {:?}", catalog.len(), self.path);
        Ok(catalog)
    }

    fn save(&mut self, catalog: &Catalog) -> Result<(), AppError> {
        let tx = self.conn.transaction()?;
        {
            let mut existing: Vec<String> = Vec::new();
            {
                let mut stmt = tx.prepare("SELECT id FROM photos")?;
                for id in stmt.query_map([], |row| row.get::<_, String>(0))? {
                    existing.push(id?);
                }
            }
            let keep: BTreeSet<&str> = catalog.keys().map(String::as_str).collect();
            for id in existing.iter().filter(|id| !keep.contains(id.as_str())) {
                tx.execute("DELETE FROM photos WHERE id = ?1", params![id])?;
                log::debug!("Removed record {} from catalog", id);
            }

            let mut upsert = tx.prepare(
                "INSERT INTO photos (id, filename, title, description, date_taken, width, height, hash, original_hash,
                                     author, license, gps_latitude, gps_longitude, gps_img_direction, gps_img_direction_ref)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(id) DO UPDATE SET
                    filename = excluded.filename,
                    title = excluded.title,
                    description = excluded.description,
                    date_taken = excluded.date_taken,
                    width = excluded.width,
                    height = excluded.height,
                    hash = excluded.hash,
                    original_hash = excluded.original_hash,
                    author = excluded.author,
                    license = excluded.license,
                    gps_latitude = excluded.gps_latitude,
                    gps_longitude = excluded.gps_longitude,
                    gps_img_direction = excluded.gps_img_direction,
                    gps_img_direction_ref = excluded.gps_img_direction_ref,
                    updated_at = strftime('%s', 'now')",
            )?;
            let mut clear_exif = tx.prepare("DELETE FROM photo_exif WHERE photo_id = ?1")?;
            let mut insert_exif = tx.prepare(
                "INSERT INTO photo_exif (photo_id, tag, value, value_num, sequence)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for record in catalog.values() {
                upsert.execute(params![
                    record.id,
                    record.filename,
                    record.title,
                    record.description,
                    record.date_taken,
                    record.width,
                    record.height,
                    record.hash,
                    record.original_hash,
                    record.author,
                    record.license,
                    record.gps_latitude,
                    record.gps_longitude,
                    record.gps_img_direction,
                    record.gps_img_direction_ref,
                ])?;
                clear_exif.execute(params![record.id])?;
                for (tag, value) in &record.exif {
                    let items: Vec<&ExifScalar> = match value {
                        ExifValue::Scalar(s) => vec![s],
                        ExifValue::List(items) => items.iter().collect(),
                    };
                    for (sequence, item) in items.into_iter().enumerate() {
                        let (text, num) = scalar_to_row(item);
                        insert_exif.execute(params![record.id, tag, text, num, sequence as i64])?;
                    }
                }
            }
        }
        tx.commit()?;
        log::info!("Saved {} records to {:?}", catalog.len(), self.path);
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
