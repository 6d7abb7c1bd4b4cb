use crate::catalog::{apply_defaults, backup_catalog, Catalog, CatalogStore, RecordDefaults};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::exif_reader::read_exif;
use crate::gps::{extract_gps_coordinates, image_direction};
use crate::hashing::{hash_file, photo_id};
use crate::metadata::{ExifMap, PhotoRecord};
use crate::orientation::OrientationNormalizer;
use crate::raster::dimensions;
use crate::thumbnail::{ThumbnailEngine, ThumbnailOutcome};
use crate::walker::{extension_of, list_originals, OriginalFile};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A file skipped because its content was already catalogued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub filename: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailIssue {
    pub filename: String,
    pub size: String,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub catalog: Catalog,
    pub duplicates: Vec<Duplicate>,
    pub unsupported: Vec<String>,
    /// Derivatives that could not be produced for an otherwise synced file.
    pub thumbnails_missing: Vec<ThumbnailIssue>,
    /// Derivatives written as a verbatim copy because no codec exists for
    /// the original's type. These may be far larger than their size name.
    pub verbatim_fallbacks: Vec<ThumbnailIssue>,
    pub pruned: Vec<String>,
    /// Files that could not be read; their previous records are kept.
    pub unreadable: Vec<String>,
    pub thumbnails_generated: usize,
}

/// Hashes seen so far, and which on-disk files the catalog already
/// attributes each hash to.
struct SeenHashes {
    this_run: BTreeSet<String>,
    catalogued: BTreeMap<String, BTreeSet<String>>,
}

impl SeenHashes {
    fn new(catalog: &Catalog, on_disk: &BTreeSet<&str>) -> Self {
        let mut catalogued: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in catalog.values().filter(|r| on_disk.contains(r.filename.as_str())) {
            for hash in [&record.hash, &record.original_hash].into_iter().flatten() {
                catalogued.entry(hash.clone()).or_default().insert(record.filename.clone());
            }
        }
        SeenHashes { this_run: BTreeSet::new(), catalogued }
    }

    /// A file collides with anything processed earlier in this run. A file
    /// without a record also collides with another file's record.
    fn collides(&self, hash: &str, filename: &str, has_record: bool) -> bool {
        if self.this_run.contains(hash) {
            return true;
        }
        !has_record
            && self
                .catalogued
                .get(hash)
                .map_or(false, |owners| owners.iter().any(|owner| owner != filename))
    }
}

/// Reconciles the originals directory against a catalog.
pub struct LibrarySyncEngine {
    originals: PathBuf,
    extensions: BTreeSet<String>,
    thumbnails: ThumbnailEngine,
    normalizer: OrientationNormalizer,
    defaults: RecordDefaults,
}

impl LibrarySyncEngine {
    pub fn new(
        originals: impl Into<PathBuf>,
        extensions: BTreeSet<String>,
        thumbnails: ThumbnailEngine,
        normalizer: OrientationNormalizer,
        defaults: RecordDefaults,
    ) -> Self {
        LibrarySyncEngine {
            originals: originals.into(),
            extensions,
            thumbnails,
            normalizer,
            defaults,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let thumbnails = ThumbnailEngine::new(
            &config.thumbnail_directory,
            config.sizes.clone(),
            config.square_sizes.iter().cloned(),
            config.square_dpi,
        );
        LibrarySyncEngine::new(
            &config.originals_directory,
            config.supported_extensions.clone(),
            thumbnails,
            OrientationNormalizer::new(config.orientation_strategy),
            config.record_defaults(),
        )
    }

    pub fn thumbnails(&self) -> &ThumbnailEngine {
        &self.thumbnails
    }

    pub fn sync(&self, mut previous: Catalog) -> Result<SyncReport, AppError> {
        let listing = list_originals(&self.originals, &self.extensions)?;
        let on_disk: BTreeSet<&str> = listing.photos.iter().map(|p| p.filename.as_str()).collect();
        let mut seen = SeenHashes::new(&previous, &on_disk);

        let mut report = SyncReport {
            unsupported: listing.unsupported.clone(),
            ..SyncReport::default()
        };

        for original in &listing.photos {
            let id = photo_id(&original.filename);
            let key = existing_key(&previous, &id, &original.filename);

            let hash = match hash_file(&original.path) {
                Ok(hash) => hash,
                Err(e) => {
                    log::warn!("Could not read {:?}: {}", original.path, e);
                    keep_unchanged(&mut previous, key, &mut report);
                    report.unreadable.push(original.filename.clone());
                    continue;
                }
            };

            if seen.collides(&hash, &original.filename, key.is_some()) {
                log::info!("Skipping duplicate {} ({})", original.filename, hash);
                keep_unchanged(&mut previous, key, &mut report);
                report.duplicates.push(Duplicate { filename: original.filename.clone(), hash });
                continue;
            }
            seen.this_run.insert(hash.clone());

            let exif = read_exif(&original.path);
            let normalized = self.normalizer.normalize(&original.path, &exif);

            let mut original_hash = None;
            let hash = if normalized.changed {
                match hash_file(&original.path) {
                    Ok(after) => {
                        original_hash = Some(hash);
                        after
                    }
                    Err(e) => {
                        log::warn!("Could not re-hash {:?}: {}", original.path, e);
                        hash
                    }
                }
            } else {
                hash
            };
            if original_hash.is_some() && !seen.this_run.insert(hash.clone()) {
                log::info!("Skipping duplicate {} after normalisation ({})", original.filename, hash);
                keep_unchanged(&mut previous, key, &mut report);
                report.duplicates.push(Duplicate { filename: original.filename.clone(), hash });
                continue;
            }
            if normalized.changed {
                self.thumbnails
                    .clear_thumbnails(&id, &original.extension, Some(&original.filename));
            }

            let previous_record = key.and_then(|k| previous.remove(&k));
            let record = self.merge_record(previous_record, original, &id, hash, original_hash, normalized.exif);
            self.materialize_thumbnails(original, &id, &mut report);
            report.catalog.insert(id, record);
        }

        let claimed: BTreeSet<String> = report.catalog.values().map(|r| r.filename.clone()).collect();
        for (id, record) in previous {
            // Records for files still on disk survive unless another record
            // already speaks for that file.
            if on_disk.contains(record.filename.as_str()) && !claimed.contains(&record.filename) {
                report.catalog.insert(id, record);
                continue;
            }
            log::info!("Pruning stale record {} ({})", id, record.filename);
            self.thumbnails
                .clear_thumbnails(&id, &extension_of(&record.filename), Some(&record.filename));
            report.pruned.push(record.filename);
        }

        log::info!(
            "Sync complete: {} records, {} duplicates, {} unsupported, {} pruned, {} thumbnails generated",
            report.catalog.len(),
            report.duplicates.len(),
            report.unsupported.len(),
            report.pruned.len(),
            report.thumbnails_generated
        );
        Ok(report)
    }

    fn merge_record(
        &self,
        previous: Option<PhotoRecord>,
        original: &OriginalFile,
        id: &str,
        hash: String,
        original_hash: Option<String>,
        exif: ExifMap,
    ) -> PhotoRecord {
        let mut record = previous.unwrap_or_else(|| {
            log::info!("New photo {} ({})", original.filename, id);
            PhotoRecord::new(id, &original.filename)
        });
        if record.id != id {
            log::info!("Moving record for {} from id {} to {}", original.filename, record.id, id);
        }
        record.id = id.to_string();
        record.filename = original.filename.clone();

        let (width, height) = dimensions(&original.path);
        record.width = width;
        record.height = height;

        record.original_hash = match original_hash {
            Some(before) => Some(before),
            None if record.hash.as_deref() == Some(hash.as_str()) => record.original_hash.take(),
            None => None,
        };
        record.hash = Some(hash);

        if let Some(gps) = extract_gps_coordinates(&exif) {
            record.gps_latitude = Some(gps.latitude);
            record.gps_longitude = Some(gps.longitude);
        }
        if let Some(direction) = image_direction(&exif) {
            record.gps_img_direction = Some(direction);
            record.gps_img_direction_ref = exif.get("GPSImgDirectionRef").and_then(|r| r.to_text());
        }

        record.exif = exif;
        apply_defaults(&mut record, &self.defaults);
        record
    }

    fn materialize_thumbnails(&self, original: &OriginalFile, id: &str, report: &mut SyncReport) {
        for derivative in self.thumbnails.ensure_thumbnails(&original.path, id, &original.extension) {
            let issue = || ThumbnailIssue {
                filename: original.filename.clone(),
                size: derivative.size.clone(),
                path: derivative.path.clone(),
            };
            match derivative.outcome {
                None => report.thumbnails_missing.push(issue()),
                Some(outcome) => {
                    if outcome == ThumbnailOutcome::CopiedUnsupported {
                        log::warn!("{} thumbnail of {} is a verbatim copy", derivative.size, original.filename);
                        report.verbatim_fallbacks.push(issue());
                    }
                    if outcome.generated() {
                        report.thumbnails_generated += 1;
                    }
                }
            }
        }
    }

    /// Supported originals that have no record in `catalog`.
    pub fn find_untracked_photos(&self, catalog: &Catalog) -> Result<Vec<String>, AppError> {
        let tracked: BTreeSet<&str> = catalog.values().map(|r| r.filename.as_str()).collect();
        Ok(list_originals(&self.originals, &self.extensions)?
            .photos
            .into_iter()
            .map(|p| p.filename)
            .filter(|f| !tracked.contains(f.as_str()))
            .collect())
    }
}

/// Carries a record into the result without touching it.
fn keep_unchanged(previous: &mut Catalog, key: Option<String>, report: &mut SyncReport) {
    if let Some(record) = key.and_then(|k| previous.remove(&k)) {
        report.catalog.insert(record.id.clone(), record);
    }
}

/// The record key for `filename`: its own id, or a legacy id carrying the
/// same filename.
fn existing_key(catalog: &Catalog, id: &str, filename: &str) -> Option<String> {
    if catalog.contains_key(id) {
        return Some(id.to_string());
    }
    catalog
        .iter()
        .find(|(_, record)| record.filename == filename)
        .map(|(key, _)| key.clone())
}

/// Loads the catalog, syncs it and saves the result as one unit.
pub fn run_sync(
    engine: &LibrarySyncEngine,
    store: &mut dyn CatalogStore,
    backup_directory: Option<&Path>,
) -> Result<SyncReport, AppError> {
    let catalog = store.load()?;
    log::info!("Loaded {} records from {:?}", catalog.len(), store.path());

    let report = engine.sync(catalog)?;
    if let Some(directory) = backup_directory {
        backup_catalog(store.path(), directory)?;
    }
    store.save(&report.catalog)?;
    Ok(report)
}
