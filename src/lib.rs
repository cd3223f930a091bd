//! species_harvester - Build per-species image datasets from iNaturalist
//!
//! This library resolves species names to taxa, lists photos of their
//! observations, downloads them and files them into one folder per species.

mod config;
mod dataset_writer;
mod image_download;
mod species_api;
mod temp;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

// Re-export error types
pub use dataset_writer::DatasetWriteError;
pub use image_download::DownloadError;
pub use species_api::SpeciesApiError;

// Re-export configuration and component types
pub use config::{ClientConfig, DEFAULT_IMAGE_COUNT, DEFAULT_OUTPUT_ROOT, HarvestConfig};
pub use dataset_writer::{DatasetWriter, image_file_name, species_folder_name};
pub use image_download::{DownloadedImage, ImageDownloader, ImageFetcher, infer_extension};
pub use species_api::{
    INaturalistClient, ListingOptions, ObservationOrder, PhotoListing, PhotoLister, PhotoRecord,
    PhotoSize, QualityGrade, Taxon, TaxonCandidate, TaxonResolver, best_match,
};

/// A species the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesRequest {
    /// Common or scientific name as typed by the user
    pub name: String,
    /// Number of images wanted
    pub count: usize,
}

impl SpeciesRequest {
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }

    /// Parses a comma-separated species list, each asking for `count` images.
    ///
    /// Entries are trimmed; empty entries are dropped.
    pub fn parse_list(list: &str, count: usize) -> Vec<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Self::new(name, count))
            .collect()
    }
}

/// Terminal state of a species
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeciesStatus {
    /// Requested count reached, or every available photo was saved
    Completed,
    /// Fewer images than requested because some downloads failed
    Partial,
    /// The name did not resolve to a taxon
    NotFound,
    /// The API failed while resolving or listing
    Failed(String),
}

/// What happened to one species
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesOutcome {
    /// Every user input that resolved to this species
    pub inputs: Vec<String>,
    /// The resolved taxon, if resolution succeeded
    pub taxon: Option<Taxon>,
    /// Folder the images were written to, if any was written
    pub folder: Option<PathBuf>,
    pub requested: usize,
    /// Photos returned by the listing
    pub listed: usize,
    /// Images written to disk
    pub achieved: usize,
    pub failed_downloads: usize,
    pub bytes_written: u64,
    pub status: SpeciesStatus,
}

impl SpeciesOutcome {
    fn unresolved(request: &SpeciesRequest, status: SpeciesStatus) -> Self {
        Self {
            inputs: vec![request.name.clone()],
            taxon: None,
            folder: None,
            requested: request.count,
            listed: 0,
            achieved: 0,
            failed_downloads: 0,
            bytes_written: 0,
            status,
        }
    }

    /// Requested images that were not written
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.achieved)
    }

    /// True when the species could not be processed at all
    pub fn is_failure(&self) -> bool {
        matches!(
            self.status,
            SpeciesStatus::NotFound | SpeciesStatus::Failed(_)
        )
    }
}

/// Result of a harvest run, one outcome per species in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub outcomes: Vec<SpeciesOutcome>,
}

impl HarvestReport {
    /// True when there was at least one species and none could be processed
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(SpeciesOutcome::is_failure)
    }

    /// Images written across all species
    pub fn total_images(&self) -> usize {
        self.outcomes.iter().map(|o| o.achieved).sum()
    }
}

/// Progress event emitted during a harvest
///
/// These events allow library users to track progress and provide feedback
/// while the run is going on.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Harvest started
    Started { root: PathBuf, species_count: usize },

    /// Looking up a species name
    ResolvingSpecies { name: String },

    /// A name resolved to a new taxon
    SpeciesResolved { name: String, taxon: Taxon },

    /// A name resolved to a taxon another name already resolved to
    SpeciesMerged {
        name: String,
        scientific_name: String,
    },

    /// A name did not resolve to anything
    SpeciesNotFound { name: String },

    /// Looking up a name failed, or its taxon collides with another folder
    ResolutionFailed { name: String, reason: String },

    /// Listing photos for a species
    ListingPhotos {
        index: usize,
        total: usize,
        scientific_name: String,
        requested: usize,
    },

    /// Photo listing finished
    PhotosListed {
        scientific_name: String,
        listed: usize,
        requested: usize,
    },

    /// Photo listing failed
    ListingFailed {
        scientific_name: String,
        reason: String,
    },

    /// Downloading a single photo
    DownloadingImage {
        position: usize,
        total: usize,
        url: String,
    },

    /// A photo was written to disk
    ImageSaved { path: PathBuf, bytes: u64 },

    /// A photo could not be downloaded and was skipped
    DownloadFailed { url: String, reason: String },

    /// A species reached its terminal state
    SpeciesFinished { outcome: SpeciesOutcome },

    /// Harvest complete
    Complete {
        species_count: usize,
        image_count: usize,
    },
}

/// Top-level error type for species_harvester operations
///
/// Only failures that make continuing pointless end up here; everything
/// species- or image-specific is folded into the `HarvestReport`.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// Writing to the dataset failed
    #[error("Dataset write error: {0}")]
    Write(#[from] DatasetWriteError),
}

/// A resolved species waiting to be downloaded
struct SpeciesJob {
    taxon: Taxon,
    inputs: Vec<String>,
    target: usize,
}

/// Species in request order, resolved or already finished
enum PlannedSpecies {
    Job(SpeciesJob),
    Finished(SpeciesOutcome),
}

/// Harvests images for the given species using the live iNaturalist API
///
/// Builds one HTTP client for the run, shares it between the API client and
/// the image downloader, and releases it when the run ends.
///
/// # Examples
///
/// ```no_run
/// use species_harvester::{harvest, HarvestConfig, SpeciesRequest};
///
/// let requests = SpeciesRequest::parse_list("Panthera leo, Giant Panda", 5);
/// let report = harvest(&requests, &HarvestConfig::default(), |_| {}).unwrap();
/// println!("Saved {} image(s)", report.total_images());
/// ```
pub fn harvest<P>(
    requests: &[SpeciesRequest],
    config: &HarvestConfig,
    progress_callback: P,
) -> Result<HarvestReport, HarvestError>
where
    P: FnMut(ProgressEvent),
{
    let http = config.client.build_http_client()?;
    let api = INaturalistClient::new(http.clone(), &config.client, config.listing.clone());
    let downloader = ImageDownloader::new(http);
    let writer = DatasetWriter::new(&config.output_root);

    harvest_species(requests, &api, &api, &downloader, &writer, progress_callback)
}

/// Runs the harvest pipeline over the given species
///
/// All names are resolved first; names that resolve to the same scientific
/// name are merged into a single species targeting the largest requested
/// count. Each species is then listed, downloaded and written in turn.
/// Image indices only advance when an image was written, so every species
/// folder holds a gap-free `image_1..image_n` sequence.
///
/// Not-found names, API failures and failed downloads are recorded in the
/// report and never stop the run.
///
/// # Errors
///
/// Returns `HarvestError::Write` as soon as anything cannot be written to
/// the dataset.
pub fn harvest_species<R, L, F, P>(
    requests: &[SpeciesRequest],
    resolver: &R,
    lister: &L,
    fetcher: &F,
    writer: &DatasetWriter,
    mut progress_callback: P,
) -> Result<HarvestReport, HarvestError>
where
    R: TaxonResolver + ?Sized,
    L: PhotoLister + ?Sized,
    F: ImageFetcher + ?Sized,
    P: FnMut(ProgressEvent),
{
    progress_callback(ProgressEvent::Started {
        root: writer.root().to_path_buf(),
        species_count: requests.len(),
    });

    let planned = resolve_requests(requests, resolver, &mut progress_callback);
    let job_count = planned
        .iter()
        .filter(|p| matches!(p, PlannedSpecies::Job(_)))
        .count();

    let mut report = HarvestReport::default();
    let mut job_index = 0;

    for species in planned {
        let outcome = match species {
            PlannedSpecies::Finished(outcome) => outcome,
            PlannedSpecies::Job(job) => {
                let outcome = process_species(
                    job,
                    job_index,
                    job_count,
                    lister,
                    fetcher,
                    writer,
                    &mut progress_callback,
                )?;
                job_index += 1;
                outcome
            }
        };

        info!(
            species = ?outcome.taxon.as_ref().map(|t| &t.scientific_name),
            requested = outcome.requested,
            achieved = outcome.achieved,
            status = ?outcome.status,
            "Species finished"
        );
        progress_callback(ProgressEvent::SpeciesFinished {
            outcome: outcome.clone(),
        });
        report.outcomes.push(outcome);
    }

    progress_callback(ProgressEvent::Complete {
        species_count: report.outcomes.len(),
        image_count: report.total_images(),
    });

    Ok(report)
}

/// Resolves every request, merging names that land on the same taxon
fn resolve_requests<R, P>(
    requests: &[SpeciesRequest],
    resolver: &R,
    progress_callback: &mut P,
) -> Vec<PlannedSpecies>
where
    R: TaxonResolver + ?Sized,
    P: FnMut(ProgressEvent),
{
    let mut planned: Vec<PlannedSpecies> = Vec::new();

    for request in requests {
        progress_callback(ProgressEvent::ResolvingSpecies {
            name: request.name.clone(),
        });

        let taxon = match resolver.resolve(&request.name) {
            Ok(taxon) => taxon,
            Err(SpeciesApiError::NotFound(_)) => {
                progress_callback(ProgressEvent::SpeciesNotFound {
                    name: request.name.clone(),
                });
                planned.push(PlannedSpecies::Finished(SpeciesOutcome::unresolved(
                    request,
                    SpeciesStatus::NotFound,
                )));
                continue;
            }
            Err(e) => {
                warn!(name = %request.name, error = %e, "Species resolution failed");
                progress_callback(ProgressEvent::ResolutionFailed {
                    name: request.name.clone(),
                    reason: e.to_string(),
                });
                planned.push(PlannedSpecies::Finished(SpeciesOutcome::unresolved(
                    request,
                    SpeciesStatus::Failed(e.to_string()),
                )));
                continue;
            }
        };

        let existing = planned.iter_mut().find_map(|p| match p {
            PlannedSpecies::Job(job) => (job.taxon.id == taxon.id).then_some(job),
            PlannedSpecies::Finished(_) => None,
        });
        if let Some(job) = existing {
            job.inputs.push(request.name.clone());
            job.target = job.target.max(request.count);
            progress_callback(ProgressEvent::SpeciesMerged {
                name: request.name.clone(),
                scientific_name: job.taxon.scientific_name.clone(),
            });
            continue;
        }

        // Distinct taxa whose names sanitize to the same folder
        let folder = species_folder_name(&taxon.scientific_name);
        let occupant = planned.iter().find_map(|p| match p {
            PlannedSpecies::Job(job) => {
                (species_folder_name(&job.taxon.scientific_name) == folder).then_some(job.taxon.id)
            }
            PlannedSpecies::Finished(_) => None,
        });
        if let Some(occupant_id) = occupant {
            let reason = format!(
                "folder '{}' is already used by taxon {}, skipping taxon {}",
                folder, occupant_id, taxon.id
            );
            warn!(name = %request.name, taxon_id = taxon.id, occupant_id, "Species folder collision");
            progress_callback(ProgressEvent::ResolutionFailed {
                name: request.name.clone(),
                reason: reason.clone(),
            });
            let mut outcome = SpeciesOutcome::unresolved(request, SpeciesStatus::Failed(reason));
            outcome.taxon = Some(taxon);
            planned.push(PlannedSpecies::Finished(outcome));
            continue;
        }

        progress_callback(ProgressEvent::SpeciesResolved {
            name: request.name.clone(),
            taxon: taxon.clone(),
        });
        planned.push(PlannedSpecies::Job(SpeciesJob {
            taxon,
            inputs: vec![request.name.clone()],
            target: request.count,
        }));
    }

    planned
}

/// Lists, downloads and writes the images of one resolved species
fn process_species<L, F, P>(
    job: SpeciesJob,
    index: usize,
    total: usize,
    lister: &L,
    fetcher: &F,
    writer: &DatasetWriter,
    progress_callback: &mut P,
) -> Result<SpeciesOutcome, HarvestError>
where
    L: PhotoLister + ?Sized,
    F: ImageFetcher + ?Sized,
    P: FnMut(ProgressEvent),
{
    let SpeciesJob {
        taxon,
        inputs,
        target,
    } = job;
    let scientific_name = taxon.scientific_name.clone();

    let mut outcome = SpeciesOutcome {
        inputs,
        taxon: Some(taxon.clone()),
        folder: None,
        requested: target,
        listed: 0,
        achieved: 0,
        failed_downloads: 0,
        bytes_written: 0,
        status: SpeciesStatus::Completed,
    };

    if let Err(e) = writer.species_dir(&scientific_name) {
        outcome.status = SpeciesStatus::Failed(e.to_string());
        return Ok(outcome);
    }

    progress_callback(ProgressEvent::ListingPhotos {
        index,
        total,
        scientific_name: scientific_name.clone(),
        requested: target,
    });

    let listing = match lister.list_photos(&taxon, target) {
        Ok(listing) => listing,
        Err(e) => {
            warn!(species = %scientific_name, error = %e, "Photo listing failed");
            progress_callback(ProgressEvent::ListingFailed {
                scientific_name,
                reason: e.to_string(),
            });
            outcome.status = SpeciesStatus::Failed(e.to_string());
            return Ok(outcome);
        }
    };

    outcome.listed = listing.photos.len();
    progress_callback(ProgressEvent::PhotosListed {
        scientific_name: scientific_name.clone(),
        listed: listing.photos.len(),
        requested: target,
    });

    let mut next_index = 1;
    for photo in &listing.photos {
        progress_callback(ProgressEvent::DownloadingImage {
            position: photo.position,
            total: listing.photos.len(),
            url: photo.url.clone(),
        });

        let image = match fetcher.fetch(&photo.url) {
            Ok(image) => image,
            Err(e) => {
                warn!(url = %photo.url, error = %e, "Skipping image");
                outcome.failed_downloads += 1;
                progress_callback(ProgressEvent::DownloadFailed {
                    url: photo.url.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let path = writer.write_image(
            &scientific_name,
            next_index,
            &image.extension,
            &image.bytes,
        )?;
        next_index += 1;

        let size = image.bytes.len() as u64;
        outcome.achieved += 1;
        outcome.bytes_written += size;
        outcome.folder = path.parent().map(Path::to_path_buf);

        progress_callback(ProgressEvent::ImageSaved { path, bytes: size });
    }

    let used_everything = outcome.failed_downloads == 0 && listing.exhausted;
    outcome.status = if outcome.achieved >= outcome.requested || used_everything {
        SpeciesStatus::Completed
    } else {
        SpeciesStatus::Partial
    };

    Ok(outcome)
}
