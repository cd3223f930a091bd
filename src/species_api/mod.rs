/// Data structures and traits for species name resolution and photo listing.
///
/// This module provides structures to represent resolved taxa and the photo
/// records attached to their observations, as well as traits for
/// implementing species data providers.
mod inaturalist;
mod inaturalist_types;
mod ranking;

pub use inaturalist::INaturalistClient;
pub use ranking::{TaxonCandidate, best_match};

use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while talking to the species API.
#[derive(Debug, Error)]
pub enum SpeciesApiError {
    /// The name did not resolve to any taxon
    #[error("No taxon found for '{0}'")]
    NotFound(String),

    /// Network failure or a retryable HTTP status (5xx, 429)
    #[error("Request failed: {0}")]
    Transient(String),

    /// The API rejected the request or returned data we cannot use
    #[error("API returned invalid data: {0}")]
    InvalidData(String),
}

impl SpeciesApiError {
    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SpeciesApiError::Transient(_))
    }
}

/// A taxon resolved from a user-supplied species name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxon {
    /// The API's identifier for this taxon
    pub id: u64,
    /// Canonical scientific name, used for the dataset folder
    pub scientific_name: String,
    /// Preferred common name, if the API knows one
    pub common_name: Option<String>,
    /// Taxonomic rank (e.g. "species", "subspecies")
    pub rank: Option<String>,
}

/// A single photo belonging to an observation of a taxon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    /// Download URL, already rewritten to the requested size
    pub url: String,
    /// 1-based position within the listing
    pub position: usize,
    /// The observation this photo was attached to
    pub observation_id: u64,
}

/// The result of listing photos for a taxon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoListing {
    /// Unique photos in API order, never more than `requested`
    pub photos: Vec<PhotoRecord>,
    /// How many photos were asked for
    pub requested: usize,
    /// Total matching observations as reported by the API
    pub total_observations: Option<u64>,
    /// True when the API ran out of pages before `requested` was reached
    pub exhausted: bool,
}

impl PhotoListing {
    /// Number of requested photos the API could not provide
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.photos.len())
    }
}

/// Size variant of an iNaturalist photo URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotoSize {
    Square,
    Small,
    #[default]
    Medium,
    Large,
    Original,
}

impl PhotoSize {
    /// The path segment the API uses for this size
    pub fn as_str(self) -> &'static str {
        match self {
            PhotoSize::Square => "square",
            PhotoSize::Small => "small",
            PhotoSize::Medium => "medium",
            PhotoSize::Large => "large",
            PhotoSize::Original => "original",
        }
    }
}

/// Observation quality grade filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityGrade {
    #[default]
    Research,
    NeedsId,
    Casual,
    /// No filter
    Any,
}

impl QualityGrade {
    fn as_query(self) -> Option<&'static str> {
        match self {
            QualityGrade::Research => Some("research"),
            QualityGrade::NeedsId => Some("needs_id"),
            QualityGrade::Casual => Some("casual"),
            QualityGrade::Any => None,
        }
    }
}

/// Sort order for observation listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservationOrder {
    #[default]
    Votes,
    CreatedAt,
    ObservedOn,
    Id,
}

impl ObservationOrder {
    fn as_query(self) -> &'static str {
        match self {
            ObservationOrder::Votes => "votes",
            ObservationOrder::CreatedAt => "created_at",
            ObservationOrder::ObservedOn => "observed_on",
            ObservationOrder::Id => "id",
        }
    }
}

/// Options controlling how photos are listed for a taxon.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingOptions {
    /// Observations per page; `None` uses the requested count capped at the API maximum
    pub per_page: Option<u32>,
    pub photo_size: PhotoSize,
    pub quality_grade: QualityGrade,
    pub order_by: ObservationOrder,
    /// Take at most this many photos from a single observation; zero means no cap
    pub max_photos_per_observation: Option<usize>,
}

/// Trait for providers that resolve free-form species names to taxa.
pub trait TaxonResolver {
    /// Resolves a common or scientific name to its best-matching taxon.
    ///
    /// # Errors
    ///
    /// `NotFound` when the provider has no match, `Transient` or
    /// `InvalidData` when the lookup itself failed.
    fn resolve(&self, name: &str) -> Result<Taxon, SpeciesApiError>;
}

/// Trait for providers that list photos of observations for a taxon.
pub trait PhotoLister {
    /// Lists up to `count` unique photos for the taxon, in provider order.
    ///
    /// Returning fewer than `count` photos is not an error; the listing
    /// reports the shortfall instead.
    fn list_photos(&self, taxon: &Taxon, count: usize) -> Result<PhotoListing, SpeciesApiError>;
}

/// Runs `operation`, repeating it up to `retries` more times while it fails
/// with a transient error. Non-transient errors are returned immediately.
pub(crate) fn with_retries<T, F>(
    retries: u32,
    delay: Duration,
    what: &str,
    mut operation: F,
) -> Result<T, SpeciesApiError>
where
    F: FnMut() -> Result<T, SpeciesApiError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(what, attempt, retries, error = %e, "Retrying after transient failure");
                thread::sleep(delay);
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_shortfall() {
        let listing = PhotoListing {
            photos: vec![PhotoRecord {
                url: "https://example.org/1/medium.jpg".to_string(),
                position: 1,
                observation_id: 7,
            }],
            requested: 3,
            total_observations: Some(1),
            exhausted: true,
        };
        assert_eq!(listing.shortfall(), 2);
    }

    #[test]
    fn test_retries_stop_after_limit() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retries(2, Duration::ZERO, "test", || {
            calls.set(calls.get() + 1);
            Err(SpeciesApiError::Transient("boom".to_string()))
        });
        assert!(matches!(result, Err(SpeciesApiError::Transient(_))));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_retries_skip_non_transient() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retries(5, Duration::ZERO, "test", || {
            calls.set(calls.get() + 1);
            Err(SpeciesApiError::NotFound("Zzqplorf bogus".to_string()))
        });
        assert!(matches!(result, Err(SpeciesApiError::NotFound(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_retries_return_first_success() {
        let calls = Cell::new(0);
        let result = with_retries(3, Duration::ZERO, "test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(SpeciesApiError::Transient("flaky".to_string()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 2);
    }
}
