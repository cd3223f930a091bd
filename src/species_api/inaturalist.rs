/// iNaturalist species provider implementation.
use super::inaturalist_types::{ObservationsResponse, TaxaResponse};
use super::{
    ListingOptions, PhotoListing, PhotoLister, PhotoRecord, PhotoSize, SpeciesApiError, Taxon,
    TaxonCandidate, TaxonResolver, best_match, with_retries,
};
use crate::config::ClientConfig;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::cell::Cell;
use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Largest page size the observations endpoint accepts
const MAX_PER_PAGE: u32 = 200;

/// The API refuses to page past this many results
const MAX_RESULT_WINDOW: u64 = 10_000;

/// Number of taxon candidates considered by the ranking
const TAXA_PER_QUERY: &str = "30";

/// Species provider for the iNaturalist v1 API.
///
/// Resolves names through `/v1/taxa` and lists photos through
/// `/v1/observations`. Consecutive API calls are spaced by the configured
/// request delay; transient failures are retried.
pub struct INaturalistClient {
    http: reqwest::blocking::Client,
    base_url: String,
    options: ListingOptions,
    request_delay: Duration,
    retries: u32,
    retry_delay: Duration,
    last_request: Cell<Option<Instant>>,
}

impl INaturalistClient {
    /// Public API endpoint
    pub const BASE_URL: &'static str = "https://api.inaturalist.org/v1";

    /// Creates a client on top of an existing HTTP client.
    pub fn new(
        http: reqwest::blocking::Client,
        config: &ClientConfig,
        options: ListingOptions,
    ) -> Self {
        Self {
            http,
            base_url: Self::BASE_URL.to_string(),
            options,
            request_delay: config.request_delay,
            retries: config.retries,
            retry_delay: config.retry_delay,
            last_request: Cell::new(None),
        }
    }

    /// Sleeps until at least `request_delay` has passed since the last call
    fn throttle(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.request_delay {
                thread::sleep(self.request_delay - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }

    /// Performs a GET against the API and decodes the JSON body
    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SpeciesApiError> {
        self.throttle();

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, ?query, "Calling species API");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| SpeciesApiError::Transient(e.to_string()))?;

        classify_status(response.status())?;

        response
            .json()
            .map_err(|e| SpeciesApiError::InvalidData(e.to_string()))
    }

    /// Converts a taxa search response into the best-matching taxon
    fn select_taxon(name: &str, response: TaxaResponse) -> Result<Taxon, SpeciesApiError> {
        debug!(name, total = response.total_results, "Taxon search returned");

        let candidates: Vec<TaxonCandidate> = response
            .results
            .into_iter()
            .map(|t| TaxonCandidate {
                id: t.id,
                scientific_name: t.name,
                common_name: t.preferred_common_name,
                matched_term: t.matched_term,
                rank: t.rank,
            })
            .collect();

        let best = best_match(name, &candidates)
            .ok_or_else(|| SpeciesApiError::NotFound(name.to_string()))?;

        if best.scientific_name.trim().is_empty() {
            return Err(SpeciesApiError::InvalidData(format!(
                "Taxon {} has no scientific name",
                best.id
            )));
        }

        Ok(Taxon {
            id: best.id,
            scientific_name: best.scientific_name.clone(),
            common_name: best.common_name.clone(),
            rank: best.rank.clone(),
        })
    }

    /// Page size for a listing of `count` photos
    fn page_size(&self, count: usize) -> u32 {
        self.options
            .per_page
            .unwrap_or_else(|| u32::try_from(count).unwrap_or(MAX_PER_PAGE))
            .clamp(1, MAX_PER_PAGE)
    }
}

impl TaxonResolver for INaturalistClient {
    fn resolve(&self, name: &str) -> Result<Taxon, SpeciesApiError> {
        let query = [
            ("q", name.to_string()),
            ("is_active", "true".to_string()),
            ("per_page", TAXA_PER_QUERY.to_string()),
        ];

        let response: TaxaResponse =
            with_retries(self.retries, self.retry_delay, name, || {
                self.get_json("/taxa", &query)
            })?;

        Self::select_taxon(name, response)
    }
}

impl PhotoLister for INaturalistClient {
    fn list_photos(&self, taxon: &Taxon, count: usize) -> Result<PhotoListing, SpeciesApiError> {
        let per_page = self.page_size(count);

        collect_photos(count, per_page, &self.options, |page| {
            let mut query = vec![
                ("taxon_id", taxon.id.to_string()),
                ("photos", "true".to_string()),
                ("photo_license", "any".to_string()),
                ("order_by", self.options.order_by.as_query().to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(grade) = self.options.quality_grade.as_query() {
                query.push(("quality_grade", grade.to_string()));
            }

            with_retries(
                self.retries,
                self.retry_delay,
                &taxon.scientific_name,
                || self.get_json("/observations", &query),
            )
        })
    }
}

/// Maps an HTTP status to the API error taxonomy.
///
/// 5xx and 429 are transient and worth retrying; any other non-success
/// status means the request itself is wrong.
fn classify_status(status: StatusCode) -> Result<(), SpeciesApiError> {
    if status.is_success() {
        return Ok(());
    }

    let description = format!(
        "HTTP {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(SpeciesApiError::Transient(description))
    } else {
        Err(SpeciesApiError::InvalidData(description))
    }
}

/// Rewrites a photo URL from the API's square thumbnail to `size`.
///
/// URLs that do not follow the `/square.<ext>` pattern are returned unchanged.
pub(crate) fn resize_photo_url(url: &str, size: PhotoSize) -> String {
    url.replacen("/square.", &format!("/{}.", size.as_str()), 1)
}

/// Pages through observations until `count` unique photos are collected or
/// the API has no more pages.
fn collect_photos<F>(
    count: usize,
    per_page: u32,
    options: &ListingOptions,
    mut fetch_page: F,
) -> Result<PhotoListing, SpeciesApiError>
where
    F: FnMut(u32) -> Result<ObservationsResponse, SpeciesApiError>,
{
    let mut photos: Vec<PhotoRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut total_observations = None;
    let mut exhausted = false;
    let mut page: u32 = 1;

    // A cap of zero would skip every photo while paging to the end
    let per_observation = options.max_photos_per_observation.filter(|&max| max > 0);

    while photos.len() < count {
        let response = fetch_page(page)?;
        total_observations = response.total_results.or(total_observations);
        let received = response.results.len();

        'observations: for observation in response.results {
            let mut taken = 0;
            for photo in observation.photos {
                if photos.len() >= count {
                    break 'observations;
                }
                if per_observation.is_some_and(|max| taken >= max) {
                    break;
                }
                let Some(url) = photo.url else {
                    continue;
                };

                let url = resize_photo_url(&url, options.photo_size);
                if !seen.insert(url.clone()) {
                    continue;
                }

                taken += 1;
                let position = photos.len() + 1;
                photos.push(PhotoRecord {
                    url,
                    position,
                    observation_id: observation.id,
                });
            }
        }

        let fetched_so_far = u64::from(page) * u64::from(per_page);
        let last_page = received == 0
            || received < per_page as usize
            || total_observations.is_some_and(|total| fetched_so_far >= total)
            || fetched_so_far >= MAX_RESULT_WINDOW;

        debug!(page, received, collected = photos.len(), last_page, "Observation page processed");

        if last_page {
            exhausted = photos.len() < count;
            break;
        }
        page += 1;
    }

    Ok(PhotoListing {
        photos,
        requested: count,
        total_observations,
        exhausted,
    })
}
