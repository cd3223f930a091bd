/// iNaturalist API response types for deserialization.
///
/// These structures mirror the subset of the v1 JSON responses we read.
use serde::Deserialize;

/// Response from the `/v1/taxa` search endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct TaxaResponse {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub results: Vec<INatTaxon>,
}

/// A taxon entry in a search result.
#[derive(Debug, Deserialize)]
pub(super) struct INatTaxon {
    pub id: u64,
    /// Scientific name
    pub name: String,
    pub rank: Option<String>,
    pub preferred_common_name: Option<String>,
    /// The name variant the query matched against (may be a synonym)
    pub matched_term: Option<String>,
}

/// Response from the `/v1/observations` endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct ObservationsResponse {
    pub total_results: Option<u64>,
    #[serde(default)]
    pub results: Vec<INatObservation>,
}

/// A single observation; only its photos matter here.
#[derive(Debug, Deserialize)]
pub(super) struct INatObservation {
    pub id: u64,
    #[serde(default)]
    pub photos: Vec<INatPhoto>,
}

/// A photo attached to an observation.
#[derive(Debug, Deserialize)]
pub(super) struct INatPhoto {
    /// Square thumbnail URL; other sizes share the same path
    pub url: Option<String>,
}
