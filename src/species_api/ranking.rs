//! Best-match selection over taxon search results
//!
//! The search endpoint returns candidates in its own relevance order. We rank
//! them with an explicit total order so the chosen taxon does not silently
//! depend on which fields happen to be present.

/// A search result as seen by the ranking function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonCandidate {
    pub id: u64,
    pub scientific_name: String,
    pub common_name: Option<String>,
    pub matched_term: Option<String>,
    pub rank: Option<String>,
}

/// Match tier of a candidate; lower is better
fn tier(query: &str, candidate: &TaxonCandidate) -> u8 {
    let matches = |s: &Option<String>| {
        s.as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(query))
    };

    if candidate.scientific_name.trim().eq_ignore_ascii_case(query) {
        0
    } else if matches(&candidate.common_name) || matches(&candidate.matched_term) {
        1
    } else if candidate.rank.as_deref() == Some("species") {
        2
    } else {
        3
    }
}

/// Picks the best candidate for `query`.
///
/// Order: exact scientific name, then exact common name or matched term,
/// then species-rank candidates, then everything else. Ties keep the API's
/// order, so with no better signal the first result wins.
pub fn best_match<'a>(query: &str, candidates: &'a [TaxonCandidate]) -> Option<&'a TaxonCandidate> {
    let query = query.trim();
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(position, candidate)| (tier(query, candidate), *position))
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u64, name: &str, common: Option<&str>, rank: &str) -> TaxonCandidate {
        TaxonCandidate {
            id,
            scientific_name: name.to_string(),
            common_name: common.map(str::to_string),
            matched_term: None,
            rank: Some(rank.to_string()),
        }
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(best_match("Panthera leo", &[]), None);
    }

    #[test]
    fn test_exact_scientific_name_wins_over_api_order() {
        let candidates = vec![
            candidate(1, "Panthera leo persica", Some("Asiatic Lion"), "subspecies"),
            candidate(2, "Panthera leo", Some("Lion"), "species"),
        ];
        assert_eq!(best_match("panthera leo", &candidates).unwrap().id, 2);
    }

    #[test]
    fn test_common_name_match() {
        let candidates = vec![
            candidate(10, "Ailuropoda", None, "genus"),
            candidate(11, "Ailuropoda melanoleuca", Some("Giant Panda"), "species"),
        ];
        let best = best_match("Giant Panda", &candidates).unwrap();
        assert_eq!(best.scientific_name, "Ailuropoda melanoleuca");
    }

    #[test]
    fn test_matched_term_counts_as_exact() {
        let mut synonym = candidate(5, "Canis lupus", Some("Gray Wolf"), "species");
        synonym.matched_term = Some("Wolf".to_string());
        let candidates = vec![candidate(4, "Canis", None, "genus"), synonym];
        assert_eq!(best_match("wolf", &candidates).unwrap().id, 5);
    }

    #[test]
    fn test_species_rank_preferred_over_higher_ranks() {
        let candidates = vec![
            candidate(1, "Felidae", Some("Cats"), "family"),
            candidate(2, "Felis catus", Some("Domestic Cat"), "species"),
        ];
        assert_eq!(best_match("cat", &candidates).unwrap().id, 2);
    }

    #[test]
    fn test_ties_keep_api_order() {
        let candidates = vec![
            candidate(1, "Homo sapiens", Some("Human"), "species"),
            candidate(2, "Homo sapiens", Some("Human"), "species"),
        ];
        assert_eq!(best_match("Homo sapiens", &candidates).unwrap().id, 1);
        assert_eq!(best_match("something else", &candidates).unwrap().id, 1);
    }
}
