use std::collections::{HashMap, hash_map::Entry};

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::{
    filter::{PostFilter, apply_post_filters},
    types::{FetchError, PrState, Repo, ReviewRequest, SortKey},
};

/// One backend invocation: either a lifecycle-state bucket of the user's
/// review requests, or a raw search query passed through verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    StateBucket(PrState),
    Raw(String),
}

/// Everything a single refresh needs: which queries to run and how to
/// reduce their combined output.
pub struct QuerySpec {
    /// Status buckets to query, one subprocess invocation each.
    pub buckets: Vec<PrState>,
    /// Additional raw search queries from the active profile.
    pub extra_queries: Vec<String>,
    /// Predicates applied after merging, combined with AND.
    pub post_filters: Vec<Box<dyn PostFilter + Send + Sync>>,
    /// Sort order of the final list.
    pub sort: SortKey,
    /// Per-query result cap passed to the backend.
    pub limit: usize,
}

impl QuerySpec {
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.buckets
            .iter()
            .map(|state| SearchQuery::StateBucket(*state))
            .chain(self.extra_queries.iter().map(|q| SearchQuery::Raw(q.clone())))
            .collect()
    }
}

impl std::fmt::Debug for QuerySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySpec")
            .field("buckets", &self.buckets)
            .field("extra_queries", &self.extra_queries)
            .field("post_filters", &self.post_filters.len())
            .field("sort", &self.sort)
            .field("limit", &self.limit)
            .finish()
    }
}

/// Result of one refresh.
#[derive(Debug)]
pub struct QueryResult {
    /// Deduplicated, filtered, sorted review requests.
    pub requests: Vec<ReviewRequest>,
    /// Count before post filters were applied, for "showing X of Y".
    pub total_fetched: usize,
}

/// Abstraction over the review-request backend.
///
/// The production implementation shells out to the gh CLI; tests substitute
/// a mock returning canned records.
#[async_trait]
pub trait ReviewSource {
    async fn fetch(
        &self,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<ReviewRequest>, FetchError>;
}

/// Fetches review requests according to the query specification.
///
/// Runs one backend query per enabled status bucket plus one per extra raw
/// query, concurrently. Results are merged, deduplicated by `(repo, number)`
/// and sorted; post filters reduce the merged list.
pub async fn fetch_review_requests<S>(
    spec: &QuerySpec,
    source: &S,
) -> Result<QueryResult, FetchError>
where
    S: ReviewSource + Sync,
{
    let queries = spec.queries();
    if queries.is_empty() {
        return Ok(QueryResult {
            requests: Vec::new(),
            total_fetched: 0,
        });
    }

    let batches = try_join_all(queries.iter().map(|q| source.fetch(q, spec.limit))).await?;

    let merged = merge_and_dedupe(batches);
    let total_fetched = merged.len();

    let mut requests = apply_post_filters(merged, &spec.post_filters);
    sort_requests(&mut requests, spec.sort);

    tracing::debug!(
        total = total_fetched,
        kept = requests.len(),
        "refresh complete"
    );

    Ok(QueryResult {
        requests,
        total_fetched,
    })
}

/// Merges per-query batches into one list with unique `(repo, number)`
/// identities.
///
/// A merged PR also appears in closed-state results and a draft in
/// open-state results, so when duplicates disagree the record with the more
/// specific state wins.
fn merge_and_dedupe(batches: Vec<Vec<ReviewRequest>>) -> Vec<ReviewRequest> {
    let mut seen: HashMap<(Repo, u64), ReviewRequest> = HashMap::new();

    for request in batches.into_iter().flatten() {
        match seen.entry(request.id()) {
            Entry::Occupied(mut existing) => {
                if request.state.specificity() > existing.get().state.specificity() {
                    existing.insert(request);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(request);
            }
        }
    }

    seen.into_values().collect()
}

fn sort_requests(requests: &mut [ReviewRequest], sort: SortKey) {
    match sort {
        SortKey::UpdatedAt => {
            requests.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        }
        SortKey::CreatedAt => {
            requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        SortKey::Repository => {
            requests.sort_by(|a, b| a.repo.cmp(&b.repo).then(a.number.cmp(&b.number)));
        }
    }
}
