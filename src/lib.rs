//! Revq: watch pull requests awaiting your review.
//!
//! Periodically queries the gh CLI for review requests, merges and
//! deduplicates the results of several searches, applies profile-based
//! filters, and hands the grouped result to a front-end for display.

pub mod cli;
pub mod filter;
pub mod gh;
pub mod profile;
pub mod query;
pub mod refresh;
pub mod types;

pub use cli::{Invocation, OutputMode, Overrides, ProfileCommand, effective_profile, parse_args};
pub use filter::{PostFilter, RuleList, group_by_repo};
pub use gh::GhCli;
pub use profile::{
    DisplayOptions, FilterSettings, Preferences, Profile, ProfileError, ProfileStore,
};
pub use query::{QueryResult, QuerySpec, ReviewSource, SearchQuery, fetch_review_requests};
pub use refresh::Refresher;
pub use types::{
    Author, FetchError, PrState, Repo, RepoError, ReviewRequest, SortKey,
};
