use std::collections::BTreeSet;

use crate::types::{PrState, Repo, ReviewRequest};

/// A predicate applied to fetched review requests. Filters are independent
/// and combined with AND; an absent filter matches everything.
pub trait PostFilter: std::fmt::Debug {
    fn matches(&self, request: &ReviewRequest) -> bool;
}

/// Inclusion set over PR lifecycle states.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    pub statuses: BTreeSet<PrState>,
}

impl PostFilter for StatusFilter {
    fn matches(&self, request: &ReviewRequest) -> bool {
        self.statuses.contains(&request.state)
    }
}

/// Entries in a rule list, split into includes and excludes by a `-` prefix.
///
/// Positive entries are OR'd (any match passes); negative entries always
/// exclude. An empty positive set means "include everything not excluded".
#[derive(Debug, Clone, Default)]
pub struct RuleList {
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl RuleList {
    pub fn parse(entries: &[String]) -> Self {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        for entry in entries {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if let Some(neg) = entry.strip_prefix('-') {
                excludes.push(neg.to_string());
            } else {
                includes.push(entry.to_string());
            }
        }
        Self { includes, excludes }
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    fn verdict(&self, hit: impl Fn(&str) -> bool) -> bool {
        if self.excludes.iter().any(|e| hit(e)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|i| hit(i))
    }
}

/// Author inclusion/exclusion rules.
#[derive(Debug, Clone)]
pub struct AuthorFilter {
    pub rules: RuleList,
}

impl PostFilter for AuthorFilter {
    fn matches(&self, request: &ReviewRequest) -> bool {
        self.rules.verdict(|name| request.matches_author(name))
    }
}

/// Repository inclusion/exclusion rules. Entries are `owner/name` or a bare
/// `owner`, which matches every repository of that owner.
#[derive(Debug, Clone)]
pub struct RepoFilter {
    pub rules: RuleList,
}

fn repo_entry_matches(entry: &str, repo: &Repo) -> bool {
    match entry.split_once('/') {
        Some((owner, name)) => repo.owner() == owner && repo.name() == name,
        None => repo.owner() == entry,
    }
}

impl PostFilter for RepoFilter {
    fn matches(&self, request: &ReviewRequest) -> bool {
        self.rules.verdict(|entry| repo_entry_matches(entry, &request.repo))
    }
}

/// Label inclusion/exclusion rules.
#[derive(Debug, Clone)]
pub struct LabelFilter {
    pub rules: RuleList,
}

impl PostFilter for LabelFilter {
    fn matches(&self, request: &ReviewRequest) -> bool {
        self.rules.verdict(|name| request.has_label(name))
    }
}

/// Applies all filters, keeping requests that pass every one.
pub fn apply_post_filters(
    requests: Vec<ReviewRequest>,
    filters: &[Box<dyn PostFilter + Send + Sync>],
) -> Vec<ReviewRequest> {
    requests
        .into_iter()
        .filter(|request| filters.iter().all(|f| f.matches(request)))
        .collect()
}

/// Groups requests by repository for display, preserving the incoming sort
/// order both across groups (first appearance) and within each group.
pub fn group_by_repo(requests: &[ReviewRequest]) -> Vec<(Repo, Vec<&ReviewRequest>)> {
    let mut groups: Vec<(Repo, Vec<&ReviewRequest>)> = Vec::new();
    for request in requests {
        match groups.iter_mut().find(|(repo, _)| *repo == request.repo) {
            Some((_, members)) => members.push(request),
            None => groups.push((request.repo.clone(), vec![request])),
        }
    }
    groups
}
