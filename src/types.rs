use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Errors produced when parsing repository identifiers.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RepoError {
    #[error("repository must be in format 'owner/name', got: '{0}'")]
    InvalidFormat(String),
    #[error("repository owner and name must be non-empty, got: '{0}'")]
    EmptySegment(String),
}

/// A validated GitHub repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Repo {
    owner: String,
    name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();
        if owner.is_empty() || name.is_empty() {
            return Err(RepoError::EmptySegment(format!("{owner}/{name}")));
        }
        Ok(Self { owner, name })
    }

    /// Parses `owner/name`. Extra or missing segments are rejected.
    pub fn parse(s: &str) -> Result<Self, RepoError> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => Repo::new(owner, name)
                .map_err(|_| RepoError::EmptySegment(s.to_string())),
            _ => Err(RepoError::InvalidFormat(s.to_string())),
        }
    }

    /// Parses a GitHub URL, returning the repository and the PR number when
    /// the URL has a `/pull/<n>` path.
    pub fn parse_url(url_str: &str) -> anyhow::Result<(Self, Option<u64>)> {
        use anyhow::Context;

        let url = url::Url::parse(url_str)
            .with_context(|| format!("Failed to parse URL: '{url_str}'"))?;

        if url.host_str() != Some("github.com") {
            anyhow::bail!("URL must be a GitHub URL, got: '{url_str}'");
        }

        let segments: Vec<&str> = url
            .path_segments()
            .context("Cannot parse URL path")?
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [owner, name] => Ok((Repo::new(*owner, *name)?, None)),
            [owner, name, "pull", number, ..] => {
                let pr_number: u64 = number
                    .parse()
                    .with_context(|| format!("Invalid PR number in URL: '{url_str}'"))?;
                Ok((Repo::new(*owner, *name)?, Some(pr_number)))
            }
            _ => anyhow::bail!(
                "URL must be in format https://github.com/owner/repo[/pull/123], got: '{url_str}'"
            ),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl TryFrom<String> for Repo {
    type Error = RepoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Repo::parse(&s)
    }
}

impl From<Repo> for String {
    fn from(repo: Repo) -> String {
        repo.to_string()
    }
}

/// Pull request lifecycle states, used both as a record field and as the
/// key of the status filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Draft,
    Merged,
    Closed,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Draft => "draft",
            PrState::Merged => "merged",
            PrState::Closed => "closed",
        }
    }

    pub const ALL: [PrState; 4] = [
        PrState::Open,
        PrState::Draft,
        PrState::Merged,
        PrState::Closed,
    ];

    /// Specificity rank used when deduplicating across per-state queries:
    /// a merged PR also appears in closed results, and a draft in open
    /// results, so the higher rank wins.
    pub fn specificity(&self) -> u8 {
        match self {
            PrState::Open => 0,
            PrState::Draft => 1,
            PrState::Closed => 2,
            PrState::Merged => 3,
        }
    }
}

impl std::str::FromStr for PrState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(PrState::Open),
            "draft" => Ok(PrState::Draft),
            "merged" => Ok(PrState::Merged),
            "closed" => Ok(PrState::Closed),
            other => Err(format!(
                "unknown status '{other}' (expected open, draft, merged, or closed)"
            )),
        }
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort order applied to the merged result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    /// Most recently updated first.
    #[default]
    UpdatedAt,
    /// Most recently opened first.
    CreatedAt,
    /// Repository name, then PR number.
    Repository,
}

/// The author of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    #[serde(default)]
    pub is_bot: bool,
}

impl Author {
    pub fn user(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            is_bot: false,
        }
    }

    pub fn bot(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            is_bot: true,
        }
    }

    /// Display form with a bot indicator.
    pub fn display_format(&self) -> String {
        if self.is_bot {
            format!("{}[bot]", self.login)
        } else {
            self.login.clone()
        }
    }

    /// Matches a filter entry. Bot logins match with or without their
    /// `[bot]` suffix so `dependabot` and `dependabot[bot]` are equivalent.
    pub fn matches(&self, name: &str) -> bool {
        if self.login == name {
            return true;
        }
        if self.is_bot {
            let bare = self.login.trim_end_matches("[bot]");
            return name == bare
                || name == format!("{bare}[bot]")
                || name == format!("app/{bare}");
        }
        false
    }
}

/// A pull request on which the authenticated user's review was requested.
///
/// Flat record decoded from the gh CLI's JSON output; identity for
/// deduplication is the `(repo, number)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub repo: Repo,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: Author,
    pub state: PrState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl ReviewRequest {
    /// Deduplication identity: the same PR surfaced by two queries compares
    /// equal here even if the queries disagree on its state.
    pub fn id(&self) -> (Repo, u64) {
        (self.repo.clone(), self.number)
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }

    pub fn matches_author(&self, name: &str) -> bool {
        self.author.matches(name)
    }

    /// Time since the review request was opened.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Time since the last activity.
    pub fn staleness(&self, now: DateTime<Utc>) -> Duration {
        now - self.updated_at
    }
}

/// Failures of the gh CLI backend, surfaced as a single headline in the
/// front-end rather than per-item errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("gh CLI not found; install it from https://cli.github.com")]
    GhMissing,

    #[error("not signed in to GitHub; run 'gh auth login'")]
    NotAuthenticated,

    #[error("gh command failed ({status}): {stderr}")]
    CommandFailed { status: i32, stderr: String },

    #[error("failed to decode gh output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to run gh: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_parse_accepts_owner_slash_name() {
        let repo = Repo::parse("rust-lang/cargo").unwrap();
        assert_eq!(repo.owner(), "rust-lang");
        assert_eq!(repo.name(), "cargo");
        assert_eq!(repo.to_string(), "rust-lang/cargo");
    }

    #[test]
    fn repo_parse_rejects_bad_shapes() {
        assert!(matches!(
            Repo::parse("no-slash"),
            Err(RepoError::InvalidFormat(_))
        ));
        assert!(matches!(
            Repo::parse("a/b/c"),
            Err(RepoError::InvalidFormat(_))
        ));
        assert!(matches!(Repo::parse("/name"), Err(RepoError::EmptySegment(_))));
        assert!(matches!(Repo::parse("owner/"), Err(RepoError::EmptySegment(_))));
    }

    #[test]
    fn repo_parse_url_extracts_pr_number() {
        let (repo, number) =
            Repo::parse_url("https://github.com/rust-lang/cargo/pull/1234").unwrap();
        assert_eq!(repo, Repo::new("rust-lang", "cargo").unwrap());
        assert_eq!(number, Some(1234));
    }

    #[test]
    fn repo_parse_url_without_pull_path() {
        let (repo, number) = Repo::parse_url("https://github.com/rust-lang/cargo").unwrap();
        assert_eq!(repo.to_string(), "rust-lang/cargo");
        assert_eq!(number, None);
    }

    #[test]
    fn repo_parse_url_rejects_non_github_hosts() {
        assert!(Repo::parse_url("https://gitlab.com/a/b/pull/1").is_err());
    }

    #[test]
    fn repo_serde_round_trips_as_string() {
        let repo = Repo::new("octo", "hello").unwrap();
        let json = serde_json::to_string(&repo).unwrap();
        assert_eq!(json, "\"octo/hello\"");
        let back: Repo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, repo);
    }

    #[test]
    fn state_parse_is_case_insensitive() {
        assert_eq!("OPEN".parse::<PrState>().unwrap(), PrState::Open);
        assert_eq!("Draft".parse::<PrState>().unwrap(), PrState::Draft);
        assert!("reopened".parse::<PrState>().is_err());
    }

    #[test]
    fn state_specificity_prefers_merged_over_closed() {
        assert!(PrState::Merged.specificity() > PrState::Closed.specificity());
        assert!(PrState::Draft.specificity() > PrState::Open.specificity());
    }

    #[test]
    fn age_and_staleness_measure_from_the_right_timestamps() {
        let now = Utc::now();
        let request = ReviewRequest {
            repo: Repo::new("octo", "widgets").unwrap(),
            number: 1,
            title: "t".to_string(),
            url: "https://github.com/octo/widgets/pull/1".to_string(),
            author: Author::user("alice"),
            state: PrState::Open,
            created_at: now - Duration::days(3),
            updated_at: now - Duration::hours(2),
            labels: vec![],
        };
        assert_eq!(request.age(now), Duration::days(3));
        assert_eq!(request.staleness(now), Duration::hours(2));
        assert!(request.age(now) > request.staleness(now));
    }

    #[test]
    fn bot_author_matches_with_and_without_suffix() {
        let bot = Author::bot("dependabot");
        assert!(bot.matches("dependabot"));
        assert!(bot.matches("dependabot[bot]"));
        assert!(bot.matches("app/dependabot"));
        assert!(!bot.matches("renovate"));

        let user = Author::user("alice");
        assert!(user.matches("alice"));
        assert!(!user.matches("alice[bot]"));
    }
}
