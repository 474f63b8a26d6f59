use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser};

use crate::{
    profile::Profile,
    types::{PrState, Repo, SortKey},
};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

/// gh search rejects limits outside 1..=1000, so catch them at parse time.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Watch intervals below this are clamped up; a menu-bar poller has no
/// business hammering the search API.
pub const MIN_WATCH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// Lifecycle states to include: open, draft, merged, closed (can
    /// specify multiple or comma-separated; overrides the profile)
    #[arg(
        short = 's',
        long = "status",
        help_heading = "Filters",
        value_name = "STATE",
        value_delimiter = ','
    )]
    pub status: Vec<PrState>,

    /// Author rule (prefix - to exclude, can specify multiple)
    #[arg(
        short = 'a',
        long,
        help_heading = "Filters",
        value_name = "LOGIN",
        allow_hyphen_values = true
    )]
    pub author: Vec<String>,

    /// Repository rule: 'owner/repo' or bare 'owner' (prefix - to exclude,
    /// can specify multiple)
    #[arg(
        short = 'r',
        long,
        help_heading = "Filters",
        value_name = "OWNER[/REPO]",
        allow_hyphen_values = true
    )]
    pub repo: Vec<String>,

    /// Label rule (prefix - to exclude, can specify multiple)
    #[arg(
        long,
        help_heading = "Filters",
        value_name = "NAME",
        allow_hyphen_values = true
    )]
    pub label: Vec<String>,

    /// Extra raw search query run alongside the review-requested queries
    /// (can specify multiple)
    #[arg(long, help_heading = "Filters", value_name = "SEARCH-QUERY")]
    pub query: Vec<String>,

    /// Per-query result limit
    #[arg(short = 'L', long, help_heading = "Filters", value_name = "NUM")]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
struct ProfileArgs {
    /// Use the named profile instead of the active one
    #[arg(short = 'p', long, help_heading = "Profiles", value_name = "NAME")]
    pub profile: Option<String>,

    /// List saved profiles and exit
    #[arg(
        long = "list-profiles",
        help_heading = "Profiles",
        conflicts_with_all = ["save_profile", "delete_profile"]
    )]
    pub list_profiles: bool,

    /// Save the effective filters under NAME, make it active, and exit
    #[arg(
        long = "save-profile",
        help_heading = "Profiles",
        value_name = "NAME",
        conflicts_with = "delete_profile"
    )]
    pub save_profile: Option<String>,

    /// Delete the named profile and exit
    #[arg(long = "delete-profile", help_heading = "Profiles", value_name = "NAME")]
    pub delete_profile: Option<String>,
}

#[derive(Parser, Default, Debug)]
#[command(name = "revq")]
#[command(
    about = "Watch pull requests awaiting your review - queries the gh CLI, merges and filters the results, and renders them grouped by repository"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
struct CliArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub profiles: ProfileArgs,

    /// Keep running, refreshing periodically
    #[arg(short = 'w', long)]
    pub watch: bool,

    /// Refresh interval in seconds for --watch (default 60, floor 10)
    #[arg(short = 'i', long, value_name = "SECONDS", requires = "watch")]
    pub interval: Option<u64>,

    /// Plain list instead of grouping by repository
    #[arg(long)]
    pub flat: bool,

    /// Sort order: updated-at, created-at, repository
    #[arg(long, value_name = "KEY")]
    pub sort: Option<String>,

    /// Print 'owner/repo#number' only
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Print the result list as JSON
    #[arg(long)]
    pub json: bool,
}

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputMode {
    #[default]
    Normal,
    Quiet,
    Json,
}

/// Profile management requested instead of a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileCommand {
    List,
    Save(String),
    Delete(String),
}

/// Fully parsed invocation: which profile to use, what overrides apply,
/// and how to run and render.
#[derive(Debug)]
pub struct Invocation {
    pub profile: Option<String>,
    pub command: Option<ProfileCommand>,
    pub overrides: Overrides,
    pub watch: Option<Duration>,
    /// True when --interval was passed rather than defaulted.
    pub interval_explicit: bool,
    pub output: OutputMode,
    /// Forces flat display regardless of the profile's grouping option.
    pub flat: bool,
}

/// Per-invocation filter overrides; each set field replaces the profile's.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub statuses: Vec<PrState>,
    pub authors: Vec<String>,
    pub repos: Vec<String>,
    pub labels: Vec<String>,
    pub extra_queries: Vec<String>,
    pub limit: Option<usize>,
    pub sort: Option<SortKey>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        *self == Overrides::default()
    }

    /// Applies the overrides on top of a saved profile, yielding the
    /// effective settings for this run.
    pub fn apply(&self, profile: &Profile) -> Profile {
        let mut filters = profile.filters.clone();
        if !self.statuses.is_empty() {
            filters.statuses = self.statuses.iter().copied().collect();
        }
        if !self.authors.is_empty() {
            filters.authors = self.authors.clone();
        }
        if !self.repos.is_empty() {
            filters.repos = self.repos.clone();
        }
        if !self.labels.is_empty() {
            filters.labels = self.labels.clone();
        }
        if !self.extra_queries.is_empty() {
            filters.extra_queries = self.extra_queries.clone();
        }
        if let Some(limit) = self.limit {
            filters.limit = limit;
        }

        let mut display = profile.display.clone();
        if let Some(sort) = self.sort {
            display.sort = sort;
        }

        Profile {
            name: profile.name.clone(),
            filters,
            display,
        }
    }
}

fn parse_sort_key(s: &str) -> Result<SortKey> {
    match s {
        "updated-at" | "updated" => Ok(SortKey::UpdatedAt),
        "created-at" | "created" => Ok(SortKey::CreatedAt),
        "repository" | "repo" => Ok(SortKey::Repository),
        other => anyhow::bail!(
            "unknown sort key '{other}' (expected updated-at, created-at, or repository)"
        ),
    }
}

fn validate_repo_rules(repos: &[String]) -> Result<()> {
    for entry in repos {
        let bare = entry.strip_prefix('-').unwrap_or(entry);
        if bare.is_empty() {
            anyhow::bail!("empty repository rule");
        }
        if bare.contains('/') {
            Repo::parse(bare)
                .map_err(|e| anyhow::anyhow!("invalid repository rule '{entry}': {e}"))?;
        }
    }
    Ok(())
}

fn determine_output_mode(cli: &CliArgs) -> OutputMode {
    match (cli.json, cli.quiet) {
        (true, _) => OutputMode::Json,
        (_, true) => OutputMode::Quiet,
        _ => OutputMode::Normal,
    }
}

fn determine_profile_command(args: &ProfileArgs) -> Option<ProfileCommand> {
    if args.list_profiles {
        Some(ProfileCommand::List)
    } else if let Some(name) = &args.save_profile {
        Some(ProfileCommand::Save(name.clone()))
    } else {
        args.delete_profile
            .as_ref()
            .map(|name| ProfileCommand::Delete(name.clone()))
    }
}

fn validate_limit(limit: Option<usize>) -> Result<()> {
    if let Some(limit) = limit {
        if limit == 0 || limit > MAX_QUERY_LIMIT {
            anyhow::bail!("--limit must be between 1 and {MAX_QUERY_LIMIT}, got {limit}");
        }
    }
    Ok(())
}

fn build_invocation(cli: CliArgs) -> Result<Invocation> {
    validate_repo_rules(&cli.filters.repo)?;
    validate_limit(cli.filters.limit)?;

    let sort = cli.sort.as_deref().map(parse_sort_key).transpose()?;

    let overrides = Overrides {
        statuses: cli.filters.status.clone(),
        authors: cli.filters.author.clone(),
        repos: cli.filters.repo.clone(),
        labels: cli.filters.label.clone(),
        extra_queries: cli.filters.query.clone(),
        limit: cli.filters.limit,
        sort,
    };

    let watch = cli.watch.then(|| {
        let interval = cli
            .interval
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WATCH_INTERVAL);
        interval.max(MIN_WATCH_INTERVAL)
    });

    let output = determine_output_mode(&cli);
    let command = determine_profile_command(&cli.profiles);

    Ok(Invocation {
        profile: cli.profiles.profile,
        command,
        overrides,
        watch,
        interval_explicit: cli.interval.is_some(),
        output,
        flat: cli.flat,
    })
}

/// Parses command-line arguments into an invocation plan.
///
/// Kept separate from `main` so integration tests can drive the full
/// pipeline from raw argument vectors.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    build_invocation(cli)
}

/// Resolves the effective profile for this run: the named or active saved
/// profile with the invocation's overrides applied.
pub fn effective_profile(invocation: &Invocation, saved: &Profile) -> Profile {
    invocation.overrides.apply(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation> {
        parse_args(std::iter::once("revq").chain(args.iter().copied()))
    }

    #[test]
    fn bare_invocation_is_a_plain_fetch() {
        let inv = parse(&[]).unwrap();
        assert!(inv.command.is_none());
        assert!(inv.watch.is_none());
        assert!(inv.overrides.is_empty());
        assert_eq!(inv.output, OutputMode::Normal);
    }

    #[test]
    fn status_values_parse_comma_separated() {
        let inv = parse(&["--status", "open,merged"]).unwrap();
        assert_eq!(inv.overrides.statuses, vec![PrState::Open, PrState::Merged]);
    }

    #[test]
    fn unknown_status_value_is_rejected() {
        assert!(parse(&["--status", "reopened"]).is_err());
    }

    #[test]
    fn malformed_repo_rule_is_rejected() {
        assert!(parse(&["--repo", "a/b/c"]).is_err());
        assert!(parse(&["--repo", "owner/"]).is_err());
    }

    #[test]
    fn bare_owner_repo_rule_is_accepted() {
        let inv = parse(&["--repo", "rust-lang", "--repo", "-rust-lang/rustup"]).unwrap();
        assert_eq!(inv.overrides.repos.len(), 2);
    }

    #[test]
    fn watch_interval_has_a_floor() {
        let inv = parse(&["--watch", "--interval", "2"]).unwrap();
        assert_eq!(inv.watch, Some(MIN_WATCH_INTERVAL));
    }

    #[test]
    fn watch_without_interval_uses_default() {
        let inv = parse(&["--watch"]).unwrap();
        assert_eq!(inv.watch, Some(DEFAULT_WATCH_INTERVAL));
    }

    #[test]
    fn interval_requires_watch() {
        assert!(parse(&["--interval", "30"]).is_err());
    }

    #[test]
    fn save_and_delete_profile_conflict() {
        assert!(parse(&["--save-profile", "a", "--delete-profile", "b"]).is_err());
    }

    #[test]
    fn list_profiles_conflicts_with_save_and_delete() {
        assert!(parse(&["--list-profiles", "--save-profile", "a"]).is_err());
        assert!(parse(&["--list-profiles", "--delete-profile", "a"]).is_err());
        assert!(parse(&["--list-profiles"]).is_ok());
    }

    #[test]
    fn limit_outside_gh_range_is_rejected() {
        assert!(parse(&["--limit", "0"]).is_err());
        assert!(parse(&["--limit", "1001"]).is_err());
        let inv = parse(&["--limit", "1000"]).unwrap();
        assert_eq!(inv.overrides.limit, Some(1000));
    }

    #[test]
    fn json_wins_over_quiet() {
        let inv = parse(&["--json", "--quiet"]).unwrap();
        assert_eq!(inv.output, OutputMode::Json);
    }

    #[test]
    fn overrides_replace_only_set_fields() {
        let mut saved = Profile::new("work");
        saved.filters.authors = vec!["-dependabot".to_string()];
        saved.filters.limit = 20;

        let inv = parse(&["--status", "merged", "--limit", "5"]).unwrap();
        let effective = effective_profile(&inv, &saved);

        assert_eq!(
            effective.filters.statuses,
            [PrState::Merged].into_iter().collect()
        );
        assert_eq!(effective.filters.limit, 5);
        // Untouched fields come from the saved profile.
        assert_eq!(effective.filters.authors, vec!["-dependabot".to_string()]);
    }

    #[test]
    fn sort_key_parses_aliases() {
        let inv = parse(&["--sort", "repo"]).unwrap();
        assert_eq!(inv.overrides.sort, Some(SortKey::Repository));
        assert!(parse(&["--sort", "alphabetical"]).is_err());
    }
}
