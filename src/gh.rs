//! Backend that shells out to the gh CLI.
//!
//! Each search query becomes one `gh search prs` invocation with `--json`
//! output; records are decoded with serde and converted into the domain
//! model. gh resolves `@me` itself, so no token or login handling happens
//! here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;

use crate::{
    query::{ReviewSource, SearchQuery},
    types::{Author, FetchError, PrState, Repo, ReviewRequest},
};

const JSON_FIELDS: &str =
    "number,title,url,author,repository,state,isDraft,createdAt,updatedAt,labels";

/// Review-request source backed by the gh command-line tool.
#[derive(Debug, Clone)]
pub struct GhCli {
    program: String,
}

impl Default for GhCli {
    fn default() -> Self {
        Self {
            program: "gh".to_string(),
        }
    }
}

impl GhCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies gh is installed and signed in, so the caller can surface
    /// one headline instead of a failure per query.
    pub async fn check_auth(&self) -> Result<(), FetchError> {
        let output = Command::new(&self.program)
            .args(["auth", "status"])
            .output()
            .await
            .map_err(map_spawn_error)?;

        if output.status.success() {
            Ok(())
        } else {
            Err(FetchError::NotAuthenticated)
        }
    }

    async fn run_search(&self, args: &[String]) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(?args, "running gh");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(map_spawn_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let status = output.status.code().unwrap_or(-1);
            // gh exits with 4 when no credentials are available.
            if status == 4 || stderr.contains("gh auth login") {
                return Err(FetchError::NotAuthenticated);
            }
            return Err(FetchError::CommandFailed { status, stderr });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl ReviewSource for GhCli {
    async fn fetch(
        &self,
        query: &SearchQuery,
        limit: usize,
    ) -> Result<Vec<ReviewRequest>, FetchError> {
        let args = render_args(query, limit);
        let stdout = self.run_search(&args).await?;

        let wire: Vec<WirePullRequest> = serde_json::from_slice(&stdout)?;
        Ok(wire
            .into_iter()
            .filter_map(|pr| match convert(pr, query) {
                Ok(request) => Some(request),
                Err(err) => {
                    tracing::warn!(%err, "skipping undecodable search result");
                    None
                }
            })
            .collect())
    }
}

fn map_spawn_error(err: std::io::Error) -> FetchError {
    if err.kind() == std::io::ErrorKind::NotFound {
        FetchError::GhMissing
    } else {
        FetchError::Io(err)
    }
}

/// Renders one query as gh CLI arguments.
pub fn render_args(query: &SearchQuery, limit: usize) -> Vec<String> {
    let mut args: Vec<String> = vec!["search".into(), "prs".into()];

    match query {
        SearchQuery::StateBucket(state) => {
            args.push("--review-requested=@me".into());
            match state {
                // The open query also returns drafts; their final state is
                // derived from the isDraft field and deduplication handles
                // the overlap with the draft bucket.
                PrState::Open => args.push("--state=open".into()),
                PrState::Draft => {
                    args.push("--state=open".into());
                    args.push("--draft".into());
                }
                PrState::Merged => args.push("--merged".into()),
                PrState::Closed => args.push("--state=closed".into()),
            }
        }
        SearchQuery::Raw(raw) => {
            let mut term = raw.trim().to_string();
            if !term.contains("type:pr") && !term.contains("is:pr") {
                term.push_str(" type:pr");
            }
            args.push(term);
        }
    }

    args.push("--json".into());
    args.push(JSON_FIELDS.into());
    args.push("--limit".into());
    args.push(limit.to_string());
    args
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePullRequest {
    number: u64,
    title: String,
    url: String,
    author: Option<WireAuthor>,
    repository: WireRepository,
    state: String,
    #[serde(default)]
    is_draft: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    labels: Vec<WireLabel>,
}

#[derive(Debug, Deserialize)]
struct WireAuthor {
    login: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    is_bot: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRepository {
    name_with_owner: String,
}

#[derive(Debug, Deserialize)]
struct WireLabel {
    name: String,
}

/// Converts a wire record into the domain model, deriving the lifecycle
/// state from the queried bucket and the draft flag.
fn convert(wire: WirePullRequest, query: &SearchQuery) -> anyhow::Result<ReviewRequest> {
    let repo = Repo::parse(&wire.repository.name_with_owner)?;

    let author = match wire.author {
        Some(a) => {
            let is_bot = a.is_bot || a.kind.as_deref() == Some("Bot");
            Author {
                login: a.login,
                is_bot,
            }
        }
        // Deleted accounts come back with no author.
        None => Author::user("ghost"),
    };

    let state = derive_state(&wire.state, wire.is_draft, query);

    Ok(ReviewRequest {
        repo,
        number: wire.number,
        title: wire.title,
        url: wire.url,
        author,
        state,
        created_at: wire.created_at,
        updated_at: wire.updated_at,
        labels: wire.labels.into_iter().map(|l| l.name).collect(),
    })
}

fn derive_state(wire_state: &str, is_draft: bool, query: &SearchQuery) -> PrState {
    // The merged bucket is the only query that can tell merged from closed;
    // the wire state field only distinguishes open from closed.
    if matches!(query, SearchQuery::StateBucket(PrState::Merged)) {
        return PrState::Merged;
    }
    match wire_state {
        "closed" => PrState::Closed,
        _ if is_draft => PrState::Draft,
        _ => PrState::Open,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_bucket_renders_state_flag() {
        let args = render_args(&SearchQuery::StateBucket(PrState::Open), 50);
        assert!(args.contains(&"--review-requested=@me".to_string()));
        assert!(args.contains(&"--state=open".to_string()));
        assert!(args.contains(&"--limit".to_string()));
        assert!(args.contains(&"50".to_string()));
    }

    #[test]
    fn merged_bucket_renders_merged_flag() {
        let args = render_args(&SearchQuery::StateBucket(PrState::Merged), 10);
        assert!(args.contains(&"--merged".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--state")));
    }

    #[test]
    fn raw_query_gains_type_pr_term() {
        let args = render_args(&SearchQuery::Raw("team-review-requested:org/team".into()), 25);
        assert!(args.contains(&"team-review-requested:org/team type:pr".to_string()));
    }

    #[test]
    fn raw_query_with_type_term_is_untouched() {
        let args = render_args(&SearchQuery::Raw("involves:@me type:pr".into()), 25);
        assert!(args.contains(&"involves:@me type:pr".to_string()));
    }

    #[test]
    fn decodes_gh_search_output() {
        let json = r#"[{
            "number": 42,
            "title": "Add retry logic",
            "url": "https://github.com/octo/widgets/pull/42",
            "author": {"login": "alice", "type": "User"},
            "repository": {"name": "widgets", "nameWithOwner": "octo/widgets"},
            "state": "open",
            "isDraft": false,
            "createdAt": "2026-08-01T10:00:00Z",
            "updatedAt": "2026-08-02T11:30:00Z",
            "labels": [{"name": "bug"}]
        }]"#;
        let wire: Vec<WirePullRequest> = serde_json::from_str(json).unwrap();
        let request = convert(
            wire.into_iter().next().unwrap(),
            &SearchQuery::StateBucket(PrState::Open),
        )
        .unwrap();
        assert_eq!(request.repo.to_string(), "octo/widgets");
        assert_eq!(request.number, 42);
        assert_eq!(request.state, PrState::Open);
        assert_eq!(request.labels, vec!["bug".to_string()]);
        assert!(!request.author.is_bot);
    }

    #[test]
    fn draft_flag_overrides_open_state() {
        assert_eq!(
            derive_state("open", true, &SearchQuery::StateBucket(PrState::Open)),
            PrState::Draft
        );
    }

    #[test]
    fn merged_bucket_forces_merged_state() {
        assert_eq!(
            derive_state("closed", false, &SearchQuery::StateBucket(PrState::Merged)),
            PrState::Merged
        );
    }

    #[test]
    fn closed_state_from_raw_query_stays_closed() {
        assert_eq!(
            derive_state("closed", false, &SearchQuery::Raw("involves:@me".into())),
            PrState::Closed
        );
    }

    #[test]
    fn bot_author_is_detected_from_type_field() {
        let json = r#"{
            "number": 7,
            "title": "Bump deps",
            "url": "https://github.com/octo/widgets/pull/7",
            "author": {"login": "dependabot", "type": "Bot"},
            "repository": {"nameWithOwner": "octo/widgets"},
            "state": "open",
            "isDraft": false,
            "createdAt": "2026-08-01T10:00:00Z",
            "updatedAt": "2026-08-01T10:00:00Z"
        }"#;
        let wire: WirePullRequest = serde_json::from_str(json).unwrap();
        let request = convert(wire, &SearchQuery::StateBucket(PrState::Open)).unwrap();
        assert!(request.author.is_bot);
        assert_eq!(request.author.display_format(), "dependabot[bot]");
    }
}
