//! Settings profiles and the key-value preferences store.
//!
//! A profile is a named bundle of filter settings and display options.
//! The full profile list lives in one flat JSON file under the per-user
//! config directory; small scalar preferences (refresh interval, active
//! profile pointer) live in their own key-value JSON file.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    filter::{AuthorFilter, LabelFilter, PostFilter, RepoFilter, RuleList, StatusFilter},
    query::QuerySpec,
    types::{PrState, SortKey},
};

/// Errors produced by the settings layer.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no profile named '{0}'")]
    NotFound(String),

    #[error("profile name must be non-empty")]
    EmptyName,

    #[error("a profile named '{0}' already exists")]
    Duplicate(String),

    #[error("no usable config directory on this system")]
    NoConfigDir,
}

pub const DEFAULT_PROFILE_NAME: &str = "default";
pub const DEFAULT_LIMIT: usize = 50;

/// Filter settings of one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Enabled lifecycle states.
    #[serde(default = "default_statuses")]
    pub statuses: BTreeSet<PrState>,
    /// Author rules, `-` prefix negates.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Repository rules (`owner/name` or bare `owner`), `-` prefix negates.
    #[serde(default)]
    pub repos: Vec<String>,
    /// Label rules, `-` prefix negates.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Additional raw search queries run alongside the status buckets.
    #[serde(default)]
    pub extra_queries: Vec<String>,
    /// Per-query result cap.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_statuses() -> BTreeSet<PrState> {
    [PrState::Open, PrState::Draft].into_iter().collect()
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            statuses: default_statuses(),
            authors: Vec::new(),
            repos: Vec::new(),
            labels: Vec::new(),
            extra_queries: Vec::new(),
            limit: DEFAULT_LIMIT,
        }
    }
}

impl FilterSettings {
    /// Builds the post-fetch predicate set for these settings.
    pub fn post_filters(&self) -> Vec<Box<dyn PostFilter + Send + Sync>> {
        let mut out: Vec<Box<dyn PostFilter + Send + Sync>> = Vec::new();

        out.push(Box::new(StatusFilter {
            statuses: self.statuses.clone(),
        }));

        let authors = RuleList::parse(&self.authors);
        if !authors.is_empty() {
            out.push(Box::new(AuthorFilter { rules: authors }));
        }

        let repos = RuleList::parse(&self.repos);
        if !repos.is_empty() {
            out.push(Box::new(RepoFilter { rules: repos }));
        }

        let labels = RuleList::parse(&self.labels);
        if !labels.is_empty() {
            out.push(Box::new(LabelFilter { rules: labels }));
        }

        out
    }
}

/// How the result list is presented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayOptions {
    #[serde(default = "default_true")]
    pub group_by_repo: bool,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default = "default_true")]
    pub show_age: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            group_by_repo: true,
            sort: SortKey::default(),
            show_age: true,
        }
    }
}

/// A named, saved bundle of filter settings and display options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub filters: FilterSettings,
    #[serde(default)]
    pub display: DisplayOptions,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filters: FilterSettings::default(),
            display: DisplayOptions::default(),
        }
    }

    /// Builds the query specification one refresh of this profile needs:
    /// one status bucket per enabled state, the extra raw queries, and the
    /// post filters.
    pub fn query_spec(&self) -> QuerySpec {
        QuerySpec {
            buckets: self.filters.statuses.iter().copied().collect(),
            extra_queries: self.filters.extra_queries.clone(),
            post_filters: self.filters.post_filters(),
            sort: self.display.sort,
            limit: self.filters.limit,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    active: String,
    profiles: Vec<Profile>,
}

/// The saved profile list plus the active-profile pointer, persisted as one
/// flat JSON file.
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    active: String,
    profiles: Vec<Profile>,
}

impl ProfileStore {
    /// Default on-disk location: `<config dir>/revq/profiles.json`.
    pub fn default_path() -> Result<PathBuf, ProfileError> {
        let base = dirs::config_dir().ok_or(ProfileError::NoConfigDir)?;
        Ok(base.join("revq").join("profiles.json"))
    }

    /// Loads the store. A missing file yields a store containing only the
    /// default profile; a corrupt file is an error rather than silent reset.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                active: DEFAULT_PROFILE_NAME.to_string(),
                profiles: vec![Profile::new(DEFAULT_PROFILE_NAME)],
            });
        }

        let content = std::fs::read_to_string(&path)?;
        let mut file: StoreFile =
            serde_json::from_str(&content).map_err(|source| ProfileError::Decode {
                path: path.display().to_string(),
                source,
            })?;

        if file.profiles.is_empty() {
            file.profiles.push(Profile::new(DEFAULT_PROFILE_NAME));
        }
        if !file.profiles.iter().any(|p| p.name == file.active) {
            file.active = file.profiles[0].name.clone();
        }

        Ok(Self {
            path,
            active: file.active,
            profiles: file.profiles,
        })
    }

    /// Persists the store. Writes a temp file in the same directory and
    /// renames it over the target so a crash never leaves a torn file.
    pub fn save(&self) -> Result<(), ProfileError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = StoreFile {
            active: self.active.clone(),
            profiles: self.profiles.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The currently active profile.
    pub fn active(&self) -> &Profile {
        // Both load() and the mutators keep the pointer valid.
        self.profiles
            .iter()
            .find(|p| p.name == self.active)
            .unwrap_or(&self.profiles[0])
    }

    pub fn active_name(&self) -> &str {
        &self.active
    }

    pub fn set_active(&mut self, name: &str) -> Result<(), ProfileError> {
        if self.get(name).is_none() {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        self.active = name.to_string();
        Ok(())
    }

    /// Inserts or replaces the profile with the same name.
    pub fn upsert(&mut self, profile: Profile) -> Result<(), ProfileError> {
        if profile.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        match self.profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
        Ok(())
    }

    /// Removes a profile. Removing the last one recreates the default;
    /// removing the active one reassigns the pointer to the first remaining.
    pub fn remove(&mut self, name: &str) -> Result<(), ProfileError> {
        let index = self
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        self.profiles.remove(index);

        if self.profiles.is_empty() {
            self.profiles.push(Profile::new(DEFAULT_PROFILE_NAME));
        }
        if self.active == name {
            self.active = self.profiles[0].name.clone();
        }
        Ok(())
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), ProfileError> {
        if to.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if self.get(to).is_some() {
            return Err(ProfileError::Duplicate(to.to_string()));
        }
        let profile = self
            .profiles
            .iter_mut()
            .find(|p| p.name == from)
            .ok_or_else(|| ProfileError::NotFound(from.to_string()))?;
        profile.name = to.to_string();
        if self.active == from {
            self.active = to.to_string();
        }
        Ok(())
    }
}

/// Small string key-value store persisted as its own JSON file, the analog
/// of the OS preferences store the original app keeps scalars in.
#[derive(Debug)]
pub struct Preferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Preferences {
    /// Default on-disk location: `<config dir>/revq/prefs.json`.
    pub fn default_path() -> Result<PathBuf, ProfileError> {
        let base = dirs::config_dir().ok_or(ProfileError::NoConfigDir)?;
        Ok(base.join("revq").join("prefs.json"))
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|source| ProfileError::Decode {
                path: path.display().to_string(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Sets a key and persists immediately.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ProfileError> {
        self.values.insert(key.into(), value.into());
        self.persist()
    }

    pub fn remove(&mut self, key: &str) -> Result<(), ProfileError> {
        if self.values.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), ProfileError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> ProfileStore {
        ProfileStore::load(dir.path().join("profiles.json")).unwrap()
    }

    #[test]
    fn missing_file_yields_default_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.active_name(), DEFAULT_PROFILE_NAME);
        assert_eq!(store.profiles().len(), 1);
        assert_eq!(store.active().filters, FilterSettings::default());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        let mut profile = Profile::new("work");
        profile.filters.repos = vec!["octo".to_string(), "-octo/archive".to_string()];
        profile.filters.statuses = [PrState::Open].into_iter().collect();
        store.upsert(profile.clone()).unwrap();
        store.set_active("work").unwrap();
        store.save().unwrap();

        let reloaded = ProfileStore::load(store.path()).unwrap();
        assert_eq!(reloaded.active_name(), "work");
        assert_eq!(reloaded.get("work"), Some(&profile));
        assert_eq!(reloaded.profiles().len(), 2);
    }

    #[test]
    fn upsert_replaces_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        let mut profile = Profile::new("work");
        profile.filters.limit = 10;
        store.upsert(profile).unwrap();

        let mut replacement = Profile::new("work");
        replacement.filters.limit = 99;
        store.upsert(replacement).unwrap();

        assert_eq!(store.profiles().len(), 2);
        assert_eq!(store.get("work").unwrap().filters.limit, 99);
    }

    #[test]
    fn upsert_rejects_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        assert!(matches!(
            store.upsert(Profile::new("  ")),
            Err(ProfileError::EmptyName)
        ));
    }

    #[test]
    fn removing_active_profile_reassigns_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.upsert(Profile::new("work")).unwrap();
        store.set_active("work").unwrap();

        store.remove("work").unwrap();
        assert_eq!(store.active_name(), DEFAULT_PROFILE_NAME);
    }

    #[test]
    fn removing_last_profile_recreates_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.remove(DEFAULT_PROFILE_NAME).unwrap();
        assert_eq!(store.profiles().len(), 1);
        assert_eq!(store.active_name(), DEFAULT_PROFILE_NAME);
    }

    #[test]
    fn rename_updates_active_pointer_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.upsert(Profile::new("work")).unwrap();

        store.rename(DEFAULT_PROFILE_NAME, "home").unwrap();
        assert_eq!(store.active_name(), "home");

        assert!(matches!(
            store.rename("home", "work"),
            Err(ProfileError::Duplicate(_))
        ));
        assert!(matches!(
            store.rename("missing", "x"),
            Err(ProfileError::NotFound(_))
        ));
    }

    #[test]
    fn corrupt_store_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ProfileStore::load(&path),
            Err(ProfileError::Decode { .. })
        ));
    }

    #[test]
    fn stale_active_pointer_falls_back_to_first_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(
            &path,
            r#"{"active":"gone","profiles":[{"name":"only","filters":{"statuses":["open"]}}]}"#,
        )
        .unwrap();
        let store = ProfileStore::load(&path).unwrap();
        assert_eq!(store.active_name(), "only");
    }

    #[test]
    fn preferences_persist_on_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = Preferences::load(&path).unwrap();
        assert_eq!(prefs.get("interval"), None);
        prefs.set("interval", "60").unwrap();

        let reloaded = Preferences::load(&path).unwrap();
        assert_eq!(reloaded.get("interval"), Some("60"));
    }

    #[test]
    fn preferences_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = Preferences::load(&path).unwrap();
        prefs.set("k", "v").unwrap();
        prefs.remove("k").unwrap();

        let reloaded = Preferences::load(&path).unwrap();
        assert_eq!(reloaded.get("k"), None);
    }

    #[test]
    fn hand_edited_profile_missing_statuses_still_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(
            &path,
            r#"{"active":"work","profiles":[{"name":"work","filters":{"repos":["octo"]}}]}"#,
        )
        .unwrap();
        let store = ProfileStore::load(&path).unwrap();
        let filters = &store.active().filters;
        assert_eq!(filters.statuses, default_statuses());
        assert_eq!(filters.repos, vec!["octo".to_string()]);
    }

    #[test]
    fn default_filter_settings_enable_open_and_draft() {
        let defaults = FilterSettings::default();
        assert!(defaults.statuses.contains(&PrState::Open));
        assert!(defaults.statuses.contains(&PrState::Draft));
        assert!(!defaults.statuses.contains(&PrState::Merged));
        assert_eq!(defaults.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn post_filters_always_include_status_filter() {
        let defaults = FilterSettings::default();
        assert_eq!(defaults.post_filters().len(), 1);

        let mut with_rules = FilterSettings::default();
        with_rules.authors = vec!["-dependabot".to_string()];
        with_rules.repos = vec!["octo".to_string()];
        assert_eq!(with_rules.post_filters().len(), 3);
    }
}
