//! Task filtering by state class, hash set, category and tag
//!
//! Categories and tags are owned by the host application. The filter looks them up
//! through a [`LabelLookup`] passed in at match time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::task::TaskSnapshot;
use crate::types::TaskId;

/// State predicate of a filter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    /// Every task
    #[default]
    All,
    /// Still fetching data
    Downloading,
    /// Completed swarm task still shared
    Seeding,
    /// All bytes present
    Completed,
    /// Paused by the user
    Paused,
    /// Not paused
    Resumed,
    /// Moving data; never matches segmented tasks
    Active,
    /// Not moving data
    Inactive,
    /// Swarm task with no traffic
    Stalled,
    /// Swarm task seeding with no outgoing data
    StalledUploading,
    /// Swarm task downloading with no incoming data
    StalledDownloading,
    /// Stopped by an engine error
    Errored,
}

impl StateClass {
    /// Parse a filter name; unknown names select every task
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "downloading" => StateClass::Downloading,
            "seeding" => StateClass::Seeding,
            "completed" => StateClass::Completed,
            "paused" => StateClass::Paused,
            "resumed" => StateClass::Resumed,
            "active" => StateClass::Active,
            "inactive" => StateClass::Inactive,
            "stalled" => StateClass::Stalled,
            "stalled_uploading" => StateClass::StalledUploading,
            "stalled_downloading" => StateClass::StalledDownloading,
            "errored" => StateClass::Errored,
            _ => StateClass::All,
        }
    }

    /// Whether `task` is in this class
    pub fn matches(&self, task: &TaskSnapshot) -> bool {
        match self {
            StateClass::All => true,
            StateClass::Downloading => task.is_downloading(),
            StateClass::Seeding => task.is_seeding(),
            StateClass::Completed => task.is_completed(),
            StateClass::Paused => task.is_paused(),
            StateClass::Resumed => !task.is_paused(),
            // Segmented "active" means "not paused", which is not what this class asks
            StateClass::Active => {
                task.backend() == crate::types::BackendKind::Swarm && task.is_active()
            }
            StateClass::Inactive => task.is_inactive(),
            StateClass::Stalled => task.is_stalled_uploading() || task.is_stalled_downloading(),
            StateClass::StalledUploading => task.is_stalled_uploading(),
            StateClass::StalledDownloading => task.is_stalled_downloading(),
            StateClass::Errored => task.is_errored(),
        }
    }
}

/// Hash restriction of a filter
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashFilter {
    /// Every hash
    #[default]
    Any,
    /// Only these external reference strings (compared case-insensitively)
    Only(HashSet<String>),
}

impl HashFilter {
    /// Restrict to the given reference strings
    pub fn only<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        HashFilter::Only(
            hashes
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
        )
    }

    fn matches(&self, task: &TaskSnapshot) -> bool {
        match self {
            HashFilter::Any => true,
            HashFilter::Only(set) => set.contains(&task.hash.to_ascii_lowercase()),
        }
    }
}

/// Category and tag data owned outside the session
pub trait LabelLookup {
    /// Category of `id`; empty when uncategorized
    fn category(&self, id: &TaskId) -> String;

    /// Tags of `id`
    fn tags(&self, id: &TaskId) -> BTreeSet<String>;
}

/// Lookup for hosts without labels: every task uncategorized and untagged
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLabels;

impl LabelLookup for NoLabels {
    fn category(&self, _id: &TaskId) -> String {
        String::new()
    }

    fn tags(&self, _id: &TaskId) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Map-backed [`LabelLookup`]
#[derive(Clone, Debug, Default)]
pub struct InMemoryLabels {
    categories: HashMap<TaskId, String>,
    tags: HashMap<TaskId, BTreeSet<String>>,
}

impl InMemoryLabels {
    /// Empty label store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the category of `id`; empty clears it
    pub fn set_category(&mut self, id: TaskId, category: impl Into<String>) {
        let category = category.into();
        if category.is_empty() {
            self.categories.remove(&id);
        } else {
            self.categories.insert(id, category);
        }
    }

    /// Add a tag to `id`
    pub fn add_tag(&mut self, id: TaskId, tag: impl Into<String>) {
        self.tags.entry(id).or_default().insert(tag.into());
    }

    /// Remove a tag from `id`
    pub fn remove_tag(&mut self, id: &TaskId, tag: &str) {
        if let Some(tags) = self.tags.get_mut(id) {
            tags.remove(tag);
        }
    }

    /// Forget every label of `id`
    pub fn forget(&mut self, id: &TaskId) {
        self.categories.remove(id);
        self.tags.remove(id);
    }
}

impl LabelLookup for InMemoryLabels {
    fn category(&self, id: &TaskId) -> String {
        self.categories.get(id).cloned().unwrap_or_default()
    }

    fn tags(&self, id: &TaskId) -> BTreeSet<String> {
        self.tags.get(id).cloned().unwrap_or_default()
    }
}

/// Predicate over task snapshots
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    /// State predicate
    pub state: StateClass,
    /// Hash restriction
    pub hashes: HashFilter,
    /// `None` matches every category; `Some("")` only uncategorized tasks
    pub category: Option<String>,
    /// `None` matches every tag; `Some("")` only untagged tasks
    pub tag: Option<String>,
    /// A category also matches its `category/...` subcategories
    pub subcategories: bool,
}

impl TaskFilter {
    /// Filter matching every task
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter on a named state class
    pub fn by_name(name: &str) -> Self {
        Self {
            state: StateClass::from_name(name),
            ..Self::default()
        }
    }

    /// Restrict to a state class
    pub fn with_state(mut self, state: StateClass) -> Self {
        self.state = state;
        self
    }

    /// Restrict to a hash set
    pub fn with_hashes(mut self, hashes: HashFilter) -> Self {
        self.hashes = hashes;
        self
    }

    /// Restrict to a category
    pub fn with_category(mut self, category: impl Into<String>, subcategories: bool) -> Self {
        self.category = Some(category.into());
        self.subcategories = subcategories;
        self
    }

    /// Restrict to a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Whether `task` passes every predicate
    pub fn matches(&self, task: &TaskSnapshot, labels: &dyn LabelLookup) -> bool {
        self.state.matches(task)
            && self.hashes.matches(task)
            && self.matches_category(task, labels)
            && self.matches_tag(task, labels)
    }

    fn matches_category(&self, task: &TaskSnapshot, labels: &dyn LabelLookup) -> bool {
        let Some(wanted) = &self.category else {
            return true;
        };
        let actual = labels.category(&task.id);
        if wanted.is_empty() {
            return actual.is_empty();
        }
        actual == *wanted
            || (self.subcategories
                && actual
                    .strip_prefix(wanted.as_str())
                    .is_some_and(|rest| rest.starts_with('/')))
    }

    fn matches_tag(&self, task: &TaskSnapshot, labels: &dyn LabelLookup) -> bool {
        let Some(wanted) = &self.tag else {
            return true;
        };
        let tags = labels.tags(&task.id);
        if wanted.is_empty() {
            return tags.is_empty();
        }
        tags.contains(wanted)
    }
}
