//! Monitoring tasks and the platforms they watch.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Upper bound on keyword length, matching the `monitoring_tasks.keyword` column.
pub const MAX_KEYWORD_LEN: usize = 255;

/// A content platform a task can be collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Weibo,
    Zhihu,
    Reddit,
    Youtube,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Twitter,
        Platform::Weibo,
        Platform::Zhihu,
        Platform::Reddit,
        Platform::Youtube,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Weibo => "weibo",
            Platform::Zhihu => "zhihu",
            Platform::Reddit => "reddit",
            Platform::Youtube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CoreError::InvalidPlatform(s.to_string()))
    }
}

/// A non-empty, duplicate-free, order-preserving set of platforms.
///
/// Duplicates are dropped keeping the first occurrence, so the collection
/// order a user chose is the order runs are started in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Platform>", into = "Vec<Platform>")]
pub struct PlatformSet(Vec<Platform>);

impl PlatformSet {
    /// Builds a set from already-typed platforms.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyPlatforms`] if `platforms` is empty.
    pub fn new(platforms: impl IntoIterator<Item = Platform>) -> Result<Self, CoreError> {
        let mut out: Vec<Platform> = Vec::new();
        for p in platforms {
            if !out.contains(&p) {
                out.push(p);
            }
        }
        if out.is_empty() {
            return Err(CoreError::EmptyPlatforms);
        }
        Ok(Self(out))
    }

    /// Parses platform identifiers as stored in the database or sent by clients.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPlatform`] for an unknown identifier, or
    /// [`CoreError::EmptyPlatforms`] if nothing was given.
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, CoreError> {
        let parsed = raw
            .iter()
            .map(|s| s.as_ref().trim().parse::<Platform>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parsed)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Platform] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Platform> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn contains(&self, platform: Platform) -> bool {
        self.0.contains(&platform)
    }

    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl TryFrom<Vec<Platform>> for PlatformSet {
    type Error = CoreError;

    fn try_from(value: Vec<Platform>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlatformSet> for Vec<Platform> {
    fn from(value: PlatformSet) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "paused" => Ok(TaskStatus::Paused),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(CoreError::InvalidTaskStatus(other.to_string())),
        }
    }
}

/// A user's standing request to monitor a keyword across platforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub keyword: String,
    pub description: Option<String>,
    pub platforms: PlatformSet,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for creating a task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub user_id: i64,
    pub keyword: String,
    pub description: Option<String>,
    pub platforms: PlatformSet,
}

impl NewTask {
    /// Validates and normalises task input.
    ///
    /// The keyword is trimmed; an empty description is stored as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKeyword`] when the keyword is blank or
    /// longer than [`MAX_KEYWORD_LEN`] characters.
    pub fn new(
        user_id: i64,
        keyword: &str,
        description: Option<&str>,
        platforms: PlatformSet,
    ) -> Result<Self, CoreError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(CoreError::InvalidKeyword("keyword is empty".to_string()));
        }
        if keyword.chars().count() > MAX_KEYWORD_LEN {
            return Err(CoreError::InvalidKeyword(format!(
                "keyword exceeds {MAX_KEYWORD_LEN} characters"
            )));
        }
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(ToOwned::to_owned);

        Ok(Self {
            user_id,
            keyword: keyword.to_string(),
            description,
            platforms,
        })
    }
}
