//! Role definitions and their persistence.
//!
//! A role names the groups a token is scoped to, how long it lives, and
//! optionally a fixed username. Roles are stored as JSON at `role/<name>`.

use crate::{
    error::{ArtifactoryError, ArtifactoryResult},
    settings::parse_duration,
    storage::Storage,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, instrument};

const ROLE_PREFIX: &str = "role/";

/// Longest TTL a persisted lease can hold: `i64::MAX` nanoseconds.
pub const MAX_TTL: Duration = Duration::from_nanos(MAX_TTL_NANOS);

#[allow(clippy::unwrap_used)]
static ROLE_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w(?:[\w.-]*\w)?$").unwrap());

/// A stored role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    /// Fixed username; `None` means one is synthesized per issuance
    pub username: Option<String>,
    /// Groups the token is a member of, in the order written
    pub member_of_groups: Vec<String>,
    /// Token lifetime
    pub ttl: Duration,
}

impl Role {
    /// Scope string sent to Artifactory, e.g. `member-of-groups:"a,b"`.
    #[must_use]
    pub fn scope(&self) -> String {
        format!("member-of-groups:\"{}\"", self.member_of_groups.join(","))
    }

    /// TTL in whole seconds.
    #[must_use]
    pub const fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredRole {
    #[serde(default)]
    username: String,
    #[serde(default)]
    member_of_groups: Vec<String>,
    /// Nanoseconds
    #[serde(default)]
    lease: u64,
}

#[allow(clippy::cast_sign_loss)]
const MAX_TTL_NANOS: u64 = i64::MAX as u64;

impl From<&Role> for StoredRole {
    fn from(role: &Role) -> Self {
        Self {
            username: role.username.clone().unwrap_or_default(),
            member_of_groups: role.member_of_groups.clone(),
            lease: u64::try_from(role.ttl.as_nanos()).unwrap_or(MAX_TTL_NANOS),
        }
    }
}

impl From<StoredRole> for Role {
    fn from(stored: StoredRole) -> Self {
        Self {
            username: Some(stored.username).filter(|u| !u.is_empty()),
            member_of_groups: stored.member_of_groups,
            ttl: Duration::from_nanos(stored.lease),
        }
    }
}

/// Whether a write may create a new role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create, or merge into an existing role
    Create,
    /// Modify an existing role only
    Update,
}

/// A partial role write; unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleUpdate {
    /// Fixed username; an empty string clears it
    pub username: Option<String>,
    /// Replacement group list
    pub member_of_groups: Option<Vec<String>>,
    /// Replacement TTL; zero selects the default
    pub ttl: Option<Duration>,
}

impl RoleUpdate {
    /// Decode a role write from host-supplied fields.
    ///
    /// `member_of_groups` takes a list or a comma-separated string; `ttl`
    /// takes seconds as a number or string, or a duration such as `"10h"`.
    ///
    /// # Errors
    ///
    /// `InvalidRole` when a field has the wrong type or cannot be parsed.
    pub fn from_fields(fields: &Map<String, Value>) -> ArtifactoryResult<Self> {
        let username = match fields.get("username") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(_) => return Err(ArtifactoryError::invalid_role("username must be a string")),
        };

        let member_of_groups = match fields.get("member_of_groups") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => Some(Vec::new()),
            Some(Value::String(s)) => Some(s.split(',').map(str::to_string).collect()),
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        _ => Err(ArtifactoryError::invalid_role(
                            "member_of_groups must contain only strings",
                        )),
                    })
                    .collect::<ArtifactoryResult<Vec<_>>>()?,
            ),
            Some(_) => {
                return Err(ArtifactoryError::invalid_role(
                    "member_of_groups must be a list or a comma-separated string",
                ));
            }
        };

        let ttl = match fields.get("ttl") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .map(Duration::from_secs)
                    .ok_or_else(|| ArtifactoryError::invalid_role(format!("invalid ttl: {n}")))?,
            ),
            Some(Value::String(s)) => Some(
                parse_duration(s)
                    .ok_or_else(|| ArtifactoryError::invalid_role(format!("invalid ttl: {s:?}")))?,
            ),
            Some(_) => return Err(ArtifactoryError::invalid_role("ttl must be a duration")),
        };

        Ok(Self {
            username,
            member_of_groups: member_of_groups.map(|groups| {
                groups.into_iter().map(|g| g.trim().to_string()).collect()
            }),
            ttl,
        })
    }

    /// Set the group list.
    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.member_of_groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Set the TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set a fixed username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Role CRUD over host storage.
#[derive(Clone)]
pub struct RoleRegistry {
    storage: Arc<dyn Storage>,
    default_ttl: Duration,
}

impl fmt::Debug for RoleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleRegistry")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl RoleRegistry {
    /// Create a registry over `storage`; roles without a TTL get `default_ttl`,
    /// capped at [`MAX_TTL`].
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, default_ttl: Duration) -> Self {
        Self {
            storage,
            default_ttl: default_ttl.min(MAX_TTL),
        }
    }

    /// Apply `update` to the named role and persist the result.
    ///
    /// # Errors
    ///
    /// `InvalidRole` for a bad name, an empty or blank group list, or a TTL
    /// above [`MAX_TTL`], `RoleNotFound` when updating a role that does not
    /// exist, `Storage` when persistence fails.
    #[instrument(skip(self, update))]
    pub async fn put(&self, name: &str, update: RoleUpdate, mode: WriteMode) -> ArtifactoryResult<Role> {
        validate_name(name)?;

        let mut role = match (self.get(name).await?, mode) {
            (Some(role), _) => role,
            (None, WriteMode::Update) => return Err(ArtifactoryError::RoleNotFound(name.to_string())),
            (None, WriteMode::Create) => Role {
                username: None,
                member_of_groups: Vec::new(),
                ttl: self.default_ttl,
            },
        };

        if let Some(username) = update.username {
            role.username = Some(username).filter(|u| !u.is_empty());
        }
        if let Some(groups) = update.member_of_groups {
            role.member_of_groups = groups;
        }
        if role.member_of_groups.is_empty() {
            return Err(ArtifactoryError::invalid_role("member_of_groups cannot be empty"));
        }
        if role.member_of_groups.iter().any(|g| g.trim().is_empty()) {
            return Err(ArtifactoryError::invalid_role("member_of_groups cannot contain blank names"));
        }
        match update.ttl {
            Some(ttl) if ttl > MAX_TTL => {
                return Err(ArtifactoryError::invalid_role(format!(
                    "ttl {}s exceeds the maximum of {}s",
                    ttl.as_secs(),
                    MAX_TTL.as_secs()
                )));
            }
            Some(ttl) if ttl.is_zero() => role.ttl = self.default_ttl,
            Some(ttl) => role.ttl = ttl,
            None if mode == WriteMode::Create => role.ttl = self.default_ttl,
            None => {}
        }

        let encoded = serde_json::to_vec(&StoredRole::from(&role))?;
        self.storage.put(&role_key(name), encoded).await?;

        debug!(groups = role.member_of_groups.len(), ttl_secs = role.ttl_secs(), "Role written");
        Ok(role)
    }

    /// The named role, if it exists.
    ///
    /// # Errors
    ///
    /// `Storage` on read failure, `Decode` if the stored record is corrupt.
    pub async fn get(&self, name: &str) -> ArtifactoryResult<Option<Role>> {
        match self.storage.get(&role_key(name)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice::<StoredRole>(&raw)?.into())),
            None => Ok(None),
        }
    }

    /// Remove the named role; removing a missing role succeeds.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> ArtifactoryResult<()> {
        self.storage.delete(&role_key(name)).await?;
        debug!("Role deleted");
        Ok(())
    }

    /// All role names, sorted.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    pub async fn list(&self) -> ArtifactoryResult<Vec<String>> {
        let mut names = self.storage.list(ROLE_PREFIX).await?;
        names.sort();
        Ok(names)
    }
}

fn role_key(name: &str) -> String {
    format!("{ROLE_PREFIX}{name}")
}

fn validate_name(name: &str) -> ArtifactoryResult<()> {
    if name.is_empty() {
        return Err(ArtifactoryError::invalid_role("missing role name"));
    }
    if !ROLE_NAME.is_match(name) {
        return Err(ArtifactoryError::invalid_role(format!("invalid role name {name:?}")));
    }
    Ok(())
}
