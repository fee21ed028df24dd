//! Access control lists.
//!
//! An ACL maps subjects (the public wildcard, a user id, or a role) to a
//! subset of `{read, write}`. Absence of a subject means no access; there is
//! never an entry with an empty permission set.

use crate::codec::Encodable;
use crate::error::{Error, Result};
use crate::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of the public wildcard subject.
pub const PUBLIC_KEY: &str = "*";

/// Prefix of role subjects.
pub const ROLE_PREFIX: &str = "role:";

/// Kind of access being granted or checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(AccessKind::Read),
            "write" => Ok(AccessKind::Write),
            other => Err(Error::InvalidAcl(format!(
                "invalid permission type '{}'",
                other
            ))),
        }
    }
}

/// Whom a permission applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Everyone
    Public,
    /// A user, by object id
    User(String),
    /// A role, by name
    Role(String),
}

impl Subject {
    /// The wire key for this subject.
    pub fn key(&self) -> Result<String> {
        match self {
            Subject::Public => Ok(PUBLIC_KEY.to_string()),
            Subject::User(id) if id.is_empty() => {
                Err(Error::InvalidAcl("user id may not be empty".into()))
            }
            Subject::User(id) => Ok(id.clone()),
            Subject::Role(name) if name.is_empty() => {
                Err(Error::InvalidAcl("role name may not be empty".into()))
            }
            Subject::Role(name) => Ok(format!("{}{}", ROLE_PREFIX, name)),
        }
    }

    /// Parse a wire key back into a subject.
    pub fn from_key(key: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::InvalidAcl("subject may not be empty".into()));
        }
        if key == PUBLIC_KEY {
            return Ok(Subject::Public);
        }
        match key.strip_prefix(ROLE_PREFIX) {
            Some(name) => Ok(Subject::Role(name.to_string())),
            None => Ok(Subject::User(key.to_string())),
        }
    }

    /// The user subject for a saved user record.
    pub fn user(user: &Record) -> Result<Self> {
        Ok(Subject::User(user.to_pointer()?.require_id()?.to_string()))
    }
}

/// Permissions held by one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
}

impl Permissions {
    fn get(&self, kind: AccessKind) -> bool {
        match kind {
            AccessKind::Read => self.read,
            AccessKind::Write => self.write,
        }
    }

    fn set(&mut self, kind: AccessKind, allowed: bool) {
        match kind {
            AccessKind::Read => self.read = allowed,
            AccessKind::Write => self.write = allowed,
        }
    }

    fn is_empty(&self) -> bool {
        !self.read && !self.write
    }
}

/// A per-subject permission set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    permissions: BTreeMap<String, Permissions>,
}

impl Acl {
    /// An ACL granting nothing to anyone.
    pub fn new() -> Self {
        Self::default()
    }

    /// An ACL granting read and write access to a single saved user.
    pub fn for_user(user: &Record) -> Result<Self> {
        let subject = Subject::user(user)?;
        let mut acl = Self::new();
        acl.set_access(AccessKind::Read, &subject, true)?;
        acl.set_access(AccessKind::Write, &subject, true)?;
        Ok(acl)
    }

    /// Rebuild an ACL from its permission document.
    pub fn from_data(data: &serde_json::Value) -> Result<Self> {
        let subjects = data
            .as_object()
            .ok_or_else(|| Error::InvalidAcl("ACL document must be an object".into()))?;

        let mut acl = Self::new();
        for (key, permissions) in subjects {
            let subject = Subject::from_key(key)?;
            let permissions = permissions.as_object().ok_or_else(|| {
                Error::InvalidAcl(format!("permissions of '{}' must be an object", key))
            })?;
            for (kind, allowed) in permissions {
                let kind = AccessKind::parse(kind)?;
                let allowed = allowed.as_bool().ok_or_else(|| {
                    Error::InvalidAcl(format!("permission value of '{}' must be a boolean", key))
                })?;
                acl.set_access(kind, &subject, allowed)?;
            }
        }
        Ok(acl)
    }

    /// The permission document.
    ///
    /// An empty ACL is the empty object, never an empty array.
    pub fn to_data(&self) -> serde_json::Value {
        let map = self
            .permissions
            .iter()
            .map(|(key, permissions)| {
                let mut entry = serde_json::Map::new();
                if permissions.read {
                    entry.insert("read".into(), true.into());
                }
                if permissions.write {
                    entry.insert("write".into(), true.into());
                }
                (key.clone(), serde_json::Value::Object(entry))
            })
            .collect();
        serde_json::Value::Object(map)
    }

    /// The ACL as a record field value.
    pub fn to_value(&self) -> Value {
        Value::Map(
            self.permissions
                .iter()
                .map(|(key, permissions)| {
                    let mut entry = BTreeMap::new();
                    if permissions.read {
                        entry.insert("read".to_string(), Value::Bool(true));
                    }
                    if permissions.write {
                        entry.insert("write".to_string(), Value::Bool(true));
                    }
                    (key.clone(), Value::Map(entry))
                })
                .collect(),
        )
    }

    /// Read an ACL back out of a record field value.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::from_data(&crate::codec::encode(value)?)
    }

    /// Grant or revoke one kind of access for a subject.
    ///
    /// Revoking from an unknown subject is a no-op, and a subject whose last
    /// permission is revoked is removed entirely.
    pub fn set_access(&mut self, kind: AccessKind, subject: &Subject, allowed: bool) -> Result<()> {
        let key = subject.key()?;
        self.set_key(key, kind, allowed);
        Ok(())
    }

    /// Whether a subject has one kind of access. Unknown subjects have none.
    pub fn access(&self, kind: AccessKind, subject: &Subject) -> bool {
        subject
            .key()
            .ok()
            .and_then(|key| self.permissions.get(&key))
            .map(|permissions| permissions.get(kind))
            .unwrap_or(false)
    }

    pub fn set_read_access(&mut self, subject: &Subject, allowed: bool) -> Result<()> {
        self.set_access(AccessKind::Read, subject, allowed)
    }

    pub fn set_write_access(&mut self, subject: &Subject, allowed: bool) -> Result<()> {
        self.set_access(AccessKind::Write, subject, allowed)
    }

    pub fn read_access(&self, subject: &Subject) -> bool {
        self.access(AccessKind::Read, subject)
    }

    pub fn write_access(&self, subject: &Subject) -> bool {
        self.access(AccessKind::Write, subject)
    }

    pub fn set_public_read_access(&mut self, allowed: bool) {
        self.set_public(AccessKind::Read, allowed);
    }

    pub fn set_public_write_access(&mut self, allowed: bool) {
        self.set_public(AccessKind::Write, allowed);
    }

    pub fn public_read_access(&self) -> bool {
        self.access(AccessKind::Read, &Subject::Public)
    }

    pub fn public_write_access(&self) -> bool {
        self.access(AccessKind::Write, &Subject::Public)
    }

    pub fn set_role_read_access(&mut self, role: &str, allowed: bool) -> Result<()> {
        self.set_access(AccessKind::Read, &Subject::Role(role.to_string()), allowed)
    }

    pub fn set_role_write_access(&mut self, role: &str, allowed: bool) -> Result<()> {
        self.set_access(AccessKind::Write, &Subject::Role(role.to_string()), allowed)
    }

    pub fn role_read_access(&self, role: &str) -> bool {
        self.access(AccessKind::Read, &Subject::Role(role.to_string()))
    }

    pub fn role_write_access(&self, role: &str) -> bool {
        self.access(AccessKind::Write, &Subject::Role(role.to_string()))
    }

    /// Subjects with at least one permission, by wire key.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.permissions.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    fn set_public(&mut self, kind: AccessKind, allowed: bool) {
        self.set_key(PUBLIC_KEY.to_string(), kind, allowed);
    }

    fn set_key(&mut self, key: String, kind: AccessKind, allowed: bool) {
        if allowed {
            self.permissions.entry(key).or_default().set(kind, true);
        } else if let Some(permissions) = self.permissions.get_mut(&key) {
            permissions.set(kind, false);
            if permissions.is_empty() {
                self.permissions.remove(&key);
            }
        }
    }
}

impl Encodable for Acl {
    fn encode(&self) -> Result<serde_json::Value> {
        Ok(self.to_data())
    }
}
