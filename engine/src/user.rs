//! Typed helpers for the built-in `user` and `role` classes.

use crate::error::{Error, Result};
use crate::session::USER_CLASS;
use crate::{Acl, Record, Value};

/// Class name of role records.
pub const ROLE_CLASS: &str = "role";

/// Class name of installation records.
pub const INSTALLATION_CLASS: &str = "installation";

const USER_NAME_FIELD: &str = "userName";
const PASSWORD_FIELD: &str = "password";
const MAIL_ADDRESS_FIELD: &str = "mailAddress";
const ROLE_NAME_FIELD: &str = "roleName";

impl Record {
    /// A new, unsaved user.
    pub fn user() -> Self {
        Self::new(USER_CLASS)
    }

    /// A new, unsaved installation.
    pub fn installation() -> Self {
        Self::new(INSTALLATION_CLASS)
    }

    /// A new, unsaved role with an optional ACL.
    pub fn role(name: &str, acl: Option<&Acl>) -> Result<Self> {
        let mut role = Self::new(ROLE_CLASS);
        role.set_role_name(name)?;
        if let Some(acl) = acl {
            role.set_acl(acl)?;
        }
        Ok(role)
    }

    pub fn role_name(&self) -> Result<Option<&str>> {
        self.string_field(ROLE_NAME_FIELD)
    }

    /// Name a role. Only allowed before the role is saved.
    pub fn set_role_name(&mut self, name: &str) -> Result<()> {
        if self.object_id().is_some() {
            return Err(Error::RoleAlreadySaved);
        }
        self.set(ROLE_NAME_FIELD, name)
    }

    pub fn user_name(&self) -> Result<Option<&str>> {
        self.string_field(USER_NAME_FIELD)
    }

    pub fn set_user_name(&mut self, user_name: &str) -> Result<()> {
        self.set(USER_NAME_FIELD, user_name)
    }

    pub fn set_password(&mut self, password: &str) -> Result<()> {
        self.set(PASSWORD_FIELD, password)
    }

    pub fn mail_address(&self) -> Result<Option<&str>> {
        self.string_field(MAIL_ADDRESS_FIELD)
    }

    pub fn set_mail_address(&mut self, mail_address: &str) -> Result<()> {
        self.set(MAIL_ADDRESS_FIELD, mail_address)
    }

    /// Whether this user carries a session token.
    pub fn is_authenticated(&self) -> bool {
        self.session_token().is_some()
    }

    fn string_field(&self, key: &str) -> Result<Option<&str>> {
        Ok(self.get(key)?.and_then(Value::as_str))
    }
}
