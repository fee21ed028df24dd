//! Session identity and its persistence.
//!
//! There is no process-wide "current user". Operations that need identity
//! take a [`SessionContext`], and whatever should outlive the process goes
//! through a [`SessionStorage`] chosen by the caller.

use crate::error::{Error, Result};
use crate::transport::{Method, Request, Transport};
use crate::Record;
use std::collections::HashMap;
use tracing::{debug, info};

/// Storage key holding the signed-in user's document.
pub const CURRENT_USER_KEY: &str = "currentUser";

/// Class name of user records.
pub const USER_CLASS: &str = "user";

const PASSWORD_FIELD: &str = "password";

/// Identity attached to outgoing requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    session_token: Option<String>,
}

impl SessionContext {
    /// A context without a signed-in user.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
        }
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_token.is_some()
    }
}

/// Key-value persistence for session state.
pub trait SessionStorage {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory storage; state lasts as long as the value.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, serde_json::Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// The signed-in user, persisted through a [`SessionStorage`].
#[derive(Debug)]
pub struct CurrentUser<S> {
    storage: S,
}

impl<S: SessionStorage> CurrentUser<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Sign in with a user name and password.
    ///
    /// The returned record is fully fetched and the context carries the new
    /// session token.
    pub fn log_in<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        user_name: &str,
        password: &str,
    ) -> Result<(Record, SessionContext)> {
        let request = Request::new(Method::Get, "login").with_query(vec![
            ("userName".to_string(), user_name.to_string()),
            ("password".to_string(), password.to_string()),
        ]);
        let response = transport.send(&request)?;
        let user = Record::from_server(USER_CLASS, &response, true)?;
        let context = self.remember(&user)?;
        info!(user_name, object_id = ?user.object_id(), "logged in");
        Ok((user, context))
    }

    /// Create a new user and sign in as it.
    pub fn sign_up<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        user: &mut Record,
    ) -> Result<SessionContext> {
        if user.class_name() != USER_CLASS {
            return Err(Error::ClassMismatch {
                expected: USER_CLASS.to_string(),
                actual: user.class_name().to_string(),
            });
        }
        if let Some(object_id) = user.object_id() {
            return Err(Error::ObjectIdAlreadySet(object_id.to_string()));
        }
        user.save(transport, &SessionContext::anonymous())?;
        let context = self.remember(user)?;
        info!(object_id = ?user.object_id(), "signed up");
        Ok(context)
    }

    /// Restore the stored user, if any.
    pub fn current(&self) -> Result<Option<(Record, SessionContext)>> {
        let Some(document) = self.storage.get(CURRENT_USER_KEY)? else {
            return Ok(None);
        };
        let user = Record::from_server(USER_CLASS, &document, true)?;
        let context = match user.session_token() {
            Some(token) => SessionContext::with_token(token),
            None => SessionContext::anonymous(),
        };
        Ok(Some((user, context)))
    }

    /// Forget the stored user.
    pub fn log_out(&mut self) -> Result<()> {
        debug!("clearing current user");
        self.storage.remove(CURRENT_USER_KEY)
    }

    fn remember(&mut self, user: &Record) -> Result<SessionContext> {
        let token = user
            .session_token()
            .ok_or_else(|| Error::InvalidResponse("response carries no sessionToken".into()))?;
        let mut document = user.server_document()?;
        if let Some(fields) = document.as_object_mut() {
            fields.remove(PASSWORD_FIELD);
        }
        self.storage.set(CURRENT_USER_KEY, document)?;
        Ok(SessionContext::with_token(token))
    }
}
