//! Wire types exchanged with the Auth API.
//!
//! Field names follow the server's JSON (`permissoes`, `currentfuncao`).

use gatehouse_auth::{MenuTree, PermissionTable, PermissionTableError, User};
use gatehouse_core::ProfileId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sign-in credentials.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `POST` authenticate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub authorization: AuthorizationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationToken {
    pub token: String,
}

/// Who-am-I / change-profile response.
///
/// `permissoes` stays raw until [`ProfileSnapshot::validate`] turns it into a
/// [`PermissionTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub user: User,

    #[serde(default)]
    pub menus: MenuTree,

    #[serde(default)]
    pub permissoes: Value,

    #[serde(default)]
    pub currentfuncao: Option<ProfileId>,
}

/// A snapshot whose permission table passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedProfile {
    pub user: User,
    pub menu: MenuTree,
    pub permissions: PermissionTable,
    pub active_function: Option<ProfileId>,
}

impl ProfileSnapshot {
    pub fn validate(self) -> Result<ValidatedProfile, PermissionTableError> {
        let permissions = PermissionTable::from_wire(&self.permissoes)?;
        Ok(ValidatedProfile {
            user: self.user,
            menu: self.menus,
            permissions,
            active_function: self.currentfuncao,
        })
    }
}

/// `POST` refresh response. `exp` is epoch seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub exp: Option<i64>,
}
