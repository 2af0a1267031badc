//! `gatehouse-auth`: pure access-control model for the admin console.
//!
//! This crate is intentionally decoupled from HTTP, storage and timers: it
//! validates what the Auth API hands back and answers permission questions
//! against it.

pub mod authorize;
pub mod claims;
pub mod menu;
pub mod path;
pub mod permissions;
pub mod resolve;
pub mod session;
pub mod table;
pub mod user;

pub use authorize::{AuthorizationExplanation, AuthzError, authorize, explain_authorization};
pub use claims::{TokenClaims, peek_claims};
pub use menu::{MenuNode, MenuTree};
pub use path::{normalize_path, segment_count};
pub use permissions::{Action, PermissionRecord};
pub use resolve::{resolve, resolve_for};
pub use session::{Session, SessionValidationError, validate_session};
pub use table::{PermissionTable, PermissionTableError};
pub use user::User;
