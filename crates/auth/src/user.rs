use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use gatehouse_core::UserId;

/// The signed-in user as returned by who-am-I.
///
/// Only the identifier is interpreted; every other field is carried through
/// for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    #[serde(default, alias = "nome")]
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}
