use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier carried in JWT claims.
///
/// Roles are intentionally opaque strings at this layer; which roles unlock
/// which operations is decided in [`crate::authorize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Desk staff role. Permitted to renew loans.
    pub fn librarian() -> Self {
        Self(Cow::Borrowed("librarian"))
    }

    /// Administrative role. Superset of librarian for circulation purposes.
    pub fn admin() -> Self {
        Self(Cow::Borrowed("admin"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
