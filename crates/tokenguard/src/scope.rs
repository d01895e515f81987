//! Required-scope enforcement

use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};
use crate::identity::GrantedIdentity;

/// Allow iff every required scope is granted.
///
/// An empty requirement always allows. Extra granted scopes are fine; this
/// is a superset check, not an exact match.
///
/// # Errors
///
/// Returns `MissingScope` naming the scopes that were not granted.
pub fn check_scopes<S: AsRef<str>>(identity: &GrantedIdentity, required: &[S]) -> AuthResult<()> {
    let missing: Vec<&str> = required
        .iter()
        .map(AsRef::as_ref)
        .filter(|scope| !identity.has_scope(scope))
        .collect();

    if missing.is_empty() {
        debug!(required = required.len(), "Scope check passed");
        return Ok(());
    }

    warn!(
        subject = ?identity.subject(),
        missing = ?missing,
        "Token lacks required scopes"
    );
    Err(AuthError::missing_scope(format!(
        "missing required scope(s): {}",
        missing.join(" ")
    )))
}

/// Scopes a resource requires, checked after authentication succeeds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeRequirement {
    required: Vec<String>,
}

impl ScopeRequirement {
    /// Require the given scopes
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut required: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.into();
            if !scope.is_empty() && !required.contains(&scope) {
                required.push(scope);
            }
        }
        Self { required }
    }

    /// No requirement
    pub fn none() -> Self {
        Self::default()
    }

    /// Required scopes
    pub fn scopes(&self) -> &[String] {
        &self.required
    }

    /// Whether nothing is required
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    /// Check an identity against this requirement
    ///
    /// # Errors
    ///
    /// Returns `MissingScope` if any required scope is not granted.
    pub fn check(&self, identity: &GrantedIdentity) -> AuthResult<()> {
        check_scopes(identity, &self.required)
    }
}
