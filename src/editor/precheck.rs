//! Duplicate precheck, run before the first write of a session.

use std::fmt;

use crate::api::{FactorSearch, find_by_key};
use crate::model::{ChangeType, FactorForm, Scope};

/// A record that already owns the form's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateFinding {
    pub existing_id: i64,
    pub scope: Scope,
    pub change_type: ChangeType,
    /// The offending key fields, ready for display.
    pub key_description: String,
}

impl fmt::Display for DuplicateFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A {} factor for {} already exists in {} (record {}).",
            self.change_type.label(),
            self.key_description,
            self.scope.label(),
            self.existing_id
        )
    }
}

/// Scopes the precheck searches for a form.
///
/// Soil edits are exempt since their key fields are locked. Vegetation
/// creates also look at the sibling scope.
pub fn scopes_to_check(form: &FactorForm, creating: bool) -> Vec<Scope> {
    match (form.change_type(), creating) {
        (ChangeType::Soil, false) => Vec::new(),
        (ChangeType::Vegetation, true) => vec![form.scope, form.scope.sibling()],
        _ => vec![form.scope],
    }
}

/// Search for another record carrying the form's key.
///
/// Best-effort: a failed search is logged and treated as "no duplicate" for
/// that scope.
pub async fn find_duplicate<A>(
    api: &A,
    form: &FactorForm,
    creating: bool,
    exclude: &[i64],
    page_size: u32,
) -> Option<DuplicateFinding>
where
    A: FactorSearch + ?Sized,
{
    let key = form.key();
    for scope in scopes_to_check(form, creating) {
        match find_by_key(api, &key, scope, exclude, page_size).await {
            Ok(Some(existing)) => {
                tracing::debug!(id = existing.id, scope = %scope, "Precheck found duplicate key");
                return Some(DuplicateFinding {
                    existing_id: existing.id,
                    scope,
                    change_type: form.change_type(),
                    key_description: key.describe(),
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Duplicate precheck search failed for {}: {}", scope, e);
            }
        }
    }
    None
}
