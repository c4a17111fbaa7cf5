//! Conflict classification and failure-triggered recovery.
//!
//! A failed write is classified into a [`ConflictCause`] by a single lookup
//! against the tables below. Each cause owns one guard in
//! [`ConflictAttemptState`]; a guard is armed before any network call and is
//! never cleared while the editor stays open, which bounds recovery to at
//! most one locate and one corrective update per cause.

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;

use crate::api::{FactorApi, find_by_key};
use crate::editor::session::CloseSignal;
use crate::error::ApiError;
use crate::model::{ChangeType, FactorRecord, ReplicatedKey, Scope};

/// Backend codes meaning "this key already exists".
pub const DUPLICATE_CODES: &[&str] = &[
    "RN008_DUPLICIDADE",
    "RN009_CHAVE_DUPLICADA",
    "DUPLICATE_KEY",
];

/// Backend codes meaning "this change type already has a record in this scope".
pub const SCOPE_UNIQUENESS_CODES: &[&str] = &["RN007_ESCOPO_DUPLICADO"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Duplicate,
    ScopeUniqueness,
}

/// Unique-index names the backend leaks into error messages.
pub const CONSTRAINTS: &[(&str, ConstraintKind)] = &[
    ("uk_mut_solo_chave", ConstraintKind::Duplicate),
    ("uk_mut_desmatamento_chave", ConstraintKind::Duplicate),
    ("uk_mut_vegetacao_chave", ConstraintKind::Duplicate),
    ("uk_mut_fator_tipo_escopo", ConstraintKind::ScopeUniqueness),
];

static CONSTRAINT_MATCHER: LazyLock<Option<AhoCorasick>> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(CONSTRAINTS.iter().map(|(name, _)| *name))
        .ok()
});

/// First known constraint name mentioned in `message`.
pub fn constraint_in(message: &str) -> Option<(&'static str, ConstraintKind)> {
    let matcher = CONSTRAINT_MATCHER.as_ref()?;
    let found = matcher.find(message)?;
    CONSTRAINTS.get(found.pattern().as_usize()).copied()
}

/// Why a write failed, as far as recovery is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCause {
    /// The backend named the record that owns the key.
    DuplicateWithId(i64),
    /// No id, but the message names a known unique index.
    DuplicateByConstraintName(&'static str),
    /// A duplicate with neither id nor constraint name.
    DuplicateGeneric,
    /// One record per change type and scope.
    ScopeUniqueness,
    Unclassified,
}

/// The one-shot guards, one per recoverable cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    UpdateById,
    UpdateByConstraint,
    UpdateByKeyScan,
    ScopeUniquenessNotice,
}

impl ConflictCause {
    pub fn guard(&self) -> Option<Guard> {
        match self {
            Self::DuplicateWithId(_) => Some(Guard::UpdateById),
            Self::DuplicateByConstraintName(_) => Some(Guard::UpdateByConstraint),
            Self::DuplicateGeneric => Some(Guard::UpdateByKeyScan),
            Self::ScopeUniqueness => Some(Guard::ScopeUniquenessNotice),
            Self::Unclassified => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::DuplicateWithId(_) | Self::DuplicateByConstraintName(_) | Self::DuplicateGeneric
        )
    }
}

/// Knobs for [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyPolicy {
    /// The deforestation service masks constraint violations as 500s.
    pub deforestation_server_error_is_duplicate: bool,
}

impl Default for ClassifyPolicy {
    fn default() -> Self {
        Self {
            deforestation_server_error_is_duplicate: true,
        }
    }
}

/// Classify a failed write.
pub fn classify(err: &ApiError, change_type: ChangeType, policy: ClassifyPolicy) -> ConflictCause {
    let ApiError::Rejected(body) = err else {
        return ConflictCause::Unclassified;
    };

    let code = body
        .code
        .as_deref()
        .map(|c| c.trim().to_ascii_uppercase())
        .unwrap_or_default();
    let constraint = body.message.as_deref().and_then(constraint_in);

    if SCOPE_UNIQUENESS_CODES.contains(&code.as_str())
        || matches!(constraint, Some((_, ConstraintKind::ScopeUniqueness)))
    {
        return ConflictCause::ScopeUniqueness;
    }

    let duplicate_constraint = match constraint {
        Some((name, ConstraintKind::Duplicate)) => Some(name),
        _ => None,
    };
    let is_duplicate = duplicate_constraint.is_some()
        || match body.status {
            409 => code.is_empty() || DUPLICATE_CODES.contains(&code.as_str()),
            400 | 422 => DUPLICATE_CODES.contains(&code.as_str()),
            500 => {
                change_type == ChangeType::Deforestation
                    && policy.deforestation_server_error_is_duplicate
            }
            _ => false,
        };
    if !is_duplicate {
        return ConflictCause::Unclassified;
    }

    if let Some(id) = body.existing_id.filter(|id| *id > 0) {
        ConflictCause::DuplicateWithId(id)
    } else if let Some(name) = duplicate_constraint {
        ConflictCause::DuplicateByConstraintName(name)
    } else {
        ConflictCause::DuplicateGeneric
    }
}

/// Guard flags for one open editor. Flags are never cleared; reopening the
/// editor starts from a new state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictAttemptState {
    update_by_id: bool,
    update_by_constraint: bool,
    update_by_key_scan: bool,
    scope_uniqueness_notice: bool,
}

impl ConflictAttemptState {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&mut self, guard: Guard) -> &mut bool {
        match guard {
            Guard::UpdateById => &mut self.update_by_id,
            Guard::UpdateByConstraint => &mut self.update_by_constraint,
            Guard::UpdateByKeyScan => &mut self.update_by_key_scan,
            Guard::ScopeUniquenessNotice => &mut self.scope_uniqueness_notice,
        }
    }

    /// Arm `guard`. Returns `false` when it was already armed.
    pub fn try_arm(&mut self, guard: Guard) -> bool {
        let flag = self.flag(guard);
        if *flag {
            return false;
        }
        *flag = true;
        true
    }

    pub fn is_armed(&self, guard: Guard) -> bool {
        match guard {
            Guard::UpdateById => self.update_by_id,
            Guard::UpdateByConstraint => self.update_by_constraint,
            Guard::UpdateByKeyScan => self.update_by_key_scan,
            Guard::ScopeUniquenessNotice => self.scope_uniqueness_notice,
        }
    }
}

/// What recovery decided after a failed write.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Owner found; issue one corrective update against it.
    Corrective {
        cause: ConflictCause,
        target: FactorRecord,
    },
    /// A duplicate whose owner could not be found.
    NotLocated { cause: ConflictCause },
    /// This cause was already tried in this editor.
    Abandoned { cause: ConflictCause },
    /// First scope-uniqueness rejection. `occupied` already holds a record of
    /// this change type; `replaced` is the record the failed update targeted,
    /// `None` when the failed write was a create.
    ScopeUniqueness {
        occupied: Scope,
        replaced: Option<i64>,
    },
    Unclassified,
    /// The locate call itself failed.
    LocateFailed(ApiError),
    /// The editor closed while recovery was in flight.
    Discarded,
}

/// Where the failed write was aimed, and what to leave out of the search.
#[derive(Debug, Clone)]
pub struct ConflictContext<'a> {
    pub change_type: ChangeType,
    pub key: &'a ReplicatedKey,
    pub scope: Scope,
    /// The stored record the failed write replaced, if it was an update.
    pub replaced: Option<&'a FactorRecord>,
    /// Ids owned by the editor itself; never a conflict owner.
    pub exclude: &'a [i64],
}

/// Locates the true owner of a conflicting key.
pub struct ConflictResolver<'a, A: ?Sized> {
    api: &'a A,
    close: &'a CloseSignal,
    policy: ClassifyPolicy,
    page_size: u32,
}

impl<'a, A> ConflictResolver<'a, A>
where
    A: FactorApi + ?Sized,
{
    pub fn new(api: &'a A, close: &'a CloseSignal, policy: ClassifyPolicy, page_size: u32) -> Self {
        Self {
            api,
            close,
            policy,
            page_size,
        }
    }

    /// Classify `err`, arm its guard and locate the owner.
    pub async fn resolve(
        &self,
        err: &ApiError,
        ctx: &ConflictContext<'_>,
        guards: &mut ConflictAttemptState,
    ) -> Resolution {
        let cause = classify(err, ctx.change_type, self.policy);
        tracing::debug!(?cause, "Classified write failure: {}", err);

        let Some(guard) = cause.guard() else {
            return Resolution::Unclassified;
        };
        if !guards.try_arm(guard) {
            tracing::debug!(?guard, "Recovery guard already armed, abandoning");
            return Resolution::Abandoned { cause };
        }
        if cause == ConflictCause::ScopeUniqueness {
            return Resolution::ScopeUniqueness {
                occupied: ctx.replaced.map_or(ctx.scope, |r| r.scope),
                replaced: ctx.replaced.map(|r| r.id),
            };
        }

        let located = match &cause {
            ConflictCause::DuplicateWithId(id) => self.fetch(*id).await,
            _ => self.scan(ctx).await,
        };
        if self.close.is_closed() {
            tracing::debug!("Editor closed during recovery, discarding result");
            return Resolution::Discarded;
        }

        match located {
            Ok(Some(target)) => {
                tracing::debug!(id = target.id, scope = %target.scope, "Located conflicting record");
                Resolution::Corrective { cause, target }
            }
            Ok(None) => Resolution::NotLocated { cause },
            Err(e) => Resolution::LocateFailed(e),
        }
    }

    async fn fetch(&self, id: i64) -> Result<Option<FactorRecord>, ApiError> {
        match self.api.get(id).await {
            Err(ApiError::NotFound { .. }) => Ok(None),
            other => other,
        }
    }

    /// Search the failed write's scope, then the sibling scope for
    /// deforestation.
    async fn scan(&self, ctx: &ConflictContext<'_>) -> Result<Option<FactorRecord>, ApiError> {
        let found = find_by_key(self.api, ctx.key, ctx.scope, ctx.exclude, self.page_size).await?;
        if found.is_some() || ctx.change_type != ChangeType::Deforestation {
            return Ok(found);
        }
        if self.close.is_closed() {
            return Ok(None);
        }
        find_by_key(
            self.api,
            ctx.key,
            ctx.scope.sibling(),
            ctx.exclude,
            self.page_size,
        )
        .await
    }
}
