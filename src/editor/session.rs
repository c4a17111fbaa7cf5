//! One open editor: form state, scope caches and recovery guards.
//!
//! Everything here lives exactly as long as the editor is open. Opening a
//! fresh session is the only way to get fresh guard flags.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::FactorSearch;
use crate::editor::conflict::ConflictAttemptState;
use crate::editor::matcher::{normalize_use, replicated_key_of};
use crate::editor::scope_store::{PerScope, ScopeFieldStore, scope_values_of};
use crate::editor::validator::FieldErrors;
use crate::model::{ChangeType, FactorForm, FactorRecord, ReplicatedKey, Scope, ScopeValues};

/// Cloneable handle that tears an editor down.
///
/// In-flight work checks it after every awaited call and drops late results.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal(Arc<AtomicBool>);

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Create,
    Edit { id: i64, scope: Scope },
}

/// The call a submission makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    Create,
    Update { id: i64 },
}

#[derive(Debug)]
pub struct EditorSession {
    mode: EditorMode,
    form: FactorForm,
    store: ScopeFieldStore,
    /// Stored record known for each scope: the loaded one, a prefetched
    /// sibling, or a record adopted during recovery.
    known: PerScope<Option<FactorRecord>>,
    guards: ConflictAttemptState,
    close: CloseSignal,
}

impl EditorSession {
    pub fn open_create(change_type: ChangeType, scope: Scope) -> Self {
        tracing::debug!(change_type = %change_type, scope = %scope, "Opening editor for create");
        Self {
            mode: EditorMode::Create,
            form: FactorForm::blank(change_type, scope),
            store: ScopeFieldStore::new(),
            known: PerScope::default(),
            guards: ConflictAttemptState::new(),
            close: CloseSignal::new(),
        }
    }

    /// Open an existing record. Its scope cache is seeded from its rows.
    pub fn open_edit(record: FactorRecord) -> Self {
        tracing::debug!(id = record.id, scope = %record.scope, "Opening editor for edit");
        let mut form = FactorForm::blank(record.change_type(), record.scope);
        if let Some(key) = replicated_key_of(&record) {
            form.set_key(key);
        }
        form.set_values(scope_values_of(&record));

        let mut store = ScopeFieldStore::new();
        store.seed_from_record(&record);
        let mut known = PerScope::default();
        *known.get_mut(record.scope) = Some(record.clone());

        Self {
            mode: EditorMode::Edit {
                id: record.id,
                scope: record.scope,
            },
            form,
            store,
            known,
            guards: ConflictAttemptState::new(),
            close: CloseSignal::new(),
        }
    }

    /// Start from a draft form instead of a blank one.
    pub fn with_form(mut self, form: FactorForm) -> Result<Self, FieldErrors> {
        if form.change_type() != self.form.change_type() {
            let mut errors = FieldErrors::new();
            errors.insert(
                "changeType",
                format!("must stay {}", self.form.change_type().label()),
            );
            return Err(errors);
        }
        self.set_key(form.key())?;
        if form.scope != self.form.scope {
            self.switch_scope(form.scope);
        }
        self.set_values(form.values());
        Ok(self)
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.mode, EditorMode::Edit { .. })
    }

    pub fn form(&self) -> &FactorForm {
        &self.form
    }

    pub fn change_type(&self) -> ChangeType {
        self.form.change_type()
    }

    pub fn store(&self) -> &ScopeFieldStore {
        &self.store
    }

    pub fn known_record(&self, scope: Scope) -> Option<&FactorRecord> {
        self.known.get(scope).as_ref()
    }

    /// Ids of every stored record this editor already owns.
    pub fn known_ids(&self) -> Vec<i64> {
        Scope::ALL
            .iter()
            .filter_map(|scope| self.known.get(*scope).as_ref().map(|r| r.id))
            .collect()
    }

    pub fn guards(&self) -> &ConflictAttemptState {
        &self.guards
    }

    pub fn guards_mut(&mut self) -> &mut ConflictAttemptState {
        &mut self.guards
    }

    pub fn close_signal(&self) -> &CloseSignal {
        &self.close
    }

    pub fn close(&self) {
        self.close.close();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_closed()
    }

    /// Replace the replicated key.
    ///
    /// Soil key fields are locked while editing.
    pub fn set_key(&mut self, key: ReplicatedKey) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if key.change_type() != self.form.change_type() {
            errors.insert(
                "changeType",
                format!("must stay {}", self.form.change_type().label()),
            );
            return Err(errors);
        }

        if let (true, ReplicatedKey::Soil(current), ReplicatedKey::Soil(next)) =
            (self.is_editing(), self.form.key(), &key)
        {
            if current.sub_type != next.sub_type {
                errors.insert("subType", "cannot change while editing");
            }
            if normalize_use(&current.previous_use) != normalize_use(&next.previous_use) {
                errors.insert("previousUse", "cannot change while editing");
            }
            if normalize_use(&current.current_use) != normalize_use(&next.current_use) {
                errors.insert("currentUse", "cannot change while editing");
            }
            if !errors.is_empty() {
                return Err(errors);
            }
        }

        self.form.set_key(key);
        Ok(())
    }

    /// Replace the active scope's independent values.
    pub fn set_values(&mut self, values: ScopeValues) -> bool {
        self.form.set_values(values)
    }

    /// Persist the outgoing scope and restore the target scope into the form.
    pub fn switch_scope(&mut self, target: Scope) {
        let current = self.form.scope;
        if current == target {
            return;
        }
        self.store.persist(current, self.form.values());
        let restored = self.store.restore(target, self.form.change_type());
        self.form.scope = target;
        self.form.set_values(restored);
        tracing::debug!(from = %current, to = %target, "Switched scope");
    }

    /// True when switching to `target` should look for a sibling record first.
    pub fn needs_prefetch(&self, target: Scope) -> bool {
        self.is_editing()
            && self.known.get(target).is_none()
            && self.store.is_empty(target, self.form.change_type())
    }

    /// [`switch_scope`](Self::switch_scope), seeding the target from its
    /// sibling record first when editing. A failed search leaves the target
    /// empty.
    pub async fn switch_scope_with_prefetch<A>(&mut self, api: &A, target: Scope, page_size: u32)
    where
        A: FactorSearch + ?Sized,
    {
        if self.needs_prefetch(target) {
            let key = self.form.key();
            let exclude = self.known_ids();
            let sibling = self
                .store
                .prefetch_sibling(api, target, &key, &exclude, page_size)
                .await;
            if self.is_closed() {
                tracing::debug!("Editor closed during prefetch, discarding result");
                return;
            }
            if let Some(sibling) = sibling {
                *self.known.get_mut(target) = Some(sibling);
            }
        }
        self.switch_scope(target);
    }

    /// Create in create mode. While editing: update the record known for the
    /// selected scope, or create in that scope when none is known.
    pub fn write_target(&self) -> WriteTarget {
        match self.mode {
            EditorMode::Create => WriteTarget::Create,
            EditorMode::Edit { .. } => match self.known.get(self.form.scope) {
                Some(record) => WriteTarget::Update { id: record.id },
                None => WriteTarget::Create,
            },
        }
    }

    /// The stored record the next write replaces.
    pub fn previous_record(&self) -> Option<&FactorRecord> {
        match self.write_target() {
            WriteTarget::Create => None,
            WriteTarget::Update { .. } => self.known.get(self.form.scope).as_ref(),
        }
    }

    /// Adopt `record` as the edit target, keeping the values typed so far.
    pub fn convert_to_edit(&mut self, record: FactorRecord) {
        let values = self.form.values();
        if self.form.scope != record.scope {
            self.store.persist(self.form.scope, values.clone());
            self.form.scope = record.scope;
        }
        self.store.persist(record.scope, values);
        tracing::debug!(id = record.id, scope = %record.scope, "Converted editor to edit mode");
        self.mode = EditorMode::Edit {
            id: record.id,
            scope: record.scope,
        };
        let scope = record.scope;
        *self.known.get_mut(scope) = Some(record);
    }

    /// Stop treating the record known for `scope` as the write target, so the
    /// next write there is a create with fresh rows.
    pub fn forget_known(&mut self, scope: Scope) -> Option<FactorRecord> {
        let forgotten = self.known.get_mut(scope).take();
        if let Some(record) = &forgotten {
            tracing::debug!(id = record.id, scope = %scope, "Dropped known record");
        }
        forgotten
    }

    /// Record a successful write.
    pub fn record_saved(&mut self, record: FactorRecord) {
        if !self.is_editing() {
            self.mode = EditorMode::Edit {
                id: record.id,
                scope: record.scope,
            };
        }
        let scope = record.scope;
        *self.known.get_mut(scope) = Some(record);
    }
}
