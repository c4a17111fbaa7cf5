//! In-process factor backend.
//!
//! Enforces the same uniqueness rules as the real service so the whole
//! submission flow can run without a network:
//!
//! - Soil: one primary row per (soil type, previous use, current use)
//! - Deforestation: one row per (biome, single-value flag, UF set)
//! - Vegetation: one row per (parameter, category set)
//! - optionally, one record per change type and scope
//!
//! Key uniqueness is checked within a scope.
//!
//! Violations are reported the way the service reports them: status 409 with
//! the `RN008_DUPLICIDADE` code and the id of the record that owns the key.
//! Tests can also script failures and read per-operation call counters.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{FactorLookup, FactorSearch, FactorWriter};
use crate::editor::matcher::{record_matches, replicated_key_of};
use crate::error::{ApiError, BackendError};
use crate::model::{ChangeType, FactorData, FactorPage, FactorPayload, FactorRecord, Scope};

pub const DUPLICATE_CODE: &str = "RN008_DUPLICIDADE";
pub const SCOPE_UNIQUENESS_CODE: &str = "RN007_ESCOPO_DUPLICADO";

/// Number of calls made to each operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub search: usize,
    pub get: usize,
    pub create: usize,
    pub update: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<i64, FactorRecord>,
    next_record_id: i64,
    next_row_id: i64,
    calls: CallCounts,
    create_failures: VecDeque<ApiError>,
    update_failures: VecDeque<ApiError>,
    search_failure: Option<ApiError>,
    lookup_failure: Option<ApiError>,
    sticky_write_failure: Option<ApiError>,
    write_log: Vec<(Option<i64>, FactorPayload)>,
}

impl MemoryState {
    fn allocate_record_id(&mut self) -> i64 {
        self.next_record_id += 1;
        self.next_record_id
    }

    /// Give every row with id 0 a fresh id and keep explicit ids reserved.
    fn fill_row_ids(&mut self, data: &mut FactorData) {
        for id in row_ids_mut(data) {
            if *id == 0 {
                self.next_row_id += 1;
                *id = self.next_row_id;
            } else {
                self.next_row_id = self.next_row_id.max(*id);
            }
        }
    }

    /// [`fill_row_ids`](Self::fill_row_ids) for a write, rejecting rows that
    /// name an id outside `owned`.
    fn claim_row_ids(&mut self, data: &mut FactorData, owned: &[i64]) -> Result<(), ApiError> {
        let foreign = row_ids_mut(data)
            .into_iter()
            .map(|id| *id)
            .find(|id| *id != 0 && !owned.contains(id));
        if let Some(foreign) = foreign {
            return Err(ApiError::Rejected(
                BackendError::new(400)
                    .with_code("ROW_NOT_OWNED")
                    .with_message(format!("row {foreign} does not belong to this record")),
            ));
        }
        self.fill_row_ids(data);
        Ok(())
    }

    fn conflicting_record(
        &self,
        candidate: &FactorRecord,
        enforce_scope_uniqueness: bool,
    ) -> Option<ApiError> {
        let key = replicated_key_of(candidate)?;
        let change_type = candidate.change_type();

        for existing in self.records.values() {
            if existing.id == candidate.id || existing.change_type() != change_type {
                continue;
            }
            let same_scope = existing.scope == candidate.scope;
            if enforce_scope_uniqueness && same_scope {
                return Some(ApiError::Rejected(
                    BackendError::new(409)
                        .with_code(SCOPE_UNIQUENESS_CODE)
                        .with_message("uk_mut_fator_tipo_escopo"),
                ));
            }
            if same_scope && record_matches(existing, &key) {
                return Some(ApiError::Rejected(
                    BackendError::new(409)
                        .with_code(DUPLICATE_CODE)
                        .with_message("Registro duplicado")
                        .with_existing_id(existing.id),
                ));
            }
        }
        None
    }
}

/// Factor backend held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryFactorApi {
    state: Mutex<MemoryState>,
    enforce_scope_uniqueness: bool,
}

impl InMemoryFactorApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also enforce one record per change type and scope.
    pub fn with_scope_uniqueness(mut self) -> Self {
        self.enforce_scope_uniqueness = true;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, ApiError> {
        self.state
            .lock()
            .map_err(|e| ApiError::Transport(format!("in-memory backend poisoned: {e}")))
    }

    /// Store a record as-is, keeping its record and row ids. A record with
    /// id 0 gets a fresh id.
    pub fn insert(&self, mut record: FactorRecord) -> FactorRecord {
        let Ok(mut state) = self.state.lock() else {
            return record;
        };
        if record.id == 0 {
            record.id = state.allocate_record_id();
        }
        state.next_record_id = state.next_record_id.max(record.id);
        state.fill_row_ids(&mut record.data);
        state.records.insert(record.id, record.clone());
        record
    }

    pub fn remove(&self, id: i64) -> Option<FactorRecord> {
        self.state.lock().ok()?.records.remove(&id)
    }

    pub fn record(&self, id: i64) -> Option<FactorRecord> {
        self.state.lock().ok()?.records.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().map(|s| s.calls).unwrap_or_default()
    }

    /// Payloads received by create (`None`) and update (`Some(id)`), in order.
    pub fn write_log(&self) -> Vec<(Option<i64>, FactorPayload)> {
        self.state
            .lock()
            .map(|s| s.write_log.clone())
            .unwrap_or_default()
    }

    /// Fail the next create with `error`, before any uniqueness check.
    pub fn fail_next_create(&self, error: ApiError) {
        if let Ok(mut state) = self.state.lock() {
            state.create_failures.push_back(error);
        }
    }

    pub fn fail_next_update(&self, error: ApiError) {
        if let Ok(mut state) = self.state.lock() {
            state.update_failures.push_back(error);
        }
    }

    /// Fail every create and update with `error` until cleared.
    pub fn fail_all_writes(&self, error: Option<ApiError>) {
        if let Ok(mut state) = self.state.lock() {
            state.sticky_write_failure = error;
        }
    }

    pub fn fail_searches(&self, error: Option<ApiError>) {
        if let Ok(mut state) = self.state.lock() {
            state.search_failure = error;
        }
    }

    pub fn fail_lookups(&self, error: Option<ApiError>) {
        if let Ok(mut state) = self.state.lock() {
            state.lookup_failure = error;
        }
    }
}

fn row_ids_mut(data: &mut FactorData) -> Vec<&mut i64> {
    match data {
        FactorData::Soil(rows) => rows.iter_mut().map(|r| &mut r.id).collect(),
        FactorData::Deforestation(rows) => rows.iter_mut().map(|r| &mut r.id).collect(),
        FactorData::Vegetation(rows) => rows.iter_mut().map(|r| &mut r.id).collect(),
    }
}

fn ensure_rows(payload: &FactorPayload) -> Result<(), ApiError> {
    if payload.data.is_empty() {
        return Err(ApiError::Rejected(
            BackendError::new(400)
                .with_code("ROWS_REQUIRED")
                .with_message("a factor record needs at least one row"),
        ));
    }
    Ok(())
}

#[async_trait]
impl FactorSearch for InMemoryFactorApi {
    async fn search(
        &self,
        change_type: ChangeType,
        scope: Scope,
        page: u32,
        page_size: u32,
    ) -> Result<FactorPage, ApiError> {
        let mut state = self.lock()?;
        state.calls.search += 1;
        if let Some(err) = state.search_failure.clone() {
            return Err(err);
        }

        let matching: Vec<&FactorRecord> = state
            .records
            .values()
            .filter(|r| r.change_type() == change_type && r.scope == scope)
            .collect();
        let total_count = matching.len() as u64;
        let start = (page as usize).saturating_mul(page_size as usize);
        let items = matching
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(FactorPage { items, total_count })
    }
}

#[async_trait]
impl FactorLookup for InMemoryFactorApi {
    async fn get(&self, id: i64) -> Result<Option<FactorRecord>, ApiError> {
        let mut state = self.lock()?;
        state.calls.get += 1;
        if let Some(err) = state.lookup_failure.clone() {
            return Err(err);
        }
        Ok(state.records.get(&id).cloned())
    }
}

#[async_trait]
impl FactorWriter for InMemoryFactorApi {
    async fn create(&self, payload: &FactorPayload) -> Result<FactorRecord, ApiError> {
        let mut state = self.lock()?;
        state.calls.create += 1;
        state.write_log.push((None, payload.clone()));
        if let Some(err) = state.create_failures.pop_front() {
            return Err(err);
        }
        if let Some(err) = state.sticky_write_failure.clone() {
            return Err(err);
        }
        ensure_rows(payload)?;

        let mut candidate = payload.clone().into_record(0);
        if let Some(err) = state.conflicting_record(&candidate, self.enforce_scope_uniqueness) {
            return Err(err);
        }
        state.claim_row_ids(&mut candidate.data, &[])?;
        candidate.id = state.allocate_record_id();
        state.records.insert(candidate.id, candidate.clone());
        tracing::debug!(id = candidate.id, change_type = %candidate.change_type(), "in-memory create");
        Ok(candidate)
    }

    async fn update(&self, id: i64, payload: &FactorPayload) -> Result<FactorRecord, ApiError> {
        let mut state = self.lock()?;
        state.calls.update += 1;
        state.write_log.push((Some(id), payload.clone()));
        if let Some(err) = state.update_failures.pop_front() {
            return Err(err);
        }
        if let Some(err) = state.sticky_write_failure.clone() {
            return Err(err);
        }
        ensure_rows(payload)?;

        let Some(existing) = state.records.get(&id).cloned() else {
            return Err(ApiError::NotFound { id });
        };
        if existing.change_type() != payload.change_type() {
            return Err(ApiError::Rejected(
                BackendError::new(400)
                    .with_code("CHANGE_TYPE_IMMUTABLE")
                    .with_message("changeType cannot change on update"),
            ));
        }

        let mut candidate = payload.clone().into_record(id);
        if let Some(err) = state.conflicting_record(&candidate, self.enforce_scope_uniqueness) {
            return Err(err);
        }
        let mut existing_data = existing.data;
        let owned: Vec<i64> = row_ids_mut(&mut existing_data).into_iter().map(|id| *id).collect();
        state.claim_row_ids(&mut candidate.data, &owned)?;
        state.records.insert(id, candidate.clone());
        tracing::debug!(id, change_type = %candidate.change_type(), "in-memory update");
        Ok(candidate)
    }
}
