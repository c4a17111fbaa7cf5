//! End-to-end submission flows against the in-memory backend.
//!
//! Each test opens a fresh editor session, drives it through
//! `SubmissionController`, and checks both the outcome and the exact calls
//! the backend received:
//! - scope switching round trips
//! - duplicate precheck blocking a create
//! - conflict recovery by id, by key scan, and its guards
//! - scope-uniqueness notice and the cross-scope create it offers
//! - child-row id preservation on edit
//! - teardown while a call is in flight

use std::sync::Mutex;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use mutfactor::api::memory::InMemoryFactorApi;
use mutfactor::api::{FactorLookup, FactorSearch, FactorWriter};
use mutfactor::config::EditorConfig;
use mutfactor::editor::matcher::{deforestation_row_matches, record_matches};
use mutfactor::editor::{
    CloseSignal, EditorSession, NotificationLevel, RecordingNotifier, SubmissionController,
    SubmissionOutcome, SubmissionState,
};
use mutfactor::error::{ApiError, BackendError};
use mutfactor::model::{
    ChangeType, DeforestationKey, DeforestationRow, DeforestationScopeData, FactorData,
    FactorPage, FactorPayload, FactorRecord, ReplicatedKey, Scope, ScopeValues, SoilKey, SoilRow,
    SoilScopeData, SoilSubType, VegetationKey, VegetationScopeData,
};

fn soil_key(previous: &str, current: &str) -> ReplicatedKey {
    ReplicatedKey::Soil(SoilKey {
        sub_type: Some(SoilSubType::UsePair),
        previous_use: previous.to_string(),
        current_use: current.to_string(),
    })
}

fn soil_values(factor: rust_decimal::Decimal) -> ScopeValues {
    ScopeValues::Soil(SoilScopeData {
        emission_factor: Some(factor),
        ..SoilScopeData::default()
    })
}

fn soil_record(id: i64, row_id: i64, scope: Scope, previous: &str, current: &str) -> FactorRecord {
    FactorRecord {
        id,
        scope,
        data: FactorData::Soil(vec![SoilRow {
            id: row_id,
            soil_type: "USE_PAIR".to_string(),
            previous_use: previous.to_string(),
            current_use: current.to_string(),
            emission_factor: Some(dec!(1.0)),
            ..SoilRow::default()
        }]),
    }
}

fn cerrado_key() -> DeforestationKey {
    DeforestationKey {
        biome: "CERRADO".to_string(),
        ufs: vec!["GO".to_string(), "MT".to_string()],
        single_value: false,
    }
}

fn deforestation_values(carbon_stock: rust_decimal::Decimal) -> ScopeValues {
    ScopeValues::Deforestation(DeforestationScopeData {
        phytophysiognomy_name: Some("Savana arborizada".to_string()),
        phytophysiognomy_code: Some("SA".to_string()),
        deforestation_category: Some("PRIMARIA".to_string()),
        carbon_stock: Some(carbon_stock),
    })
}

fn cerrado_record(id: i64, row_id: i64, scope: Scope) -> FactorRecord {
    FactorRecord {
        id,
        scope,
        data: FactorData::Deforestation(vec![DeforestationRow {
            id: row_id,
            biome: "CERRADO".to_string(),
            ufs: vec!["MT".to_string(), "GO".to_string()],
            single_value: false,
            phytophysiognomy_name: Some("Savana arborizada".to_string()),
            phytophysiognomy_code: Some("SA".to_string()),
            deforestation_category: Some("PRIMARIA".to_string()),
            carbon_stock: Some(dec!(40.5)),
        }]),
    }
}

fn deforestation_session(scope: Scope) -> EditorSession {
    let mut session = EditorSession::open_create(ChangeType::Deforestation, scope);
    session
        .set_key(ReplicatedKey::Deforestation(cerrado_key()))
        .expect("deforestation key");
    session.set_values(deforestation_values(dec!(42.123456)));
    session
}

fn rejected_409_with_id(id: i64) -> ApiError {
    ApiError::Rejected(
        BackendError::new(409)
            .with_code("RN008_DUPLICIDADE")
            .with_message("Registro duplicado")
            .with_existing_id(id),
    )
}

#[test]
fn scope_switch_round_trip_restores_each_scope() {
    let mut session = EditorSession::open_create(ChangeType::Soil, Scope::Scope1);
    session.set_key(soil_key("Pastagem", "Soja")).expect("key");
    session.set_values(soil_values(dec!(1.5)));

    session.switch_scope(Scope::Scope3);
    assert!(session.form().values().is_empty());
    session.set_values(soil_values(dec!(2.25)));

    session.switch_scope(Scope::Scope1);
    session.switch_scope(Scope::Scope1);
    assert_eq!(session.form().values(), soil_values(dec!(1.5)));
    assert_eq!(session.form().key(), soil_key("Pastagem", "Soja"));

    session.switch_scope(Scope::Scope3);
    assert_eq!(session.form().values(), soil_values(dec!(2.25)));
    assert_eq!(session.form().key(), soil_key("Pastagem", "Soja"));
}

#[tokio::test]
async fn soil_duplicate_blocks_create_without_writing() {
    let api = InMemoryFactorApi::new();
    api.insert(soil_record(42, 100, Scope::Scope1, "Pastagem", "Cultivo convencional"));
    let notifier = RecordingNotifier::new();

    let mut session = EditorSession::open_create(ChangeType::Soil, Scope::Scope1);
    session
        .set_key(soil_key("Pastagem", "Cultivo convencional"))
        .expect("key");
    session.set_values(soil_values(dec!(1.234500)));
    let mut controller = SubmissionController::new(session, EditorConfig::default());

    let outcome = controller.submit(&api, &notifier).await;
    let SubmissionOutcome::Blocked(finding) = outcome else {
        panic!("expected blocked outcome, got {outcome:?}");
    };
    assert_eq!(finding.existing_id, 42);
    assert_eq!(finding.scope, Scope::Scope1);

    let notes = notifier.take();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Warning);
    assert!(notes[0].message.contains("Pastagem → Cultivo convencional"));
    assert!(notes[0].message.contains("Escopo 1"));

    let calls = api.calls();
    assert_eq!(calls.create + calls.update, 0);
    assert_eq!(controller.state(), SubmissionState::Editing);
}

#[tokio::test]
async fn deforestation_conflict_updates_existing_record_once() {
    let api = InMemoryFactorApi::new();
    api.insert(cerrado_record(77, 700, Scope::Scope3));
    api.fail_next_create(rejected_409_with_id(77));
    let notifier = RecordingNotifier::new();
    let mut controller =
        SubmissionController::new(deforestation_session(Scope::Scope1), EditorConfig::default());

    let outcome = controller.submit(&api, &notifier).await;
    let SubmissionOutcome::Recovered(record) = &outcome else {
        panic!("expected recovered outcome, got {outcome:?}");
    };
    assert_eq!(record.id, 77);
    assert_eq!(record.scope, Scope::Scope3);

    let calls = api.calls();
    assert_eq!(calls.search, 1);
    assert_eq!(calls.create, 1);
    assert_eq!(calls.get, 1);
    assert_eq!(calls.update, 1);

    let log = api.write_log();
    let (target, payload) = &log[1];
    assert_eq!(*target, Some(77));
    assert_eq!(payload.scope, Scope::Scope3);
    let FactorData::Deforestation(rows) = &payload.data else {
        panic!("expected deforestation rows");
    };
    assert_eq!(rows[0].id, 700);
    assert_eq!(rows[0].carbon_stock, Some(dec!(42.123456)));

    let notes = notifier.take();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Success);
    assert!(notes[0].message.contains("record 77 in Escopo 3"));
    assert!(controller.session().is_closed());
}

#[tokio::test]
async fn repeated_conflict_abandons_instead_of_looping() {
    let api = InMemoryFactorApi::new();
    api.insert(cerrado_record(77, 700, Scope::Scope1));
    api.fail_all_writes(Some(rejected_409_with_id(77)));
    let notifier = RecordingNotifier::new();
    let config = EditorConfig {
        precheck_enabled: false,
        ..EditorConfig::default()
    };
    let mut controller = SubmissionController::new(deforestation_session(Scope::Scope1), config);

    let first = controller.submit(&api, &notifier).await;
    assert!(matches!(first, SubmissionOutcome::Failed(_)), "{first:?}");
    let calls = api.calls();
    assert_eq!((calls.create, calls.get, calls.update), (1, 1, 1));

    let second = controller.submit(&api, &notifier).await;
    assert_eq!(second, SubmissionOutcome::Abandoned);
    let calls = api.calls();
    assert_eq!(calls.get, 1);
    assert_eq!(calls.update, 2);
    assert_eq!(calls.search, 0);

    let levels: Vec<NotificationLevel> = notifier.take().into_iter().map(|n| n.level).collect();
    assert_eq!(
        levels,
        vec![NotificationLevel::Error, NotificationLevel::Warning]
    );
}

#[tokio::test]
async fn edit_keeps_primary_and_axis_row_ids() {
    let api = InMemoryFactorApi::new();
    let loaded = api.insert(FactorRecord {
        id: 5,
        scope: Scope::Scope1,
        data: FactorData::Soil(vec![
            SoilRow {
                id: 10,
                soil_type: "SOLO_SOIL_USE_PAIR".to_string(),
                previous_use: "Pastagem".to_string(),
                current_use: "Soja".to_string(),
                emission_factor: Some(dec!(1.0)),
                ..SoilRow::default()
            },
            SoilRow {
                id: 11,
                soil_type: "SOLO_SOIL_USE_PAIR".to_string(),
                clay_silt_axis: Some(dec!(0.31)),
                ..SoilRow::default()
            },
        ]),
    });

    let mut session = EditorSession::open_edit(loaded);
    session.set_values(ScopeValues::Soil(SoilScopeData {
        emission_factor: Some(dec!(1.25)),
        soil_clay_silt_factor: Some(dec!(0.35)),
        ..SoilScopeData::default()
    }));
    let mut controller = SubmissionController::new(session, EditorConfig::default());
    let notifier = RecordingNotifier::new();

    let outcome = controller.submit(&api, &notifier).await;
    assert!(outcome.is_success(), "{outcome:?}");

    let (target, payload) = api.write_log().remove(0);
    assert_eq!(target, Some(5));
    let FactorData::Soil(rows) = &payload.data else {
        panic!("expected soil rows");
    };
    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    assert_eq!(ids, vec![10, 11]);
    assert_eq!(rows[1].clay_silt_axis, Some(dec!(0.35)));

    let stored = api.record(5).expect("stored record");
    let FactorData::Soil(stored_rows) = &stored.data else {
        panic!("expected soil rows");
    };
    assert_eq!(stored_rows.len(), 2);
    assert_eq!(api.len(), 1);
}

#[test]
fn deforestation_matching_is_symmetric() {
    let pairs = [
        (("CERRADO", vec!["GO", "MT"], false), ("cerrado", vec!["mt", "go"], false), true),
        (("CERRADO", vec!["GO"], false), ("CERRADO", vec!["GO", "MT"], false), false),
        (("CERRADO", vec!["GO"], true), ("CERRADO", vec!["BA"], true), true),
        (("CERRADO", vec!["GO"], true), ("CERRADO", vec!["GO"], false), false),
        (("PAMPA", vec!["RS"], false), ("CERRADO", vec!["RS"], false), false),
    ];

    for ((biome_a, ufs_a, single_a), (biome_b, ufs_b, single_b), expected) in pairs {
        let row = |biome: &str, ufs: &[&str], single_value: bool| DeforestationRow {
            biome: biome.to_string(),
            ufs: ufs.iter().map(|uf| uf.to_string()).collect(),
            single_value,
            ..DeforestationRow::default()
        };
        let key = |biome: &str, ufs: &[&str], single_value: bool| DeforestationKey {
            biome: biome.to_string(),
            ufs: ufs.iter().map(|uf| uf.to_string()).collect(),
            single_value,
        };

        let forward = deforestation_row_matches(
            &row(biome_a, &ufs_a, single_a),
            &key(biome_b, &ufs_b, single_b),
        );
        let backward = deforestation_row_matches(
            &row(biome_b, &ufs_b, single_b),
            &key(biome_a, &ufs_a, single_a),
        );
        assert_eq!(forward, expected, "{biome_a} {ufs_a:?} vs {biome_b} {ufs_b:?}");
        assert_eq!(backward, expected, "{biome_b} {ufs_b:?} vs {biome_a} {ufs_a:?}");
    }

    let record = cerrado_record(1, 1, Scope::Scope1);
    assert!(record_matches(
        &record,
        &ReplicatedKey::Deforestation(cerrado_key())
    ));
}

#[tokio::test]
async fn unlocatable_conflict_reports_and_stops() {
    let api = InMemoryFactorApi::new();
    api.fail_next_create(ApiError::Rejected(BackendError::new(400).with_message(
        "could not execute statement; constraint [UK_MUT_VEGETACAO_CHAVE]",
    )));
    let notifier = RecordingNotifier::new();

    let mut session = EditorSession::open_create(ChangeType::Vegetation, Scope::Scope1);
    session
        .set_key(ReplicatedKey::Vegetation(VegetationKey {
            parameter: "Estoque de carbono".to_string(),
            categories: vec!["FLORESTAL".to_string()],
        }))
        .expect("key");
    session.set_values(ScopeValues::Vegetation(VegetationScopeData {
        amazon: Some(dec!(0.5)),
        ..VegetationScopeData::default()
    }));
    let mut controller = SubmissionController::new(session, EditorConfig::default());

    let outcome = controller.submit(&api, &notifier).await;
    assert_eq!(outcome, SubmissionOutcome::NotLocated);

    let calls = api.calls();
    // Two precheck searches (both scopes) and one recovery scan.
    assert_eq!(calls.search, 3);
    assert_eq!(calls.create, 1);
    assert_eq!(calls.get + calls.update, 0);

    let notes = notifier.take();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Warning);
    assert_eq!(
        notes[0].message,
        "Could not locate the existing Vegetation record for parameter Estoque de carbono, \
         categories FLORESTAL in Escopo 1. Resolve the conflict manually."
    );

    assert_eq!(
        controller.confirm(&api, &notifier).await,
        SubmissionOutcome::NotReady
    );
    assert_eq!(api.calls(), calls);
}

#[tokio::test]
async fn constraint_or_masked_conflict_updates_owner_in_sibling_scope() {
    let failures = [
        ApiError::Rejected(BackendError::new(400).with_message(
            "ERROR: duplicate key value violates unique constraint \"uk_mut_desmatamento_chave\"",
        )),
        ApiError::Rejected(BackendError::new(500).with_message("Internal Server Error")),
    ];

    for failure in failures {
        let api = InMemoryFactorApi::new();
        api.insert(cerrado_record(88, 880, Scope::Scope3));
        api.fail_next_create(failure.clone());
        let notifier = RecordingNotifier::new();
        let mut controller = SubmissionController::new(
            deforestation_session(Scope::Scope1),
            EditorConfig::default(),
        );

        let outcome = controller.submit(&api, &notifier).await;
        let SubmissionOutcome::Recovered(record) = &outcome else {
            panic!("expected recovered outcome for {failure}, got {outcome:?}");
        };
        assert_eq!(record.id, 88);
        assert_eq!(record.scope, Scope::Scope3);

        let calls = api.calls();
        // One precheck search, then the scan of Escopo 1 and Escopo 3.
        assert_eq!(calls.search, 3, "{failure}");
        assert_eq!((calls.create, calls.get, calls.update), (1, 0, 1), "{failure}");

        let log = api.write_log();
        assert_eq!(log.len(), 2);
        let (target, payload) = &log[1];
        assert_eq!(*target, Some(88));
        assert_eq!(payload.scope, Scope::Scope3);
        let FactorData::Deforestation(rows) = &payload.data else {
            panic!("expected deforestation rows");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 880);
        assert_eq!(rows[0].carbon_stock, Some(dec!(42.123456)));

        let notes = notifier.take();
        assert_eq!(notes.len(), 1, "{failure}");
        assert_eq!(notes[0].level, NotificationLevel::Success);
        assert!(notes[0].message.contains("record 88 in Escopo 3"));
        assert_eq!(api.len(), 1);
        assert!(controller.session().is_closed());
    }
}

#[tokio::test]
async fn scope_uniqueness_on_create_in_selected_scope_is_terminal() {
    let api = InMemoryFactorApi::new().with_scope_uniqueness();
    api.insert(soil_record(0, 0, Scope::Scope1, "Pastagem", "Milho"));
    let notifier = RecordingNotifier::new();

    let mut session = EditorSession::open_create(ChangeType::Soil, Scope::Scope1);
    session.set_key(soil_key("Pastagem", "Soja")).expect("key");
    session.set_values(soil_values(dec!(1.5)));
    let mut controller = SubmissionController::new(session, EditorConfig::default());

    let outcome = controller.submit(&api, &notifier).await;
    assert_eq!(
        outcome,
        SubmissionOutcome::ScopeOccupied {
            scope: Scope::Scope1
        }
    );
    assert_eq!(controller.state(), SubmissionState::Editing);
    let notes = notifier.take();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Warning);
    assert_eq!(
        notes[0].message,
        "Escopo 1 already has a Soil factor. Edit that record instead of creating another one."
    );
    assert_eq!(
        controller.confirm(&api, &notifier).await,
        SubmissionOutcome::NotReady
    );
    assert_eq!(api.calls().create, 1);

    let session = controller.session_mut();
    session.switch_scope(Scope::Scope3);
    session.set_values(soil_values(dec!(1.5)));

    let outcome = controller.submit(&api, &notifier).await;
    let SubmissionOutcome::Saved(record) = &outcome else {
        panic!("expected saved outcome, got {outcome:?}");
    };
    assert_eq!(record.scope, Scope::Scope3);
    assert_eq!(api.calls().create, 2);
    assert_eq!(notifier.count_of(NotificationLevel::Success), 1);
}

#[tokio::test]
async fn scope_uniqueness_on_update_reconfirms_as_fresh_create() {
    let api = InMemoryFactorApi::new();
    let loaded = api.insert(soil_record(5, 50, Scope::Scope1, "Pastagem", "Soja"));
    api.insert(soil_record(6, 60, Scope::Scope3, "Pastagem", "Soja"));
    api.fail_next_update(ApiError::Rejected(
        BackendError::new(409)
            .with_code("RN007_ESCOPO_DUPLICADO")
            .with_message("uk_mut_fator_tipo_escopo"),
    ));
    let notifier = RecordingNotifier::new();

    let mut session = EditorSession::open_edit(loaded);
    session
        .switch_scope_with_prefetch(&api, Scope::Scope3, 500)
        .await;
    session.set_values(soil_values(dec!(2.5)));
    let mut controller = SubmissionController::new(session, EditorConfig::default());

    let outcome = controller.submit(&api, &notifier).await;
    assert_eq!(
        outcome,
        SubmissionOutcome::AwaitingReconfirmation {
            occupied: Scope::Scope3
        }
    );
    assert_eq!(controller.state(), SubmissionState::AwaitingConfirmation);
    assert_eq!(controller.session().known_record(Scope::Scope3), None);
    let notes = notifier.take();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Warning);
    assert_eq!(
        notes[0].message,
        "Escopo 3 already has a Soil factor, so it was not updated. \
         Confirm again to create a new Soil factor for Pastagem → Soja in Escopo 3."
    );

    // Record 6 was removed by someone else before the user confirmed.
    api.remove(6);
    let outcome = controller.confirm(&api, &notifier).await;
    let SubmissionOutcome::Saved(record) = &outcome else {
        panic!("expected saved outcome, got {outcome:?}");
    };
    assert_eq!(record.scope, Scope::Scope3);
    assert_ne!(record.id, 6);

    let log = api.write_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, Some(6));
    let FactorData::Soil(rows) = &log[0].1.data else {
        panic!("expected soil rows");
    };
    assert_eq!(rows[0].id, 60);
    let (target, payload) = &log[1];
    assert_eq!(*target, None);
    assert_eq!(payload.scope, Scope::Scope3);
    let FactorData::Soil(rows) = &payload.data else {
        panic!("expected soil rows");
    };
    assert!(rows.iter().all(|row| row.id == 0));
    assert_eq!(rows[0].emission_factor, Some(dec!(2.5)));

    assert_eq!(notifier.count_of(NotificationLevel::Success), 1);
    assert_eq!(
        api.record(5),
        Some(soil_record(5, 50, Scope::Scope1, "Pastagem", "Soja"))
    );
}

/// Delegates to the in-memory backend and closes the editor when `get` runs.
struct ClosingOnLookup {
    inner: InMemoryFactorApi,
    close: Mutex<Option<CloseSignal>>,
}

#[async_trait]
impl FactorSearch for ClosingOnLookup {
    async fn search(
        &self,
        change_type: ChangeType,
        scope: Scope,
        page: u32,
        page_size: u32,
    ) -> Result<FactorPage, ApiError> {
        self.inner.search(change_type, scope, page, page_size).await
    }
}

#[async_trait]
impl FactorLookup for ClosingOnLookup {
    async fn get(&self, id: i64) -> Result<Option<FactorRecord>, ApiError> {
        let result = self.inner.get(id).await;
        if let Some(close) = self.close.lock().expect("lock").as_ref() {
            close.close();
        }
        result
    }
}

#[async_trait]
impl FactorWriter for ClosingOnLookup {
    async fn create(&self, payload: &FactorPayload) -> Result<FactorRecord, ApiError> {
        self.inner.create(payload).await
    }

    async fn update(&self, id: i64, payload: &FactorPayload) -> Result<FactorRecord, ApiError> {
        self.inner.update(id, payload).await
    }
}

#[tokio::test]
async fn closing_during_recovery_discards_late_result() {
    let inner = InMemoryFactorApi::new();
    inner.insert(cerrado_record(77, 700, Scope::Scope3));
    inner.fail_next_create(rejected_409_with_id(77));
    let api = ClosingOnLookup {
        inner,
        close: Mutex::new(None),
    };
    let notifier = RecordingNotifier::new();
    let mut controller =
        SubmissionController::new(deforestation_session(Scope::Scope1), EditorConfig::default());
    *api.close.lock().expect("lock") = Some(controller.close_signal());

    let outcome = controller.submit(&api, &notifier).await;
    assert_eq!(outcome, SubmissionOutcome::Discarded);
    assert_eq!(notifier.count(), 0);
    let calls = api.inner.calls();
    assert_eq!(calls.get, 1);
    assert_eq!(calls.update, 0);

    assert_eq!(
        controller.submit(&api, &notifier).await,
        SubmissionOutcome::Discarded
    );
    assert_eq!(api.inner.calls().create, 1);
}
