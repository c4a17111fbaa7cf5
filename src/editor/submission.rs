//! The submission state machine.
//!
//! ```text
//! Editing --prepare--> [validate] --> [precheck] --> AwaitingConfirmation
//! AwaitingConfirmation --confirm--> write --ok--> Done
//!                                         \--err--> resolve --> one corrective update
//! ```
//!
//! Network calls within one submission are strictly sequential. After every
//! awaited call the close signal is checked; a closed editor discards the
//! result without notifying.

use crate::api::FactorApi;
use crate::config::EditorConfig;
use crate::editor::conflict::{ConflictContext, ConflictResolver, Resolution};
use crate::editor::notify::NotificationSink;
use crate::editor::payload::{build_payload, row_summary};
use crate::editor::precheck::{DuplicateFinding, find_duplicate};
use crate::editor::session::{CloseSignal, EditorSession, WriteTarget};
use crate::editor::validator::{FieldErrors, validate};
use crate::error::ApiError;
use crate::model::{ChangeType, FactorRecord, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Editing,
    AwaitingConfirmation,
    /// A record was saved; the editor is closed.
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Local validation failed; nothing was sent.
    Invalid(FieldErrors),
    /// The precheck found another record with the same key.
    Blocked(DuplicateFinding),
    /// Valid and unique as far as we can tell; waiting for `confirm`.
    ReadyToConfirm { summary: String },
    Saved(FactorRecord),
    /// The write conflicted and the owning record was updated instead.
    Recovered(FactorRecord),
    /// `occupied` already has a record of this change type. The next
    /// `confirm` creates a new record in the selected scope instead.
    AwaitingReconfirmation { occupied: Scope },
    /// A create was refused because the selected scope is already taken.
    ScopeOccupied { scope: Scope },
    /// The conflicting record could not be found.
    NotLocated,
    /// The same conflict came back after a recovery attempt.
    Abandoned,
    Failed(ApiError),
    /// `confirm` without a successful `prepare`, or a finished session.
    NotReady,
    /// The editor was closed while a call was in flight.
    Discarded,
}

impl SubmissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::Blocked(_) => "blocked",
            Self::ReadyToConfirm { .. } => "ready_to_confirm",
            Self::Saved(_) => "saved",
            Self::Recovered(_) => "recovered",
            Self::AwaitingReconfirmation { .. } => "awaiting_reconfirmation",
            Self::ScopeOccupied { .. } => "scope_occupied",
            Self::NotLocated => "not_located",
            Self::Abandoned => "abandoned",
            Self::Failed(_) => "failed",
            Self::NotReady => "not_ready",
            Self::Discarded => "discarded",
        }
    }

    /// The stored record, for outcomes that produced one.
    pub fn record(&self) -> Option<&FactorRecord> {
        match self {
            Self::Saved(record) | Self::Recovered(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.record().is_some()
    }
}

/// Drives one editor session from validation to a stored record.
#[derive(Debug)]
pub struct SubmissionController {
    session: EditorSession,
    config: EditorConfig,
    state: SubmissionState,
    /// The precheck only runs before the first write.
    wrote_once: bool,
}

impl SubmissionController {
    pub fn new(session: EditorSession, config: EditorConfig) -> Self {
        Self {
            session,
            config,
            state: SubmissionState::Editing,
            wrote_once: false,
        }
    }

    pub fn session(&self) -> &EditorSession {
        &self.session
    }

    /// Mutable access for field edits. Any pending confirmation is dropped.
    pub fn session_mut(&mut self) -> &mut EditorSession {
        if self.state == SubmissionState::AwaitingConfirmation {
            self.state = SubmissionState::Editing;
        }
        &mut self.session
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn close_signal(&self) -> CloseSignal {
        self.session.close_signal().clone()
    }

    /// Validate, then run the duplicate precheck.
    pub async fn prepare<A>(&mut self, api: &A, notifier: &dyn NotificationSink) -> SubmissionOutcome
    where
        A: FactorApi + ?Sized,
    {
        if self.session.is_closed() {
            return SubmissionOutcome::Discarded;
        }
        if self.state == SubmissionState::Done {
            return SubmissionOutcome::NotReady;
        }

        let errors = validate(self.session.form());
        if !errors.is_empty() {
            tracing::debug!(fields = errors.len(), "Validation failed");
            self.state = SubmissionState::Editing;
            return self.finish(SubmissionOutcome::Invalid(errors), notifier);
        }

        if self.config.precheck_enabled && !self.wrote_once {
            let creating = self.session.write_target() == WriteTarget::Create;
            let exclude = self.session.known_ids();
            let finding = find_duplicate(
                api,
                self.session.form(),
                creating,
                &exclude,
                self.config.search_page_size,
            )
            .await;
            if self.session.is_closed() {
                return SubmissionOutcome::Discarded;
            }
            if let Some(finding) = finding {
                self.state = SubmissionState::Editing;
                return self.finish(SubmissionOutcome::Blocked(finding), notifier);
            }
        }

        self.state = SubmissionState::AwaitingConfirmation;
        SubmissionOutcome::ReadyToConfirm {
            summary: self.summary(),
        }
    }

    /// Write, and recover from a conflict when the failure allows it.
    pub async fn confirm<A>(&mut self, api: &A, notifier: &dyn NotificationSink) -> SubmissionOutcome
    where
        A: FactorApi + ?Sized,
    {
        if self.session.is_closed() {
            return SubmissionOutcome::Discarded;
        }
        if self.state != SubmissionState::AwaitingConfirmation {
            return SubmissionOutcome::NotReady;
        }
        self.state = SubmissionState::Editing;

        let target = self.session.write_target();
        let payload = build_payload(self.session.form(), self.session.previous_record());
        tracing::debug!(?target, rows = %row_summary(&payload), "Writing factor");
        let result = match target {
            WriteTarget::Create => api.create(&payload).await,
            WriteTarget::Update { id } => api.update(id, &payload).await,
        };
        self.wrote_once = true;
        if self.session.is_closed() {
            tracing::debug!("Editor closed during write, discarding result");
            return SubmissionOutcome::Discarded;
        }

        match result {
            Ok(record) => self.saved(SubmissionOutcome::Saved(record), notifier),
            Err(err) => self.recover(api, notifier, err).await,
        }
    }

    /// `prepare` then `confirm`, for callers that need no confirmation step.
    pub async fn submit<A>(&mut self, api: &A, notifier: &dyn NotificationSink) -> SubmissionOutcome
    where
        A: FactorApi + ?Sized,
    {
        match self.prepare(api, notifier).await {
            SubmissionOutcome::ReadyToConfirm { .. } => self.confirm(api, notifier).await,
            other => other,
        }
    }

    async fn recover<A>(
        &mut self,
        api: &A,
        notifier: &dyn NotificationSink,
        err: ApiError,
    ) -> SubmissionOutcome
    where
        A: FactorApi + ?Sized,
    {
        let close = self.close_signal();
        let key = self.session.form().key();
        let exclude = self.session.known_ids();
        let replaced = self.session.previous_record().cloned();
        let ctx = ConflictContext {
            change_type: self.session.change_type(),
            key: &key,
            scope: self.session.form().scope,
            replaced: replaced.as_ref(),
            exclude: &exclude,
        };
        let resolver = ConflictResolver::new(
            api,
            &close,
            self.config.classify_policy(),
            self.config.search_page_size,
        );
        let resolution = resolver
            .resolve(&err, &ctx, self.session.guards_mut())
            .await;

        match resolution {
            Resolution::Corrective { cause, target } => {
                tracing::info!(
                    id = target.id,
                    scope = %target.scope,
                    ?cause,
                    "Converting failed write into an update of the existing record"
                );
                let target_id = target.id;
                self.session.convert_to_edit(target.clone());
                let payload = build_payload(self.session.form(), Some(&target));
                tracing::debug!(rows = %row_summary(&payload), "Corrective update");
                let result = api.update(target_id, &payload).await;
                if close.is_closed() {
                    tracing::debug!("Editor closed during corrective update, discarding result");
                    return SubmissionOutcome::Discarded;
                }
                match result {
                    Ok(record) => self.saved(SubmissionOutcome::Recovered(record), notifier),
                    Err(e) => self.finish(SubmissionOutcome::Failed(e), notifier),
                }
            }
            Resolution::NotLocated { .. } => self.finish(SubmissionOutcome::NotLocated, notifier),
            Resolution::Abandoned { .. } => self.finish(SubmissionOutcome::Abandoned, notifier),
            Resolution::ScopeUniqueness { occupied, replaced } => {
                let selected = self.session.form().scope;
                if replaced.is_none() {
                    return self.finish(
                        SubmissionOutcome::ScopeOccupied { scope: selected },
                        notifier,
                    );
                }
                // The refused update target stays put; the reconfirmed write
                // creates a new record with fresh rows in the selected scope.
                self.session.forget_known(selected);
                self.state = SubmissionState::AwaitingConfirmation;
                self.finish(SubmissionOutcome::AwaitingReconfirmation { occupied }, notifier)
            }
            Resolution::Unclassified => self.finish(SubmissionOutcome::Failed(err), notifier),
            Resolution::LocateFailed(e) => {
                tracing::warn!("Could not look up the conflicting record: {}", e);
                self.finish(SubmissionOutcome::Failed(err), notifier)
            }
            Resolution::Discarded => SubmissionOutcome::Discarded,
        }
    }

    fn saved(&mut self, outcome: SubmissionOutcome, notifier: &dyn NotificationSink) -> SubmissionOutcome {
        if let Some(record) = outcome.record() {
            tracing::info!(
                id = record.id,
                scope = %record.scope,
                change_type = %record.change_type(),
                outcome = outcome.as_str(),
                "Factor saved"
            );
            self.session.record_saved(record.clone());
        }
        self.state = SubmissionState::Done;
        let outcome = self.finish(outcome, notifier);
        self.session.close();
        outcome
    }

    /// Emit the single notification an outcome calls for.
    fn finish(&self, outcome: SubmissionOutcome, notifier: &dyn NotificationSink) -> SubmissionOutcome {
        let form = self.session.form();
        let label = form.change_type().label();
        let key = form.key().describe();
        let scope = form.scope.label();

        match &outcome {
            SubmissionOutcome::Invalid(errors) => notifier.warning(&format!(
                "Fix {} field(s) before saving the {label} factor: {errors}",
                errors.len()
            )),
            SubmissionOutcome::Blocked(finding) => notifier.warning(&finding.to_string()),
            SubmissionOutcome::Saved(record) => notifier.success(&format!(
                "{label} factor for {key} saved in {} (record {}).",
                record.scope.label(),
                record.id
            )),
            SubmissionOutcome::Recovered(record) => notifier.success(&format!(
                "A {label} factor for {key} already existed; record {} in {} was updated instead.",
                record.id,
                record.scope.label()
            )),
            SubmissionOutcome::AwaitingReconfirmation { occupied } => notifier.warning(&format!(
                "{} already has a {label} factor, so it was not updated. Confirm again to create a new {label} factor for {key} in {scope}.",
                occupied.label()
            )),
            SubmissionOutcome::ScopeOccupied { scope } => notifier.warning(&format!(
                "{} already has a {label} factor. Edit that record instead of creating another one.",
                scope.label()
            )),
            SubmissionOutcome::NotLocated => notifier.warning(&format!(
                "Could not locate the existing {label} record for {key} in {}. Resolve the conflict manually.",
                searched_scopes(form.change_type(), form.scope)
            )),
            SubmissionOutcome::Abandoned => notifier.warning(&format!(
                "The {label} factor for {key} still conflicts with an existing record. Edit the existing record manually."
            )),
            SubmissionOutcome::Failed(err) => notifier.error(&failure_message(err, label, &key)),
            SubmissionOutcome::ReadyToConfirm { .. }
            | SubmissionOutcome::NotReady
            | SubmissionOutcome::Discarded => {}
        }
        outcome
    }

    fn summary(&self) -> String {
        let form = self.session.form();
        let label = form.change_type().label();
        let key = form.key().describe();
        match self.session.write_target() {
            WriteTarget::Create => {
                format!("Create {label} factor for {key} in {}.", form.scope.label())
            }
            WriteTarget::Update { id } => format!(
                "Update {label} factor {id} ({key}) in {}.",
                form.scope.label()
            ),
        }
    }
}

fn searched_scopes(change_type: ChangeType, scope: Scope) -> String {
    match change_type {
        ChangeType::Deforestation => format!("{} or {}", scope.label(), scope.sibling().label()),
        _ => scope.label().to_string(),
    }
}

/// User-facing text for a failed write. Backend text is always paired with
/// the record it concerns.
fn failure_message(err: &ApiError, label: &str, key: &str) -> String {
    match err {
        ApiError::NotFound { id } => {
            format!("The {label} factor record {id} no longer exists. Reload and try again.")
        }
        _ => match err.backend_message() {
            Some(message) => format!("Could not save the {label} factor for {key}: {message}"),
            None => format!("Could not save the {label} factor for {key}. Try again later."),
        },
    }
}
