//! The scope-partitioned factor editor.
//!
//! Leaves first:
//!
//! - [`validator`]: declarative field rules per change type and sub-type
//! - [`scope_store`]: the two per-scope caches of independent values
//! - [`matcher`]: duplicate-key predicates shared by everything below
//! - [`payload`]: write bodies that keep child-row ids
//! - [`precheck`]: best-effort duplicate search before the first write
//! - [`conflict`]: failure classification, guards and owner lookup
//! - [`session`]: one open editor
//! - [`submission`]: the validate → precheck → confirm → write → recover
//!   state machine
//! - [`notify`]: notification sinks

pub mod conflict;
pub mod matcher;
pub mod notify;
pub mod payload;
pub mod precheck;
pub mod scope_store;
pub mod session;
pub mod submission;
pub mod validator;

pub use conflict::{ClassifyPolicy, ConflictAttemptState, ConflictCause, classify};
pub use notify::{
    ConsoleNotifier, Notification, NotificationLevel, NotificationSink, RecordingNotifier,
    TracingNotifier,
};
pub use precheck::DuplicateFinding;
pub use scope_store::{PerScope, ScopeFieldSet, ScopeFieldStore};
pub use session::{CloseSignal, EditorMode, EditorSession, WriteTarget};
pub use submission::{SubmissionController, SubmissionOutcome, SubmissionState};
pub use validator::{FieldErrors, Rule, rules_for, validate, validate_field};
