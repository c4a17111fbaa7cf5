//! Editor core for MUT (land-use change) emission factors.
//!
//! A factor record lives in exactly one reporting scope and carries the
//! child rows of exactly one change type. The [`editor`] module drives a
//! single editor session from field validation through the duplicate
//! precheck, the write, and conflict recovery against the backend described
//! by the [`api`] traits.

pub mod api;
pub mod config;
pub mod editor;
pub mod error;
pub mod model;
pub mod settings;

pub use api::{FactorApi, FactorLookup, FactorSearch, FactorWriter};
pub use config::Config;
pub use editor::{EditorSession, SubmissionController, SubmissionOutcome};
pub use error::{ApiError, BackendError, ConfigError, DraftError};
pub use model::{ChangeType, FactorForm, FactorRecord, Scope};
pub use settings::Settings;
