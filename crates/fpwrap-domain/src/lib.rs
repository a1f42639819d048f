#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod alias;
pub mod app;
pub mod export;
pub mod naming;

pub use alias::{AliasError, AliasTable, ALIAS_RESOLVE_LIMIT};
pub use app::{ApplicationId, IdError};
pub use export::{ExportDocument, EXPORT_VERSION};
pub use naming::{sanitize, LaunchTarget, WrapperName};
