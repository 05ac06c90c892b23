//! Turning raw export bytes into [`crate::types::RawTable`]s.
//!
//! - [`source`]: batch inputs ([`SourceFile`]) and container sniffing
//! - [`loader`]: the strategy chain ([`FileLoader`])
//! - [`excel`], [`text`], [`archive`]: the readers the chain is built from
//! - [`observability`]: per-file outcome reporting ([`ReconcileObserver`])

pub mod archive;
pub mod excel;
pub mod loader;
pub mod observability;
pub mod source;
pub mod text;

pub use loader::{FileLoader, Loaded};
pub use observability::{
    CompositeObserver, FileContext, FileObserver, FileStats, ReconcileObserver, Severity, StdErrObserver,
};
pub use source::{batch_from_dir, batch_from_glob, FileKind, SourceFile};
