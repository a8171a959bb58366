//! refindex - an index of reference codes found in PDF documents.
//!
//! Every PDF under a documents directory is scanned for a trigger literal
//! (`Ref:` by default) followed by a code. Pages without a usable text layer
//! go through OCR. Each document is dated from its filename, falling back
//! to its modification time, and the resulting code → documents index is
//! persisted as JSON and answered with substring queries, newest first.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use refindex::{DataDir, IndexStore, Settings, ingestion, search};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let store = IndexStore::new(data_dir.index_file());
//! let settings = Settings::default();
//!
//! let index = store
//!     .load_or_build(|| {
//!         let documents = data_dir.documents_dir(None);
//!         ingestion::build_from_dir(&documents, &settings, &AtomicBool::new(false))
//!             .map(|(index, _)| index)
//!     })
//!     .unwrap();
//!
//! let results = search::search(&index, &["abc-123"]);
//! for t in results.iter() {
//!     for e in &t.entries {
//!         println!("{} {} {} {:?}", e.period, e.code, e.document_id, e.pages);
//!     }
//! }
//! ```

pub mod cli;
pub mod codes;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod extract;
pub mod index;
pub mod indexer;
pub mod ingestion;
pub mod period;
pub mod search;
pub mod server;
pub mod snapshot;
pub mod strategy;
pub mod walker;

pub use codes::CodeExtractor;
pub use config::Settings;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use index::{CodeIndex, IndexEntry, IndexStore};
pub use indexer::DocumentIndexer;
pub use period::{DateResolver, Period};
pub use snapshot::SharedIndex;
