//! Batched combine-and-write into a chunked array store.

pub mod combine;
pub mod dataset;
pub mod error;
pub mod locator;
pub mod source;
pub mod stages;
pub mod store;
pub mod target;

pub use combine::{combine_and_write, combine_and_write_report, combine_sources, CombineReport};
pub use dataset::{Attrs, Dataset, Variable};
pub use error::{BakeryError, Result};
pub use locator::{Locator, Resolver};
pub use source::{decode_source, encode_source, open_source, open_sources};
pub use stages::{ChunkStage, CombineAndWriteStage, PipelineStage, RecipeRunner};
pub use store::{LocalFsStore, MemoryStore, ObjectStore, StoreMapper};
pub use target::{open_store, read_summary, select_write_mode, write_dataset, StoreSummary, WriteMode};
