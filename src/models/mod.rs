// src/models/mod.rs

pub mod catalog;
pub mod task;

pub use catalog::{CatalogCandidate, CatalogSnapshot};
pub use task::{
    DownloadTask, ProgressSnapshot, TaskEvent, TaskEventKind, TaskId, TaskRecord, TaskStatus,
};
