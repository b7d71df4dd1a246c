#![forbid(unsafe_code)]

pub mod repository;

pub use repository::{
    InMemoryProgressStore, InMemorySessionArchive, ProgressStore, SessionArchive, Storage,
    StorageError,
};
