pub mod metadata;
pub mod projects;

pub use metadata::{FileMetadataStore, MetadataStore, WorktreeMetadata};
pub use projects::{JsonProjectRegistry, Project, ProjectRegistry};
