//! GitLab repository access.

pub mod client;

pub use client::{GitLabClient, TreeEntry};
