pub mod account;
pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod environment;
pub mod error;
pub mod generate;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod onepassword;
pub mod output;
pub mod paths;
pub mod store;
pub mod template;
pub mod tree;

// Re-export commonly used types for tests and external use
pub use client::{PathKind, SecretVersion, SecretVersionInfo, SecretsClient};
pub use paths::{DirPath, SecretPath, Version};
pub use store::LocalStore;
pub use tree::Tree;
