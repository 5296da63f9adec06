//! Migration from the secrets store to 1Password.
//!
//! A migration runs in two separate invocations: [`plan::build_plan`] turns
//! directory trees into a reviewable YAML plan, and [`apply::apply_plan`]
//! pushes the values it references into a [`apply::PasswordManager`].
//! [`references::rewrite`] updates config files to point at the new location.

pub mod apply;
pub mod classify;
pub mod plan;
pub mod references;

pub use apply::{apply_plan, ApplyOptions, ApplySummary, FieldValue, PasswordManager};
pub use classify::{is_single_item, should_be_concealed};
pub use plan::{build_plan, Field, Item, Plan, PlanBuilder, Vault};
pub use references::{rewrite, ReferenceMap, Rewrite, Syntax};

/// File name used when no plan file is given.
pub const DEFAULT_PLAN_FILE: &str = "secrethub-1password-plan.yml";
