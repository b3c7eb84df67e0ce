//! ProfitBricks modules - declarative cloud resource reconciliation.
//!
//! A library (and a single binary) that converges ProfitBricks / IONOS
//! Enterprise cloud resources onto a declared state:
//! - **Datacenters** and **LANs**: created, updated or deleted by name or id
//! - **Servers**: batch creation with boot volume and NICs, update, delete, power on/off
//! - **Volumes**: batch creation, attach to a server, resize, delete
//! - **NICs**: created on a server, updated, deleted
//!
//! Every mutation is followed by a wait on the provider request it issued,
//! and every run reports a `changed` flag so re-running a declaration is a no-op.
//!
//! ## Quick Start
//!
//! Credentials come from the module parameters or from the environment
//! (a `.env` file is honored):
//!
//! ```text
//! PROFITBRICKS_USERNAME=you@example.com
//! PROFITBRICKS_PASSWORD=secret
//! PROFITBRICKS_API_URL=https://api.ionos.com/cloudapi/v5   # optional
//! ```
//!
//! ```ignore
//! use profitbricks_modules::{ModuleKind, run_module};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let result = run_module(
//!         ModuleKind::Server,
//!         json!({
//!             "datacenter": "Tardis One",
//!             "name": "web%02d",
//!             "count": 3,
//!             "image": "ubuntu:latest",
//!             "assign_public_ip": true,
//!         }),
//!     )
//!     .await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```

// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy for strict discipline
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() is discouraged
#![warn(clippy::expect_used)]         // expect() is discouraged
#![warn(clippy::panic)]               // panic!() is discouraged
#![warn(clippy::print_stdout)]        // println!() is discouraged in library code
#![warn(clippy::todo)]                // TODO is discouraged
#![warn(clippy::unimplemented)]       // unimplemented!() is discouraged
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result is discouraged
#![warn(clippy::redundant_clone)]     // Useless clones are discouraged
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Modules
// ============================================================================

/// Cloud API resource model.
///
/// Resource envelopes, property bags, create bodies and enumerated options.
pub mod profitbricks_types;

/// Error taxonomy shared by every module.
pub mod profitbricks_error;

/// The `CloudApi` trait reconcilers are written against.
pub mod profitbricks_api;

/// HTTP client for the Cloud API.
///
/// Use this module to talk to the live API with retries and pagination.
pub mod profitbricks_client;

/// Name and id resolution against listed resources.
pub mod profitbricks_resolver;

/// Name templates for batch creation.
pub mod profitbricks_naming;

/// Desired state and action planning.
pub mod profitbricks_state;

/// Request and power-state waiters.
pub mod profitbricks_waiter;

/// Module parameters.
pub mod profitbricks_params;

/// Success and failure envelopes.
pub mod profitbricks_result;

/// Module dispatch and the reconcile context.
pub mod profitbricks_module;

/// Datacenter reconciler.
pub mod profitbricks_datacenter;

/// LAN reconciler.
pub mod profitbricks_lan;

/// Server reconciler.
pub mod profitbricks_server;

/// Volume reconciler.
pub mod profitbricks_volume;

/// NIC reconciler.
pub mod profitbricks_nic;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use profitbricks_api::{Accepted, ApiResult, CloudApi};
pub use profitbricks_client::{ApiError, ClientConfig, ProfitbricksClient};
pub use profitbricks_error::{ProfitbricksError, Result};
pub use profitbricks_module::{ModuleKind, ReconcileContext, run_module, run_with_api};
pub use profitbricks_result::{Action, ModuleFailure, ModuleResult};
pub use profitbricks_state::{DesiredState, PlannedAction, PowerState};
pub use profitbricks_waiter::WaitPolicy;
