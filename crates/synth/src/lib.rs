//! Declarative resource graph for the Nimbus GPU service stack.
//!
//! This crate builds one thing: a deployment template for a GPU-backed
//! container service behind a public load balancer, with automatic
//! scale-to-zero on sustained idleness. Nothing here runs at runtime — the
//! cloud control plane executes the template; this code only assembles and
//! emits it.
//!
//! # Example
//!
//! ```rust
//! use nimbus_synth::{stack, SynthContext};
//!
//! let ctx = SynthContext::from_pairs(["cheapVpc=true"])?;
//! let template = stack::synthesize(&ctx)?;
//! println!("{}", template.to_json()?);
//! # Ok::<(), nimbus_synth::Error>(())
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod error;
pub mod graph;
pub mod nag;
pub mod stack;
pub mod template;

pub use context::SynthContext;
pub use error::{Error, Result};
pub use nag::Suppressions;
pub use template::{DeletionPolicy, LogicalId, Output, Resource, Template};
