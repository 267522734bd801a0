//! Shared resource model, label/id query language and error taxonomy for
//! the controller runtime.
//!
//! This crate has no notion of a store, a watch stream or a controller — it
//! only defines the vocabulary ([`Resource`], [`Pointer`], [`LabelQuery`])
//! that every other crate in the workspace builds on.

pub mod error;
pub mod idquery;
pub mod labels;
pub mod metadata;
pub mod pointer;
pub mod resource;

pub use error::{Error, Result};
pub use idquery::IdQuery;
pub use labels::{LabelQuery, LabelTerm, Op};
pub use metadata::{Finalizers, Metadata, Phase, Version};
pub use pointer::{Kind, Pointer};
pub use resource::Resource;
