//! Use-case services.
//!
//! # Responsibility
//! - Expose the operations the delivery layer calls.
//! - Stay storage-agnostic: services hold trait objects, never a concrete
//!   repository.

pub mod contact;
pub mod group;

pub use contact::ContactUseCase;
pub use group::GroupUseCase;
