//! Contacts and group memberships over HTTP, backed by PostgreSQL.
//!
//! Layers, outermost first: [`delivery`] → [`usecase`] → [`repository`], all
//! speaking [`domain`] types.

pub mod config;
pub mod delivery;
pub mod domain;
pub mod repository;
pub mod telemetry;
pub mod usecase;

pub use config::{Config, ConfigError};
pub use delivery::http::{router, AppState};
pub use domain::{Contact, ContactDetails, Group, GroupDetails, QueryParameter};
pub use repository::{
    ContactInGroupStorage, ContactStorage, GroupRepository, GroupStorage, MemoryStorage,
    PgRepository, RepoError, RepoResult,
};
pub use usecase::{ContactUseCase, GroupUseCase};
