//! # sr-model
//!
//! Identity and configuration value types shared by realms and mechanisms.
//!
//! - [`RealmPrincipal`] - user, group and role identities, optionally
//!   qualified by the realm that vouched for them
//! - [`Subject`] - the set of principals an authentication produced
//! - [`PropertyList`] - name/value options attached to a mechanism
//! - [`SharedState`] - values handed from authentication to authorization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod principal;
pub mod property;
pub mod state;
pub mod subject;

pub use error::{ModelError, ModelResult};
pub use principal::{PrincipalKind, RealmPrincipal};
pub use property::PropertyList;
pub use state::SharedState;
pub use subject::Subject;
