//! User records on the item store: registration, lookup and activation.
//!
//! A user occupies one partition, `USER#<email>`, holding a profile row and,
//! until activation, one token row. Registration writes both rows in one
//! conditional transaction, which is the only thing keeping emails unique.
//! Activation flips the profile's `active` flag and deletes the token row in
//! a second transaction, so the token can be consumed once.

pub mod error;
pub mod record;
pub mod service;
pub mod validation;

pub use error::UserError;
pub use record::UserRow;
pub use service::UserService;
pub use validation::{ValidatedRegistration, validate};
