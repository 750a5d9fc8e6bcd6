//! Identity and access management (SCIM) endpoints

pub mod users;

pub use users::{User, UserFilter, UsersApi};
