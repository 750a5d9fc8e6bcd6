//! Data source implementations

pub mod iam;

pub use iam::UsersDataSource;
