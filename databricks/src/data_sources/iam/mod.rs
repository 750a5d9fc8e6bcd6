pub mod data_source_users;

pub use data_source_users::UsersDataSource;
