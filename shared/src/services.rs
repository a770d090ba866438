pub mod graphql_service;
pub mod profile_service;
pub mod signup_service;

pub use graphql_service::*;
pub use profile_service::*;
pub use signup_service::*;
