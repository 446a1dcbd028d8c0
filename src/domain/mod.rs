pub mod audit;
pub mod callback;
pub mod error;
pub mod id;
pub mod money;
pub mod provider;
pub mod request;
pub mod transaction;
