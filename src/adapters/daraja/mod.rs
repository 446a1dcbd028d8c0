pub mod callback;
pub mod client;
pub mod initiate;
pub mod security;
pub mod token;
