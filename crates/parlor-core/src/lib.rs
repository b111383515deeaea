pub mod codes;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
