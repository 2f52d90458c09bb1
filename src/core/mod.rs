pub mod capability;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod profile;
pub mod rate_limit;
pub mod scope;
