//! Administrative request routing.

pub mod dispatcher;

pub use dispatcher::AdminDispatcher;
