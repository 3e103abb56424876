pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod fetch;
pub mod live;
pub mod model;
pub mod nearby;
pub mod output;
pub mod report;
pub mod store;
pub mod sync;
