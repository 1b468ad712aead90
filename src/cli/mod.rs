//! Terminal commands that run against the store without the HTTP service.

pub mod doctor;
pub mod ingest;
pub mod re_embed;
pub mod search;
pub mod stats;

pub use doctor::doctor;
pub use ingest::ingest;
pub use re_embed::re_embed;
pub use search::search;
pub use stats::stats;
