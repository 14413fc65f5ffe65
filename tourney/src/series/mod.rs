//! Best-of-N series played under a single bracket match.

pub mod models;
pub(crate) mod tracker;

pub use models::{Series, SeriesId, SeriesStatus};
