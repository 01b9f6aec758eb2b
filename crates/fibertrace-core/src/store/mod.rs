pub mod cache;
pub mod catalog;
pub mod document;
pub mod geometry;
pub mod snapshot;
