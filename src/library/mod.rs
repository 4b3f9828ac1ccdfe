//! Track catalog: metadata model, upstream sources, and the loaded store.

pub mod catalog_source;
pub mod catalog_store;
pub mod track;
