//! Application services layer: engine contracts and the cached repository.

pub mod blog;
pub mod content;
pub mod pagination;
pub mod repos;
