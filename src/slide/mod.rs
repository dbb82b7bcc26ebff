//! In-memory products of the structural walk: the file abstraction and
//! the offset-ordered file map.

pub mod abstraction;
pub mod file_map;

#[cfg(feature = "remote")]
pub mod remote;
