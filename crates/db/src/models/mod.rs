//! Database row structs.
//!
//! Each submodule contains a `FromRow` + `Serialize` struct matching the
//! table row and a `TryFrom` conversion into the core domain type. Stored
//! status and operation codes are validated on the way out.

pub mod record;
pub mod revision;
pub mod version;
