//! Domain model for the media index: system definitions, slug
//! normalization, catalog rows, filters and search results.
//!
//! Nothing here touches storage. `retro-index-db` persists these types.

pub mod slug;
pub mod system;
pub mod types;

pub use slug::{filename_from_path, is_latin, slug_metadata, slugify, slugify_path, SlugMetadata};
pub use system::{MediaType, SystemDef, SystemParseError};
pub use types::*;
