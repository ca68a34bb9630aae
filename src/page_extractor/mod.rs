//! In-page harvesting of state that is not part of the visible content.

pub mod hidden_state;
pub mod js_scripts;
pub mod schema;

pub use hidden_state::{extract_hidden_state, harvest_static, normalize_links, parse_json_ld_blocks};
pub use schema::{HYDRATION_SOURCES, HiddenState, HydrationSource, PageMetadata};
