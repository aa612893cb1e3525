pub mod font_atlas;
pub mod geojson;

pub use font_atlas::*;
pub use geojson::*;
