pub mod builder;
pub mod labels;
pub mod layer;
pub mod registry;
pub mod settings;
pub mod style;
pub mod vector;

pub use builder::*;
pub use labels::*;
pub use layer::*;
pub use registry::*;
pub use settings::*;
pub use style::*;
pub use vector::*;
