pub mod feature;
pub mod hover;
pub mod picking;
pub mod spatial;

pub use feature::*;
pub use hover::*;
pub use picking::*;
pub use spatial::*;
