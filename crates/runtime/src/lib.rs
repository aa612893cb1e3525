pub mod diagnostics;
pub mod frame;
pub mod host;
pub mod interaction;
pub mod metrics;

pub use diagnostics::*;
pub use frame::*;
pub use host::*;
pub use interaction::*;
pub use metrics::*;
