pub mod buffers;
pub mod context;
pub mod pipeline;
pub mod recording;
pub mod render_graph;
pub mod renderer;
pub mod textures;
pub mod view;

pub use buffers::*;
pub use context::*;
pub use pipeline::*;
pub use recording::*;
pub use render_graph::*;
pub use renderer::*;
pub use textures::*;
pub use view::*;
