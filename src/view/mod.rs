pub mod command;
pub mod render;
pub mod state;
pub mod summary;

pub use command::Command;
pub use render::Renderer;
pub use state::{DashboardState, DataSource};
