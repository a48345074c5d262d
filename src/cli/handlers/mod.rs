mod investigate;
mod serve;

pub use investigate::handle_investigate_command;
pub use serve::handle_serve_command;
