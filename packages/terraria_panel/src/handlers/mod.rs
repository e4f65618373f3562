pub mod command;
pub mod console;
pub mod page;
pub mod status;

pub use command::command_handler;
pub use console::console_ws_handler;
pub use page::index_handler;
pub use status::{health_handler, status_handler};
