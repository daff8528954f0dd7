mod command;
mod handler;
mod response;
pub mod server;

pub use command::{Command, parse_command};
pub use handler::handle;
pub use response::Response;
