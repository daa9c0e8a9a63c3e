mod handler;
mod model;

pub use handler::get_messages;
pub use model::{MAX_MESSAGE_LEN, MessagesQuery};
