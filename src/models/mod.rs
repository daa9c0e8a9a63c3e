// 持久化实体，服务端与客户端共用

mod group;
mod location;
mod message;
mod user;

pub use group::{Group, GroupSummary, JoinedGroup, MemberLocation, MemberView};
pub use location::Location;
pub use message::ChatMessage;
pub use user::User;
