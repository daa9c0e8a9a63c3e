mod handler;
mod model;

pub use handler::{create_group, delete_group, get_created, get_members, join_group, leave_group};
pub use model::{
    CreateGroupRequest, CreateGroupResponse, GroupRequest, JoinGroupRequest, JoinGroupResponse,
    LeaveGroupResponse, MembershipError, UserQuery,
};
