mod handler;
mod model;

pub use handler::{login, signup};
pub use model::{AuthResponse, LoginRequest, SignupRequest};
