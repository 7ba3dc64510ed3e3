mod position;
mod user;

pub use position::*;
pub use user::*;
