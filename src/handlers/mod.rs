pub mod calls;
pub mod users;

pub use calls::*;
pub use users::*;
