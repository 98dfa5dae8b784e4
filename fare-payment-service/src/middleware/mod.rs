pub mod user;

pub use user::{AdminContext, UserContext, ADMIN_ID_HEADER, USER_ID_HEADER};
