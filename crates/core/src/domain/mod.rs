pub mod conversation;
pub mod employee;
pub mod leave;
pub mod message;
