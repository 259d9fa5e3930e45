pub mod assignment;
pub mod courier;
pub mod message;
pub mod order;
pub mod user;
