pub mod chat;
pub mod conversations;
pub mod debate;
pub mod health;
pub mod models;
