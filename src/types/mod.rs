pub mod conversation;
pub mod events;
pub mod message;
pub mod presence;
pub mod wire;
