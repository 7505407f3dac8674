pub mod actions;
pub mod callbacks;
pub mod events;
pub mod health;
pub mod notifications;
