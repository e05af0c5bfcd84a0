pub mod actions;
pub mod animation;
pub mod changes;
pub mod controller;
pub mod controls;
pub mod error;
pub mod home_assistant;
pub mod lights;
pub mod notes;
pub mod score;
pub mod session;
