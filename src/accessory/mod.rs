pub mod events;
pub mod host;
pub mod lightbulb;
