pub mod client;
pub mod device;
pub mod sync;
pub mod token;
