pub mod extract;
pub mod pipeline;
pub mod segment;
pub mod status;
pub mod templates;
pub mod verify;
