pub mod fetch;
pub mod verify;
