pub mod incidents;
pub mod info;
pub mod seed;
pub mod verify;
