//! Repository traits for metadata operations.

pub mod objects;
pub mod pins;

pub use objects::ObjectRepo;
pub use pins::PinRepo;
