pub mod actions;
pub mod index;
pub mod servers;
