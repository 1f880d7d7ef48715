pub mod display;
pub mod overview;
