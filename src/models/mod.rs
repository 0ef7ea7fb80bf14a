pub mod picker;
pub mod token;
