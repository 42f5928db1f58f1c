pub mod clock;
pub mod timezone;
