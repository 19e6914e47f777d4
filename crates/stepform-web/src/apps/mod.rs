pub mod calendar;
pub mod civs;
