//! Terminal front end: line-based input and text or JSON screens.

pub mod input_reader;
pub mod screen;
