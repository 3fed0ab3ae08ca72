// Console front end for the ballot client: rendering, command parsing, and
// the viewer and admin input loops.

pub mod admin;
pub mod command;
pub mod console;
pub mod input;
