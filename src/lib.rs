pub mod args;
pub mod date;
pub mod es;
pub mod retention;
