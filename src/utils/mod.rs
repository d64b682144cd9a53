pub mod response;
pub mod tui;
