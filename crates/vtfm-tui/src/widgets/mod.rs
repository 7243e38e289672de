pub mod marquee;
pub mod pane_chrome;
pub mod toast;
