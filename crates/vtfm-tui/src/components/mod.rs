pub mod header;
pub mod log_panel;
pub mod onboarding;
pub mod quality_bar;
pub mod station_list;
