pub mod analyze;
pub mod build;
pub mod series;
pub mod setup;
pub mod ui;
pub mod update;
