/// UI widgets for Buschla.

pub mod status_bar;
pub mod toolbar;
