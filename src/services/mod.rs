pub mod categorizer_service;
pub mod forecasting_service;
pub mod horizon_service;
pub mod series_service;
pub mod spreadsheet_import_service;
pub mod trend_model;
