// Library module organization

pub mod auth;
pub mod config;
pub mod errors;
pub mod printers;
pub mod routes;
pub mod state;
pub mod upload;

// Re-export commonly used types for convenience
pub use config::Config;
pub use errors::{AppError, AppResult, SpoolerError};
pub use printers::{
    list_printers, parse_default_destination, parse_job_id, parse_printer_listing, print_image,
    resolve_printer, LpSpooler, MockOutcome, MockSpooler, PrintReceipt, PrinterDirectory,
    PrinterListing, Spooler, SubmitRequest,
};
pub use state::AppState;
