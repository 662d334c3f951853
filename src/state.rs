use actix_web::web;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::printers::{self, LpSpooler, MockSpooler, Spooler};

/// Centralized application state container
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub spooler: Arc<dyn Spooler>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let spooler = Self::initialize_spooler(&config);
        Self { config, spooler }
    }

    pub fn with_spooler(config: Config, spooler: Arc<dyn Spooler>) -> Self {
        Self { config, spooler }
    }

    fn initialize_spooler(config: &Config) -> Arc<dyn Spooler> {
        if config.printer.use_mock {
            warn!("PRINT_USE_MOCK is set; jobs will not reach a real printer");
            Arc::new(MockSpooler::new())
        } else {
            Arc::new(LpSpooler::from_config(&config.printer))
        }
    }

    /// Logs the printer that would be used right now.
    pub async fn log_printer(&self) {
        match printers::resolve_printer(&self.config.printer, self.spooler.as_ref()).await {
            Some(name) => info!("Printer: {} (via {})", name, self.spooler.type_name()),
            None => warn!("Printer: Not configured (no PRINTER_NAME and no CUPS default)"),
        }
    }

    /// Registers the shared data every route extracts.
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.config.clone()))
            .app_data(web::Data::new(self.spooler.clone()));
    }
}
