// CUPS print spooler access through its command-line interface (`lp`, `lpstat`).

use async_trait::async_trait;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::PrinterConfig;
use crate::errors::SpoolerError;

/// Upper bound for `lpstat` queries.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for `lp` submissions.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_DESTINATION_MARKER: &str = "system default destination:";
const JOB_ID_MARKER: &str = "request id is";
const PRINTER_LINE_PREFIX: &str = "printer ";

pub const SUBMIT_SUCCESS_MESSAGE: &str = "Print job submitted successfully";

/// Everything `lp` needs for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub destination: String,
    pub copies: u32,
    pub options: Vec<String>,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintReceipt {
    pub job_id: Option<String>,
}

impl PrintReceipt {
    pub fn message(&self) -> &'static str {
        SUBMIT_SUCCESS_MESSAGE
    }
}

/// What `lpstat -p -d` reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrinterListing {
    pub printers: Vec<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrinterDirectory {
    pub printers: Vec<String>,
    pub default: Option<String>,
    /// Pinned printer name, empty when none is pinned.
    pub configured: String,
}

#[async_trait]
pub trait Spooler: Send + Sync {
    /// The spooler's default destination, or `None` when it has none or
    /// cannot be asked.
    async fn default_destination(&self) -> Option<String>;

    /// Queue a job; returns the spooler-assigned job id when it reported one.
    async fn submit(&self, request: &SubmitRequest) -> Result<Option<String>, SpoolerError>;

    async fn list(&self) -> Result<PrinterListing, SpoolerError>;

    fn type_name(&self) -> &'static str;
}

// ============================================================================
// Output parsing
// ============================================================================

/// Extracts `<name>` from `system default destination: <name>`.
pub fn parse_default_destination(stdout: &str) -> Option<String> {
    let (_, rest) = stdout.split_once(DEFAULT_DESTINATION_MARKER)?;
    let name = rest.lines().next().unwrap_or("").trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Extracts `<id>` from `request id is <id> (1 file(s))`.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    let (_, rest) = stdout.split_once(JOB_ID_MARKER)?;
    rest.split_whitespace().next().map(str::to_string)
}

/// Parses `lpstat -p -d` output. Printer order is kept as emitted.
pub fn parse_printer_listing(stdout: &str) -> PrinterListing {
    let mut listing = PrinterListing::default();

    for line in stdout.lines() {
        if line.starts_with(PRINTER_LINE_PREFIX) {
            if let Some(name) = line.split_whitespace().nth(1) {
                listing.printers.push(name.to_string());
            }
        } else if line.contains(DEFAULT_DESTINATION_MARKER) {
            listing.default = parse_default_destination(line);
        }
    }

    listing
}

// ============================================================================
// Gateway operations
// ============================================================================

/// The pinned printer if one is configured, otherwise whatever the spooler
/// currently reports as its default. Not cached.
pub async fn resolve_printer(config: &PrinterConfig, spooler: &dyn Spooler) -> Option<String> {
    if let Some(name) = &config.name {
        return Some(name.clone());
    }

    spooler.default_destination().await
}

pub async fn print_image(
    config: &PrinterConfig,
    spooler: &dyn Spooler,
    file_path: &Path,
    copies: u32,
) -> Result<PrintReceipt, SpoolerError> {
    let destination = resolve_printer(config, spooler)
        .await
        .ok_or(SpoolerError::NoPrinter)?;

    let request = SubmitRequest {
        destination,
        copies,
        options: config.options.clone(),
        file_path: file_path.to_path_buf(),
    };

    info!(
        "Submitting print job: {} copies of {:?} to '{}' via {}",
        request.copies,
        request.file_path,
        request.destination,
        spooler.type_name()
    );

    let job_id = spooler.submit(&request).await?;
    Ok(PrintReceipt { job_id })
}

pub async fn list_printers(
    config: &PrinterConfig,
    spooler: &dyn Spooler,
) -> Result<PrinterDirectory, SpoolerError> {
    let listing = spooler.list().await?;
    Ok(PrinterDirectory {
        printers: listing.printers,
        default: listing.default,
        configured: config.name.clone().unwrap_or_default(),
    })
}

// ============================================================================
// CUPS command-line implementation
// ============================================================================

pub struct LpSpooler {
    lp_command: String,
    lpstat_command: String,
    status_timeout: Duration,
    submit_timeout: Duration,
}

impl LpSpooler {
    pub fn new(lp_command: impl Into<String>, lpstat_command: impl Into<String>) -> Self {
        Self {
            lp_command: lp_command.into(),
            lpstat_command: lpstat_command.into(),
            status_timeout: STATUS_TIMEOUT,
            submit_timeout: SUBMIT_TIMEOUT,
        }
    }

    pub fn from_config(config: &PrinterConfig) -> Self {
        Self::new(config.lp_command.clone(), config.lpstat_command.clone())
    }

    pub fn with_timeouts(mut self, status: Duration, submit: Duration) -> Self {
        self.status_timeout = status;
        self.submit_timeout = submit;
        self
    }

    /// `lp -d <dest> -n <copies> [-o <opt>]... <file>`
    pub fn submit_args(request: &SubmitRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-d".into(),
            request.destination.clone().into(),
            "-n".into(),
            request.copies.to_string().into(),
        ];

        for option in &request.options {
            args.push("-o".into());
            args.push(option.clone().into());
        }

        args.push(request.file_path.clone().into_os_string());
        args
    }

    async fn run(
        what: &'static str,
        program: &str,
        args: &[OsString],
        limit: Duration,
    ) -> Result<Output, SpoolerError> {
        debug!("Running {} {:?} (timeout {:?})", program, args, limit);

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        match tokio::time::timeout(limit, command.output()).await {
            Ok(Ok(output)) => {
                debug!(
                    "{} exited with {}: stdout={:?} stderr={:?}",
                    program,
                    output.status,
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                Ok(output)
            }
            Ok(Err(source)) => Err(SpoolerError::Exec { what, source }),
            Err(_) => Err(SpoolerError::TimedOut { what }),
        }
    }
}

#[async_trait]
impl Spooler for LpSpooler {
    async fn default_destination(&self) -> Option<String> {
        let output = match Self::run(
            "Status",
            &self.lpstat_command,
            &[OsString::from("-d")],
            self.status_timeout,
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!("Default destination lookup failed: {}", e);
                return None;
            }
        };

        if !output.status.success() {
            debug!("{} -d exited with {}", self.lpstat_command, output.status);
            return None;
        }

        parse_default_destination(&String::from_utf8_lossy(&output.stdout))
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<Option<String>, SpoolerError> {
        let output = Self::run(
            "Print",
            &self.lp_command,
            &Self::submit_args(request),
            self.submit_timeout,
        )
        .await?;

        if output.status.success() {
            let job_id = parse_job_id(&String::from_utf8_lossy(&output.stdout));
            match &job_id {
                Some(id) => info!("Print job accepted by CUPS with ID: {}", id),
                None => warn!("Print job accepted but no job ID was reported"),
            }
            Ok(job_id)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
            warn!("{} exited with {}: {}", self.lp_command, output.status, stderr);
            Err(SpoolerError::Rejected(stderr))
        }
    }

    async fn list(&self) -> Result<PrinterListing, SpoolerError> {
        let output = Self::run(
            "Status",
            &self.lpstat_command,
            &[OsString::from("-p"), OsString::from("-d")],
            self.status_timeout,
        )
        .await?;

        if !output.status.success() {
            warn!(
                "{} -p -d exited with {}; parsing whatever it printed",
                self.lpstat_command, output.status
            );
        }

        Ok(parse_printer_listing(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn type_name(&self) -> &'static str {
        "CUPS (lp/lpstat)"
    }
}

// ============================================================================
// Mock implementation for testing or when no CUPS install is available
// ============================================================================

#[derive(Debug, Clone)]
pub enum MockOutcome {
    Accept,
    AcceptWithoutJobId,
    Reject(String),
    TimeOut,
}

/// A submission as the mock saw it.
#[derive(Debug, Clone)]
pub struct MockSubmission {
    pub request: SubmitRequest,
    /// Bytes on disk at submission time, `None` if the file was missing.
    pub file_len: Option<u64>,
}

pub struct MockSpooler {
    default: Option<String>,
    printers: Vec<String>,
    outcome: MockOutcome,
    listing_fails: bool,
    submissions: Mutex<Vec<MockSubmission>>,
}

impl MockSpooler {
    pub fn new() -> Self {
        Self {
            default: Some("mock-printer".to_string()),
            printers: vec!["mock-printer".to_string()],
            outcome: MockOutcome::Accept,
            listing_fails: false,
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(mut self, default: Option<&str>) -> Self {
        self.default = default.map(str::to_string);
        self
    }

    pub fn with_printers(mut self, printers: &[&str]) -> Self {
        self.printers = printers.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_outcome(mut self, outcome: MockOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Makes `list` fail the way a hung `lpstat` would.
    pub fn with_failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    pub fn submissions(&self) -> Vec<MockSubmission> {
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockSpooler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Spooler for MockSpooler {
    async fn default_destination(&self) -> Option<String> {
        self.default.clone()
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<Option<String>, SpoolerError> {
        let file_len = std::fs::metadata(&request.file_path).ok().map(|m| m.len());

        let job_number = {
            let mut submissions = self
                .submissions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            submissions.push(MockSubmission {
                request: request.clone(),
                file_len,
            });
            submissions.len()
        };

        match &self.outcome {
            MockOutcome::Accept => Ok(Some(format!("{}-{}", request.destination, job_number))),
            MockOutcome::AcceptWithoutJobId => Ok(None),
            MockOutcome::Reject(stderr) => Err(SpoolerError::Rejected(stderr.clone())),
            MockOutcome::TimeOut => Err(SpoolerError::TimedOut { what: "Print" }),
        }
    }

    async fn list(&self) -> Result<PrinterListing, SpoolerError> {
        if self.listing_fails {
            return Err(SpoolerError::TimedOut { what: "Status" });
        }

        Ok(PrinterListing {
            printers: self.printers.clone(),
            default: self.default.clone(),
        })
    }

    fn type_name(&self) -> &'static str {
        "Mock Spooler"
    }
}
