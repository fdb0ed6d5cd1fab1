//! Signing files and directories with one keystore.
//!
//! `X.pdf` is signed into `X_signed.pdf`; with LTV enabled that file is
//! extended into `X_signed_LTV.pdf`. In a directory every PDF is processed
//! on its own: a failure is logged, recorded and the next file continues.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SignerConfig;
use crate::error::{Error, Result};
use crate::signatures::{
    HttpTransport, IncrementalSigner, Keystore, LtvReport, ReqwestTransport, SignOutcome, SigningStep,
    ValidationInfoAssembler,
};

const SIGNED_SUFFIX: &str = "_signed";
const LTV_SUFFIX: &str = "_LTV";

/// `X.pdf` → (`X_signed.pdf`, `X_signed_LTV.pdf`), next to the input.
pub fn output_paths(input: &Path) -> (PathBuf, PathBuf) {
    let signed = with_suffix(input, SIGNED_SUFFIX);
    let ltv = ltv_path(&signed);
    (signed, ltv)
}

/// `Y.pdf` → `Y_LTV.pdf`, next to the input.
pub fn ltv_path(input: &Path) -> PathBuf {
    with_suffix(input, LTV_SUFFIX)
}

fn with_suffix(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}.pdf", stem, suffix))
}

fn is_pdf(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
}

fn stem_ends_with(path: &Path, suffix: &str) -> bool {
    path.file_stem().is_some_and(|s| s.to_string_lossy().ends_with(suffix))
}

/// PDFs to process for `path`: the file itself, or the directory's PDFs in
/// name order minus outputs of earlier runs.
pub fn collect_inputs(path: &Path, skip: &[&str]) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is neither a file nor a directory", path.display()),
        )));
    }
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let candidate = entry?.path();
        if is_pdf(&candidate) && !skip.iter().any(|s| stem_ends_with(&candidate, s)) {
            inputs.push(candidate);
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// One file that did not make it through.
#[derive(Debug)]
pub struct FileFailure {
    /// Input file
    pub input: PathBuf,
    /// Step that failed
    pub step: SigningStep,
    /// What went wrong
    pub error: Error,
}

/// Everything a batch run produced.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Signed outputs, with their skipped-step warnings
    pub signed: Vec<SignOutcome>,
    /// LTV outputs
    pub ltv: Vec<LtvReport>,
    /// Files that failed
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    /// True when no file failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of files attempted.
    pub fn attempted(&self) -> usize {
        self.signed.len() + self.failures.iter().filter(|f| f.step != SigningStep::Ltv).count()
    }
}

/// Pipeline step an error is attributed to.
pub fn step_of(error: &Error) -> SigningStep {
    match error {
        Error::DocumentLocked { .. } => SigningStep::ReservePlaceholder,
        Error::MalformedByteRange { .. } => SigningStep::Digest,
        Error::SigningKey(_)
        | Error::CertificateUsage { .. }
        | Error::CertificateExpired { .. }
        | Error::Encoding(_) => SigningStep::BuildCms,
        Error::TimestampUnavailable { .. } | Error::NetworkTimeout { .. } => SigningStep::Timestamp,
        Error::SignatureTooLarge { .. } => SigningStep::Finalize,
        Error::RevocationUnavailable { .. } => SigningStep::Ltv,
        _ => SigningStep::Load,
    }
}

/// Signs files with one keystore and configuration.
pub struct BatchSigner {
    keystore: Option<Keystore>,
    config: SignerConfig,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for BatchSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSigner")
            .field("keystore", &self.keystore)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BatchSigner {
    /// Signer over `reqwest` with the configured timeout.
    pub fn new(keystore: Keystore, config: SignerConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.timeout())?);
        Ok(Self {
            keystore: Some(keystore),
            config,
            transport,
        })
    }

    /// LTV pass only; no keystore needed.
    pub fn ltv_only(config: SignerConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.timeout())?);
        Ok(Self {
            keystore: None,
            config,
            transport,
        })
    }

    /// Route TSA, OCSP and CRL requests through `transport`.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Sign a file, or every PDF in a directory.
    pub fn sign_path(&self, path: impl AsRef<Path>) -> Result<BatchReport> {
        let inputs = collect_inputs(path.as_ref(), &[SIGNED_SUFFIX, LTV_SUFFIX])?;
        log::info!("signing {} file(s) from {}", inputs.len(), path.as_ref().display());
        let mut report = BatchReport::default();
        for input in inputs {
            self.sign_one(&input, &mut report);
        }
        Ok(report)
    }

    /// Add LTV data to a signed file, or to every PDF in a directory.
    pub fn add_ltv_path(&self, path: impl AsRef<Path>) -> Result<BatchReport> {
        let inputs = collect_inputs(path.as_ref(), &[LTV_SUFFIX])?;
        let assembler = ValidationInfoAssembler::new(Arc::clone(&self.transport));
        let mut report = BatchReport::default();
        for input in inputs {
            self.ltv_one(&assembler, &input, &ltv_path(&input), &mut report);
        }
        Ok(report)
    }

    fn sign_one(&self, input: &Path, report: &mut BatchReport) {
        let (signed_path, ltv_output) = output_paths(input);
        match self.sign_file(input, &signed_path) {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    log::warn!("{}: {} skipped: {}", input.display(), warning.step, warning.reason);
                }
                report.signed.push(outcome);
            },
            Err(error) => {
                let step = step_of(&error);
                log::error!("{}: {} failed: {}", input.display(), step, error);
                report.failures.push(FileFailure {
                    input: input.to_path_buf(),
                    step,
                    error,
                });
                return;
            },
        }
        if self.config.ltv {
            let assembler = ValidationInfoAssembler::new(Arc::clone(&self.transport));
            self.ltv_one(&assembler, &signed_path, &ltv_output, report);
        }
    }

    /// Sign one file with a fresh identity; the key copy is gone when this returns.
    pub fn sign_file(&self, input: &Path, output: &Path) -> Result<SignOutcome> {
        let keystore = self
            .keystore
            .as_ref()
            .ok_or_else(|| Error::Config("no keystore loaded for signing".to_string()))?;
        let identity = keystore.signing_identity(self.config.digest_algorithm)?;
        let request = self.config.request_for(input, &identity.holder()?);
        IncrementalSigner::with_transport(Arc::clone(&self.transport)).sign(&request, identity, output)
    }

    fn ltv_one(&self, assembler: &ValidationInfoAssembler, input: &Path, output: &Path, report: &mut BatchReport) {
        match assembler.add_ltv(input, output) {
            Ok(ltv) => {
                for missing in &ltv.missing {
                    log::warn!("{}: {}", input.display(), missing);
                }
                report.ltv.push(ltv);
            },
            Err(error) => {
                log::error!("{}: LTV failed: {}", input.display(), error);
                report.failures.push(FileFailure {
                    input: input.to_path_buf(),
                    step: SigningStep::Ltv,
                    error,
                });
            },
        }
    }
}
