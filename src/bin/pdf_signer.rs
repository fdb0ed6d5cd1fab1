//! Sign PDFs from the command line.
//!
//! Usage:
//!   pdf_signer <pkcs12_keystore> <pdf_or_directory> [options]
//!
//! The keystore passphrase comes from `-k <file>` or the
//! `PDF_SIGNER_PASSPHRASE` environment variable.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pdf_ltv_signer::batch::{BatchReport, BatchSigner};
use pdf_ltv_signer::config::SignerConfig;
use pdf_ltv_signer::signatures::{Keystore, SignatureVerifier};
use pdf_ltv_signer::{Error, Result};
use zeroize::Zeroizing;

const PASSPHRASE_ENV: &str = "PDF_SIGNER_PASSPHRASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Sign,
    Verify,
    AddLtv,
}

struct CliArgs {
    keystore: PathBuf,
    target: PathBuf,
    mode: Mode,
    log_level: &'static str,
    no_tsa: bool,
    no_ltv: bool,
    passphrase_file: Option<PathBuf>,
    params_file: Option<PathBuf>,
}

impl CliArgs {
    fn from_args(args: &[String]) -> std::result::Result<Self, String> {
        let mut positional = Vec::new();
        let mut mode = Mode::Sign;
        let mut log_level = "warn";
        let mut no_tsa = false;
        let mut no_ltv = false;
        let mut passphrase_file = None;
        let mut params_file = None;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-verbose" => {
                    if log_level == "warn" {
                        log_level = "info";
                    }
                },
                "-vv" => log_level = "debug",
                "-v" => mode = Mode::Verify,
                "-addltv" => mode = Mode::AddLtv,
                "-notsa" => no_tsa = true,
                "-noltv" => no_ltv = true,
                "-k" | "-p" => {
                    let flag = args[i].clone();
                    i += 1;
                    let value = args.get(i).ok_or_else(|| format!("{} needs a file argument", flag))?;
                    if flag == "-k" {
                        passphrase_file = Some(PathBuf::from(value));
                    } else {
                        params_file = Some(PathBuf::from(value));
                    }
                },
                other if other.starts_with('-') => return Err(format!("unknown option {}", other)),
                other => positional.push(PathBuf::from(other)),
            }
            i += 1;
        }

        let mut positional = positional.into_iter();
        let (keystore, target) = match (positional.next(), positional.next()) {
            (Some(keystore), Some(target)) => (keystore, target),
            _ => return Err("expected <pkcs12_keystore> <pdf_to_sign>".to_string()),
        };
        Ok(Self {
            keystore,
            target,
            mode,
            log_level,
            no_tsa,
            no_ltv,
            passphrase_file,
            params_file,
        })
    }

    fn config(&self) -> Result<SignerConfig> {
        let mut config = match &self.params_file {
            Some(path) => SignerConfig::from_json_file(path)?,
            None => SignerConfig::default(),
        };
        if self.no_tsa {
            config = config.without_tsa();
        }
        if self.no_ltv {
            config = config.with_ltv(false);
        }
        Ok(config)
    }

    fn passphrase(&self) -> Result<Zeroizing<String>> {
        match &self.passphrase_file {
            Some(path) => {
                let text = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read passphrase file {}: {}", path.display(), e))
                })?);
                Ok(Zeroizing::new(text.replace(['\r', '\n'], "")))
            },
            None => std::env::var(PASSPHRASE_ENV)
                .map(Zeroizing::new)
                .map_err(|_| Error::Config(format!("no passphrase: use -k <file> or set {}", PASSPHRASE_ENV))),
        }
    }
}

fn usage() {
    eprintln!(
        "\nusage: pdf_signer <pkcs12_keystore> <pdf_to_sign>\n\
         options:\n  \
         -verbose Enable Verbosity.\n  \
         -vv Enable Verbosity level 2.\n  \
         -v Verify DS Document.\n  \
         -notsa Disable TSA Stamping.\n  \
         -noltv Disable LTV.\n  \
         -addltv Add LTV to existing document.\n  \
         -k <file> file contains your keystore password.\n  \
         -p <file> json file contains your alias and reason.\n\
         \nWithout -k the passphrase is read from {}.",
        PASSPHRASE_ENV
    );
}

fn print_report(report: &BatchReport) {
    for outcome in &report.signed {
        let mut notes = Vec::new();
        if outcome.certified {
            notes.push("certified".to_string());
        }
        if outcome.timestamped {
            notes.push("timestamped".to_string());
        }
        for warning in &outcome.warnings {
            notes.push(format!("{} skipped", warning.step));
        }
        println!("signed   {} [{}]", outcome.output.display(), notes.join(", "));
    }
    for ltv in &report.ltv {
        println!(
            "LTV      {} ({} certificates covered, {} without revocation data)",
            ltv.output.display(),
            ltv.covered,
            ltv.missing.len()
        );
    }
    for failure in &report.failures {
        println!("FAILED   {} at {}: {}", failure.input.display(), failure.step, failure.error);
    }
}

fn verify(target: &Path) -> Result<bool> {
    let verifier = SignatureVerifier::new();
    let results = verifier.verify_document(target)?;
    if results.is_empty() {
        println!("{}: no signatures", target.display());
        return Ok(false);
    }
    let mut all_valid = true;
    for result in &results {
        let signer = result
            .signer
            .as_ref()
            .and_then(|h| h.name.clone())
            .unwrap_or_else(|| "unknown signer".to_string());
        println!(
            "{}: {:?} by {} (ByteRange {:?}, whole document: {}, timestamp: {}, time: {})",
            result.field_name,
            result.status,
            signer,
            result.byte_range,
            result.covers_whole_document,
            result.timestamped,
            result.signing_time.as_deref().unwrap_or("-")
        );
        for message in &result.messages {
            println!("    {}", message);
        }
        all_valid &= result.status.is_valid();
    }
    Ok(all_valid)
}

fn run(args: &CliArgs) -> Result<bool> {
    match args.mode {
        Mode::Verify => verify(&args.target),
        Mode::AddLtv => {
            let report = BatchSigner::ltv_only(args.config()?)?.add_ltv_path(&args.target)?;
            print_report(&report);
            Ok(report.is_success())
        },
        Mode::Sign => {
            let config = args.config()?;
            let passphrase = args.passphrase()?;
            let keystore = Keystore::load(&args.keystore, &passphrase, config.alias.as_deref())?;
            let report = BatchSigner::new(keystore, config)?.sign_path(&args.target)?;
            print_report(&report);
            Ok(report.is_success())
        },
    }
}

fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.iter().any(|a| a == "-h") {
        usage();
        return ExitCode::SUCCESS;
    }
    let args = match CliArgs::from_args(&raw) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("Error: {}", message);
            usage();
            return ExitCode::FAILURE;
        },
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level)).init();
    println!("{} v{}", pdf_ltv_signer::NAME, pdf_ltv_signer::VERSION);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
