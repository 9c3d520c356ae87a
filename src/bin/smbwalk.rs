//! Binary entry point for the smbwalk CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use smbwalk::{
    config::ClientConfig,
    listing::{list_resources, ListOptions, ResourceLocator},
    logging::init_logging,
    replay::{ScriptedTransport, Transcript},
    tree::{SmbContext, TreeConnection},
    types::SmbError,
};

#[derive(Parser, Debug)]
#[command(
    name = "smbwalk",
    version,
    about = "Inspect smbwalk configuration and replay recorded listings",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, env = "SMBWALK_CONFIG", help = "Path to config.toml")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "SMBWALK_LOG",
        default_value = "warn",
        help = "Log filter directives (EnvFilter syntax)"
    )]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration as TOML.
    Config,
    /// List a target against a recorded transcript.
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    #[arg(help = "JSON transcript to replay")]
    transcript: PathBuf,

    #[arg(long, default_value = "smb://", help = "smb:// URL to list")]
    target: String,

    #[arg(long, help = "Treat a bare host in the target as a workgroup")]
    workgroup: bool,

    #[arg(long, default_value = "*", help = "Server-side wildcard")]
    pattern: String,

    #[arg(long, default_value = "WORKGROUP", help = "Domain reported by the server")]
    oem_domain: String,

    #[arg(long, help = "Print the requests that were sent")]
    trace: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli.log) {
        eprintln!("warning: {err}");
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = ClientConfig::load(cli.config)?;
    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Replay(args) => replay(config, args),
    }
}

fn replay(config: ClientConfig, args: ReplayArgs) -> Result<(), Box<dyn Error>> {
    let locator = parse_target(&args.target, args.workgroup)?;
    let transport = Arc::new(ScriptedTransport::from_transcript(Transcript::load(
        &args.transcript,
    )?));
    let share_path = match locator.share_name() {
        Some(share) => format!("\\\\{}\\{share}", locator.host()),
        None => format!("\\\\{}\\IPC$", locator.host()),
    };
    let connection = TreeConnection::new(
        SmbContext::new(config),
        transport.clone(),
        share_path,
        args.oem_domain,
    );
    let options = ListOptions::default().with_pattern(args.pattern);

    let mut rows = Vec::new();
    for resource in list_resources(&connection, &locator, options, None)? {
        let resource = resource?;
        match args.format {
            OutputFormat::Text => println!(
                "{:<10} {:>12} {}",
                format!("{:?}", resource.kind()).to_lowercase(),
                resource.entry().size,
                resource.url()
            ),
            OutputFormat::Json => rows.push(json!({
                "url": resource.url(),
                "entry": resource.entry(),
            })),
        }
    }
    if let OutputFormat::Json = args.format {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    if args.trace {
        for sent in transport.sent() {
            eprintln!("-> {} {}", sent.request.kind(), serde_json::to_string(&sent.request)?);
        }
    }
    if transport.remaining() > 0 {
        eprintln!("warning: {} scripted exchanges were not used", transport.remaining());
    }
    Ok(())
}

fn parse_target(target: &str, workgroup: bool) -> Result<ResourceLocator, SmbError> {
    let Some(rest) = target.strip_prefix("smb://") else {
        return Err(SmbError::Invalid(format!("target must start with smb://: {target}")));
    };
    let directory = rest.is_empty() || rest.ends_with('/');
    let parts: Vec<&str> = rest.split('/').filter(|part| !part.is_empty()).collect();
    let locator = match parts.as_slice() {
        [] => ResourceLocator::root(),
        [host] if workgroup => ResourceLocator::workgroup(host),
        [host] => ResourceLocator::server(host),
        [host, share] => ResourceLocator::share(host, share),
        [host, share, path @ ..] => {
            let mut path = path.join("/");
            if directory {
                path.push('/');
            }
            ResourceLocator::path(host, share, &path)
        }
    };
    Ok(locator)
}
