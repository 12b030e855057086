use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use rnbuild::request::{AndroidSigning, IosSigning};
use rnbuild::{BuildRequest, BuildType, PackageType, Pipeline, Platform};

#[derive(Parser)]
#[command(name = "rnbuild", version, about = "Build signed mobile packages from generated React Native projects")]
struct Cli {
    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the build result as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an Android .apk or .aab
    Android(AndroidArgs),
    /// Build an iOS .ipa
    Ios(IosArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Project source: a directory or a .zip archive
    source: PathBuf,

    /// Build destination; derived from the build cache when unset
    #[arg(long)]
    dest: Option<PathBuf>,

    /// Eject without asking for confirmation
    #[arg(long)]
    auto_eject: bool,

    /// Replace the installed app runtime dependency with this local copy
    #[arg(long)]
    local_runtime: Option<PathBuf>,
}

#[derive(Args)]
struct AndroidArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long, value_enum, default_value_t = BuildType::Release)]
    build_type: BuildType,

    /// Keystore file for release signing
    #[arg(long)]
    keystore: Option<PathBuf>,

    #[arg(long)]
    store_password: Option<String>,

    #[arg(long)]
    key_alias: Option<String>,

    #[arg(long)]
    key_password: Option<String>,
}

#[derive(Args)]
struct IosArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// p12 signing certificate
    #[arg(long)]
    certificate: Option<PathBuf>,

    /// Password to unlock the certificate
    #[arg(long)]
    certificate_password: Option<String>,

    /// .mobileprovision profile
    #[arg(long)]
    provisioning_file: Option<PathBuf>,

    #[arg(long, value_enum)]
    package_type: Option<PackageType>,

    /// Override the code-signing identity string
    #[arg(long)]
    codesign_identity: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let request = match cli.command {
        Command::Android(args) => {
            let mut request = BuildRequest::new(Platform::Android, args.common.source);
            request.dest = args.common.dest;
            request.auto_eject = args.common.auto_eject;
            request.local_runtime = args.common.local_runtime;
            request.build_type = args.build_type;
            request.android = AndroidSigning {
                keystore: args.keystore,
                store_password: args.store_password,
                key_alias: args.key_alias,
                key_password: args.key_password,
            };
            request
        }
        Command::Ios(args) => {
            let mut request = BuildRequest::new(Platform::Ios, args.common.source);
            request.dest = args.common.dest;
            request.auto_eject = args.common.auto_eject;
            request.local_runtime = args.common.local_runtime;
            request.ios = IosSigning {
                certificate: args.certificate,
                certificate_password: args.certificate_password,
                provisioning_file: args.provisioning_file,
                package_type: args.package_type,
                codesign_identity: args.codesign_identity,
            };
            request
        }
    };

    let result = Pipeline::new().run(&request);

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("failed to serialize result: {e}"),
        }
    } else if result.success {
        if let Some(output) = &result.output {
            println!("{}", output.display());
        }
    } else {
        for error in &result.errors {
            eprintln!("error: {error}");
        }
    }

    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
