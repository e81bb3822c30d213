use clap::{Parser, Subcommand};
use sitepush::config::{
    self, ConfigError, Credentials, DatabaseCredentials, DeployConfig, FixtureSource, ProjectPaths,
};
use sitepush::convert::{self, ConvertOptions};
use sitepush::fixtures::{self, ExportedCollection, JsonDumpStore, MongoStore};
use sitepush::imaging::WebpBackend;
use sitepush::publish::{self, FtpSession, LocalSession, MirrorReport};
use sitepush::{output, workdir};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Shared flags for commands that convert images.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the conversion cache and re-encode every image
    #[arg(long)]
    no_cache: bool,
}

/// Shared flags for commands that publish.
#[derive(clap::Args, Clone)]
struct TargetArgs {
    /// Publish into a local directory instead of the FTP server
    #[arg(long, value_name = "DIR")]
    to_dir: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "sitepush")]
#[command(about = "Deploy pipeline for a static storefront")]
#[command(long_about = "\
Deploy pipeline for a static storefront

Clones the site repository, exports database dumps as JSON data, converts
product photos to size-bounded WebP, builds the site and mirrors the build
output to the hosting server over FTP.

Project layout (all paths configurable in sitepush.toml):

  project/
  ├── sitepush.toml
  ├── images/          # product photos (.jpg/.jpeg/.png, any depth)
  ├── dump/            # mongoexport dumps, when [fixtures] source = \"dumps\"
  └── web/             # site working copy, re-cloned by refresh/deploy

Server credentials come from FTP_HOST, FTP_USER and FTP_PASSWORD; the
database from MONGO_URL, MONGO_DB_NAME, MONGO_USER and MONGO_PASSWORD.
Set RUST_LOG to control log output (default: info).

Run 'sitepush gen-config' to generate a documented sitepush.toml.")]
#[command(version)]
struct Cli {
    /// Config file; relative paths inside it resolve against its directory
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Delete the working copy and clone the site repository again
    Refresh,
    /// Write database collections into the site's data directory
    Export,
    /// Convert product photos to WebP within the size budget
    Convert(CacheArgs),
    /// Run the site build commands in the working copy
    Build,
    /// Upload the build output to the server
    Publish(TargetArgs),
    /// Run the full pipeline: refresh → export → convert → build → publish
    Deploy {
        #[command(flatten)]
        cache: CacheArgs,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List a directory on the server
    RemoteLs {
        /// Remote path (default: login directory)
        path: Option<String>,
    },
    /// Print a stock sitepush.toml with all options documented
    GenConfig,
}

/// Where `export` reads documents from.
enum Fixtures {
    Database(DatabaseCredentials),
    Dumps,
}

impl Fixtures {
    fn resolve(config: &DeployConfig) -> Result<Self, ConfigError> {
        match config.fixtures.source {
            FixtureSource::Database => Ok(Fixtures::Database(DatabaseCredentials::from_env()?)),
            FixtureSource::Dumps => Ok(Fixtures::Dumps),
        }
    }
}

/// Where `publish` sends the build output.
enum Target {
    Local(PathBuf),
    Ftp(Credentials),
}

impl Target {
    fn resolve(to_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        match to_dir {
            Some(dir) => Ok(Target::Local(dir)),
            None => Ok(Target::Ftp(Credentials::from_env()?)),
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let load = || -> Result<(DeployConfig, ProjectPaths), ConfigError> {
        let config = config::load_config(&cli.config)?;
        let project_dir = cli
            .config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let paths = ProjectPaths::resolve(&config, project_dir);
        Ok((config, paths))
    };

    let clean = match cli.command {
        Command::Refresh => {
            let (config, paths) = load()?;
            refresh(&config, &paths)?;
            true
        }
        Command::Export => {
            let (config, paths) = load()?;
            let fixtures = Fixtures::resolve(&config)?;
            export(&config, &paths, &fixtures)?;
            true
        }
        Command::Convert(cache) => {
            let (config, paths) = load()?;
            convert_images(&config, &paths, !cache.no_cache)?
        }
        Command::Build => {
            let (config, paths) = load()?;
            build(&config, &paths)?;
            true
        }
        Command::Publish(target) => {
            let (config, paths) = load()?;
            let target = Target::resolve(target.to_dir)?;
            publish_site(&config, &paths, &target)?
        }
        Command::Deploy { cache, target } => {
            let (config, paths) = load()?;
            // Resolve credentials before touching the working copy.
            let fixtures = Fixtures::resolve(&config)?;
            let target = Target::resolve(target.to_dir)?;

            println!("==> Stage 1: Refreshing {}", paths.working_copy.display());
            refresh(&config, &paths)?;

            println!("==> Stage 2: Exporting fixtures");
            export(&config, &paths, &fixtures)?;

            println!("==> Stage 3: Converting images");
            let images_ok = convert_images(&config, &paths, !cache.no_cache)?;

            println!("==> Stage 4: Building site");
            build(&config, &paths)?;

            println!("==> Stage 5: Publishing {}", paths.build_output.display());
            let upload_ok = publish_site(&config, &paths, &target)?;

            images_ok && upload_ok
        }
        Command::RemoteLs { path } => {
            let (config, _) = load()?;
            let credentials = Credentials::from_env()?;
            let mut session = FtpSession::connect(&credentials.host, config.publish.port)?;
            let entries = publish::list_remote(&mut session, &credentials, path.as_deref())?;
            output::print_remote_listing(&entries);
            true
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            true
        }
    };

    if clean {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("finished with errors");
        Ok(ExitCode::FAILURE)
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn refresh(config: &DeployConfig, paths: &ProjectPaths) -> Result<(), Box<dyn Error>> {
    workdir::refresh_working_copy(&config.repository.url, &paths.working_copy)?;
    Ok(())
}

fn export(
    config: &DeployConfig,
    paths: &ProjectPaths,
    source: &Fixtures,
) -> Result<(), Box<dyn Error>> {
    let collections = &config.fixtures.collections;
    let exported: Vec<ExportedCollection> = match source {
        Fixtures::Database(credentials) => {
            let store = MongoStore::connect(credentials)?;
            fixtures::export_collections(&store, collections, &paths.fixture_output)?
        }
        Fixtures::Dumps => {
            let store = JsonDumpStore::new(&paths.fixture_dumps);
            fixtures::export_collections(&store, collections, &paths.fixture_output)?
        }
    };
    output::print_export_report(&exported, &paths.working_copy);
    Ok(())
}

/// Returns whether every image converted.
fn convert_images(
    config: &DeployConfig,
    paths: &ProjectPaths,
    use_cache: bool,
) -> Result<bool, Box<dyn Error>> {
    let options = ConvertOptions {
        budget: config.budget(),
        workers: config::effective_threads(&config.processing),
    };
    let cache_dir = (use_cache && config.images.cache).then_some(paths.cache_dir.as_path());
    let report = convert::convert_directory(
        &WebpBackend::new(),
        &paths.image_sources,
        &paths.image_output,
        &options,
        cache_dir,
    )?;
    output::print_conversion_report(&report, &paths.image_sources);
    Ok(report.is_success())
}

fn build(config: &DeployConfig, paths: &ProjectPaths) -> Result<(), Box<dyn Error>> {
    workdir::run_build(&paths.working_copy, &config.build.commands)?;
    info!(output = %paths.build_output.display(), "build finished");
    Ok(())
}

/// Returns whether every file made it to the server.
fn publish_site(
    config: &DeployConfig,
    paths: &ProjectPaths,
    target: &Target,
) -> Result<bool, Box<dyn Error>> {
    let report: MirrorReport = match target {
        Target::Local(dir) => {
            let mut session = LocalSession::open(dir)?;
            let credentials = Credentials::anonymous(dir.display().to_string());
            publish::publish(&mut session, &credentials, "/", &paths.build_output)?
        }
        Target::Ftp(credentials) => publish::publish_ftp(
            credentials,
            config.publish.port,
            &config.publish.remote_root,
            &paths.build_output,
        )?,
    };
    output::print_mirror_report(&report);
    Ok(report.success())
}
