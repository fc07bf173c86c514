use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use heliocloud_catalog::app::{App, CatalogOptions, FlythroughFiles};
use heliocloud_catalog::catalog::{EntryOptions, FlythroughCatalogRequest, ModelCatalogRequest};
use heliocloud_catalog::config::ConfigLoader;
use heliocloud_catalog::domain::{ModelName, RunName, StorageLocation};
use heliocloud_catalog::error::CatalogError;
use heliocloud_catalog::flythrough::TextFlythroughReader;
use heliocloud_catalog::output::JsonOutput;
use heliocloud_catalog::publication::PublicationHttpClient;
use heliocloud_catalog::store::Store;
use heliocloud_catalog::timelist::TimeListBounds;

#[derive(Parser)]
#[command(name = "hc-catalog")]
#[command(about = "Catalog entries and file registries for HelioCloud model outputs and flythroughs")]
#[command(version, author)]
struct Cli {
    /// Config file with the model format table (defaults to hc-catalog.json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Directory that receives catalog.json, registry CSVs and schema files
    #[arg(long, global = true)]
    output_dir: Option<Utf8PathBuf>,

    /// Local directory where buckets are mounted, e.g. /s3
    #[arg(long, global = true)]
    mount_root: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand, about = "Build a catalog entry and add it to catalog.json")]
    Catalog(CatalogCommand),
    #[command(subcommand, about = "Write the per-year file registry of a dataset")]
    Registry(RegistryCommand),
    #[command(about = "Detect magnetopause crossings along a trajectory CSV (time,x,y,z,bz,dp)")]
    Crossings { trajectory: Utf8PathBuf },
    #[command(about = "List configured models and their file formats")]
    Formats,
}

#[derive(Subcommand)]
enum CatalogCommand {
    Model(CatalogArgs),
    Flythrough {
        #[command(flatten)]
        args: CatalogArgs,
        /// Name of the satellite trajectory flown through the model output
        #[arg(long)]
        trajectory: String,
    },
}

#[derive(Args)]
struct DatasetArgs {
    #[arg(long)]
    model: String,
    #[arg(long)]
    run: String,
}

#[derive(Args)]
struct CatalogArgs {
    #[command(flatten)]
    dataset: DatasetArgs,
    /// Full path to the model outputs, s3://bucket/.../ with trailing slash
    #[arg(long)]
    location: String,
    #[arg(long)]
    resource_url: Option<String>,
    #[arg(long)]
    about_url: Option<String>,
    #[arg(long)]
    citation: Option<String>,
    #[arg(long)]
    contact: Option<String>,
    #[arg(long)]
    contact_id: Option<String>,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    replace: bool,
}

#[derive(Subcommand)]
enum RegistryCommand {
    Model {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[arg(long)]
        location: String,
    },
    Flythrough {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// Directory holding flythrough output files
        #[arg(long, conflicts_with = "files")]
        dir: Option<Utf8PathBuf>,
        #[arg(long, default_value = "csv")]
        extension: String,
        /// Bucket location the files are published under; used for registry keys
        #[arg(long)]
        location: Option<String>,
        files: Vec<Utf8PathBuf>,
    },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::InvalidPathFormat(_)
        | CatalogError::InvalidIdentifier(_)
        | CatalogError::UnknownModel(_)
        | CatalogError::MissingUpstreamInput(_)
        | CatalogError::MalformedUpstreamInput(_)
        | CatalogError::UnhandledCoordinateUnits(..)
        | CatalogError::DuplicateCatalogId(_)
        | CatalogError::MalformedCatalog(_) => 2,
        CatalogError::RemoteFetch(_)
        | CatalogError::RemoteStatus { .. }
        | CatalogError::PublicationMetadata(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    let store = match cli.output_dir {
        Some(output_dir) => Store::new_with_paths(output_dir, None),
        None => Store::new()?,
    }
    .with_mount_root(cli.mount_root.or_else(|| config.mount_root.clone()));

    let bounds = TimeListBounds::new(store.clone());
    let publication = PublicationHttpClient::new(config.http_timeout)?;
    let app = App::new(store, config, bounds, publication, TextFlythroughReader);

    match cli.command {
        Commands::Catalog(CatalogCommand::Model(args)) => {
            let options = catalog_options(&args);
            let request = ModelCatalogRequest {
                model: args.dataset.model.parse()?,
                run: args.dataset.run.parse()?,
                location: args.location.parse()?,
                options: entry_options(args),
            };
            let result = app.catalog_model(&request, options)?;
            JsonOutput::print_catalog(&result).map_err(io_error)?;
        }
        Commands::Catalog(CatalogCommand::Flythrough { args, trajectory }) => {
            let options = catalog_options(&args);
            let request = FlythroughCatalogRequest {
                model: args.dataset.model.parse()?,
                run: args.dataset.run.parse()?,
                location: args.location.parse()?,
                trajectory,
                options: entry_options(args),
            };
            let result = app.catalog_flythrough(&request, options)?;
            JsonOutput::print_catalog(&result).map_err(io_error)?;
        }
        Commands::Registry(RegistryCommand::Model { dataset, location }) => {
            let (model, run) = parse_dataset(&dataset)?;
            let location: StorageLocation = location.parse()?;
            let result = app.registry_model(&model, &run, &location)?;
            JsonOutput::print_registry(&result).map_err(io_error)?;
        }
        Commands::Registry(RegistryCommand::Flythrough {
            dataset,
            dir,
            extension,
            location,
            files,
        }) => {
            let (model, run) = parse_dataset(&dataset)?;
            let location = location
                .map(|value| value.parse::<StorageLocation>())
                .transpose()?;
            let files = match dir {
                Some(dir) => FlythroughFiles::Directory { dir, extension },
                None => FlythroughFiles::Listed(files),
            };
            let result = app.registry_flythrough(&model, &run, files, location)?;
            JsonOutput::print_registry(&result).map_err(io_error)?;
        }
        Commands::Crossings { trajectory } => {
            let result = app.crossings(&trajectory)?;
            JsonOutput::print_crossings(&result).map_err(io_error)?;
        }
        Commands::Formats => {
            JsonOutput::print_formats(&app.formats()).map_err(io_error)?;
        }
    }
    Ok(())
}

fn parse_dataset(args: &DatasetArgs) -> Result<(ModelName, RunName), CatalogError> {
    Ok((args.model.parse()?, args.run.parse()?))
}

fn catalog_options(args: &CatalogArgs) -> CatalogOptions {
    CatalogOptions {
        dry_run: args.dry_run,
        replace: args.replace,
    }
}

fn entry_options(args: CatalogArgs) -> EntryOptions {
    EntryOptions {
        resource_url: args.resource_url,
        about_url: args.about_url,
        citation: args.citation,
        contact: args.contact,
        contact_id: args.contact_id,
    }
}

fn io_error(err: std::io::Error) -> CatalogError {
    CatalogError::Filesystem(err.to_string())
}
