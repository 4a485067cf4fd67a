use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use osu_stuff_cli::{CommandContext, Commands, OutputFormat, commands};

#[derive(Parser)]
#[command(
    name = "osu-stuff",
    about = "Inspect osu! stable libraries, find missing beatmaps and download them",
    version,
    author
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// osu! installation directory
    #[arg(long, global = true, env = "OSU_STUFF_OSU_DIR")]
    osu_dir: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let context = CommandContext {
        format: cli.format,
        osu_dir: cli.osu_dir,
    };

    match cli.command {
        Commands::Info { db, strict } => commands::info::handle(&context, db, strict)?,
        Commands::Collections { path } => commands::collections::handle(&context, path)?,
        Commands::Missing {
            db,
            collections,
            name,
        } => commands::missing::handle(&context, db, collections, name.as_deref())?,
        Commands::Download {
            db,
            collections,
            name,
            dir,
            token,
            mirrors,
            concurrency,
            write_db,
        } => {
            let options = commands::download::DownloadOptions {
                db,
                collections,
                name,
                dir,
                token,
                mirrors,
                concurrency,
                write_db,
            };
            commands::download::handle(&context, options).await?;
        }
        Commands::ExportOsdb {
            collections,
            output,
            osdb_version,
            db,
            name,
        } => {
            commands::osdb::handle_export(&context, &collections, &output, osdb_version, db, &name)?;
        }
        Commands::ImportOsdb { input, collections } => {
            commands::osdb::handle_import(&context, &input, &collections)?;
        }
    }

    Ok(())
}
