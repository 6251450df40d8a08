use clap::{Parser, ValueEnum};
use ingesta::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_BUCKET, DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_OUTPUT_PATH,
    DEFAULT_PORT, DEFAULT_USER,
};
use ingesta::runner::{
    ConnectionParamsBuilder, ExistingFilePolicy, ExportOptions, IngestArgs, LineTerminator,
    TableName, run_ingest,
};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Export a MySQL table to CSV and upload the file to S3
#[derive(Parser, Clone)]
#[command(version)]
struct Args {
    /// Table to export (letters, digits, '_' and '$' only)
    #[arg(short, long)]
    table: String,

    /// Database host
    #[arg(long, env = "INGESTA_DB_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Database port
    #[arg(long, env = "INGESTA_DB_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Database username
    #[arg(short, long, env = "INGESTA_DB_USER", default_value = DEFAULT_USER)]
    user: String,

    /// Database password
    #[arg(long, env = "INGESTA_DB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database name
    #[arg(short, long, env = "INGESTA_DB_NAME", default_value = DEFAULT_DATABASE)]
    database: String,

    /// Local path of the exported CSV file
    #[arg(short, long, default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// Rows fetched from the database per batch
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: NonZeroUsize,

    /// What to do if the output file already exists
    #[arg(long, value_enum, default_value_t = IfExists::Overwrite)]
    if_exists: IfExists,

    /// Terminate records with CRLF instead of LF
    #[arg(long)]
    crlf: bool,

    /// Destination S3 bucket
    #[arg(long, env = "INGESTA_S3_BUCKET", default_value = DEFAULT_BUCKET)]
    bucket: String,

    /// Object key (defaults to the output file name)
    #[arg(short, long)]
    key: Option<String>,

    /// AWS region (defaults to the AWS SDK configuration chain)
    #[arg(short, long)]
    region: Option<String>,

    /// Validate arguments and show the plan without touching the database or S3
    #[arg(long)]
    dry_run: bool,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IfExists {
    Overwrite,
    Fail,
}

impl From<IfExists> for ExistingFilePolicy {
    fn from(value: IfExists) -> Self {
        match value {
            IfExists::Overwrite => ExistingFilePolicy::Overwrite,
            IfExists::Fail => ExistingFilePolicy::Fail,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if args.quiet {
        EnvFilter::new("ingesta=warn,sqlx=off")
    } else {
        EnvFilter::new("ingesta=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let ingest_args = build_ingest_args(&args)?;

    if !args.quiet {
        println!("Table Export");
        println!("============");
        println!("Source: {}:{}/{}", args.host, args.port, args.database);
        println!("Table: {}", args.table);
        println!("Output: {}", args.output.display());
        println!("Bucket: {}", args.bucket);
        println!();
    }

    if args.dry_run {
        // Validates the identifier without any I/O
        let table = TableName::parse(&args.table)?;

        println!("DRY RUN MODE - Nothing will be exported or uploaded");
        println!();
        println!("Configuration:");
        println!("  Query: {}", table.select_all_sql());
        println!("  Batch size: {}", args.batch_size);
        println!("  If output exists: {:?}", args.if_exists);
        println!("  Line terminator: {}", if args.crlf { "CRLF" } else { "LF" });
        println!(
            "  Object key: {}",
            args.key.as_deref().unwrap_or("<output file name>")
        );
        println!(
            "  Region: {}",
            args.region.as_deref().unwrap_or("<AWS default chain>")
        );
        println!();
        println!("To execute, run without --dry-run");
        return Ok(());
    }

    let result = run_ingest(ingest_args).await?;

    println!();
    println!("Export Summary");
    println!("==============");
    println!("Rows exported: {}", result.rows_exported);
    println!("Local file: {}", result.local_path.display());
    println!("Bytes exported: {}", result.bytes_exported);
    println!("Uploaded to: {}", result.address);
    println!("Duration: {:.2}s", result.duration.as_secs_f64());
    if let (Some(p50), Some(p90), Some(p99)) = result.batch_percentiles_ms {
        println!("Batch write time: p50 {}ms, p90 {}ms, p99 {}ms", p50, p90, p99);
    }

    Ok(())
}

fn build_ingest_args(args: &Args) -> anyhow::Result<IngestArgs> {
    let mut connection = ConnectionParamsBuilder::default();
    connection
        .host(args.host.as_str())
        .port(args.port)
        .username(args.user.as_str())
        .database(args.database.as_str());
    if let Some(password) = &args.password {
        connection.password(password.as_str());
    }

    Ok(IngestArgs {
        connection: connection.build()?,
        table: args.table.clone(),
        output_path: args.output.clone(),
        export: ExportOptions {
            batch_size: args.batch_size,
            if_exists: args.if_exists.into(),
            line_terminator: if args.crlf {
                LineTerminator::CrLf
            } else {
                LineTerminator::Lf
            },
        },
        bucket: args.bucket.clone(),
        key: args.key.clone(),
        region: args.region.clone(),
        quiet: args.quiet,
    })
}
