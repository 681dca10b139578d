//! dsbridge CLI - probe, rewrite and scan files through the bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use clap::{Parser, Subcommand};
use datafusion::arrow::util::pretty::pretty_format_batches;
use dsbridge_core::{
    classify_filesystem, is_splittable, resolve, BridgeConfig, ByteRange, SchemaProbe,
};
use dsbridge_parquet::{scan_file, ParquetDiscoveryFactory};
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "dsbridge")]
#[command(about = "Probe schemas and assemble Arrow batches from columnar dataset files")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// File format (defaults to DSBRIDGE_FORMAT or parquet)
    #[arg(long, global = true)]
    format: Option<String>,

    /// Session timezone applied to timezone-less timestamps
    #[arg(long, global = true)]
    timezone: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema of a file as JSON
    Probe {
        /// File path or URI
        path: String,
    },

    /// Print whether a format supports split reads
    Splittable {
        /// Format name
        name: String,
    },

    /// Print the URI the native reader is given for a path
    Rewrite {
        /// File path or URI
        uri: String,
    },

    /// Scan a file and print the assembled batches
    Scan {
        /// File path or URI
        path: String,

        /// Comma-separated data columns (defaults to every probed column)
        #[arg(short, long)]
        columns: Option<String>,

        /// Comma-separated partition columns as name:type, e.g. year:int32,month:utf8
        #[arg(short, long)]
        partition_schema: Option<String>,

        /// Maximum rows per batch
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        batch_size: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG overrides the verbosity flag
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_writer(std::io::stderr);
    match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())?
        }
        Err(_) => tracing::subscriber::set_global_default(builder.with_max_level(level).finish())?,
    }

    let mut config = BridgeConfig::from_env()?;
    if let Some(format) = cli.format {
        config.original_format = format;
    }
    if cli.timezone.is_some() {
        config.session_timezone = cli.timezone;
    }
    debug!("Using {:?}", config);

    match cli.command {
        Commands::Probe { path } => probe(&path, &config)?,
        Commands::Splittable { name } => {
            println!("{}", is_splittable(resolve(&name)?));
        }
        Commands::Rewrite { uri } => {
            let filesystem = classify_filesystem(&uri)?;
            debug!("'{}' is on a {:?} filesystem", uri, filesystem);
            println!("{}", config.uri_rewriter().rewrite_for_read(&uri)?);
        }
        Commands::Scan {
            path,
            columns,
            partition_schema,
            batch_size,
        } => {
            if let Some(batch_size) = batch_size {
                config.batch_size =
                    usize::try_from(batch_size).context("batch size does not fit in memory")?;
            }
            scan(&path, columns.as_deref(), partition_schema.as_deref(), &config)?;
        }
    }

    Ok(())
}

fn probe(path: &str, config: &BridgeConfig) -> Result<()> {
    let probe = SchemaProbe::from_config(ParquetDiscoveryFactory::new(), config);
    let schema = probe.probe_schema(path, config.format()?)?;

    let fields: Vec<serde_json::Value> = schema
        .fields()
        .iter()
        .map(|f| {
            serde_json::json!({
                "name": f.name(),
                "type": f.data_type().to_string(),
                "nullable": f.is_nullable(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}

fn scan(
    path: &str,
    columns: Option<&str>,
    partition_spec: Option<&str>,
    config: &BridgeConfig,
) -> Result<()> {
    let partition_schema = match partition_spec {
        Some(spec) => parse_partition_schema(spec)?,
        None => Schema::empty(),
    };

    let probe = SchemaProbe::from_config(ParquetDiscoveryFactory::new(), config);
    let file_schema = probe.probe_schema(path, config.format()?)?;

    let data_fields: Vec<Arc<Field>> = match columns {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                file_schema
                    .field_with_name(name)
                    .map(|f| Arc::new(f.clone()))
                    .with_context(|| format!("column '{}' not found in {}", name, path))
            })
            .collect::<Result<_>>()?,
        None => file_schema
            .fields()
            .iter()
            .filter(|f| partition_schema.field_with_name(f.name()).is_err())
            .cloned()
            .collect(),
    };
    let data_schema = Schema::new(data_fields);

    let batches = scan_file(path, ByteRange::Whole, &data_schema, &partition_schema, config)?;
    let record_batches = batches
        .iter()
        .map(|b| b.to_record_batch())
        .collect::<dsbridge_core::Result<Vec<_>>>()?;

    info!(
        "Assembled {} rows in {} batches",
        record_batches.iter().map(|b| b.num_rows()).sum::<usize>(),
        record_batches.len()
    );
    println!("{}", pretty_format_batches(&record_batches)?);
    Ok(())
}

/// Parse `name:type,name:type` into a partition schema.
fn parse_partition_schema(spec: &str) -> Result<Schema> {
    let fields = spec
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<Field> {
            let (name, type_name) = entry
                .split_once(':')
                .unwrap_or((entry, "utf8"));
            Ok(Field::new(name.trim(), parse_data_type(type_name.trim())?, true))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::new(fields))
}

fn parse_data_type(s: &str) -> Result<DataType> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "utf8" | "string" => DataType::Utf8,
        "bool" | "boolean" => DataType::Boolean,
        "int8" => DataType::Int8,
        "int16" => DataType::Int16,
        "int32" | "int" => DataType::Int32,
        "int64" | "bigint" => DataType::Int64,
        "float32" | "float" => DataType::Float32,
        "float64" | "double" => DataType::Float64,
        "date32" | "date" => DataType::Date32,
        "timestamp" => DataType::Timestamp(TimeUnit::Microsecond, None),
        other => anyhow::bail!("unsupported partition column type: {}", other),
    })
}
