mod bridge;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ccol_core::{write_file, Reader, Schema};

/// Schema used when `--schema` is not given.
const DEFAULT_SCHEMA: &str = "id:int32,price:float64,name:string";

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "ccol",
    about = "Convert between CSV and the CCOL columnar format, and inspect CCOL files",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a CSV file (with header row) into a CCOL file
    #[command(alias = "csv_to_custom")]
    ToCcol {
        /// Source CSV file
        input: PathBuf,
        /// Destination CCOL file
        output: PathBuf,
        /// Column declarations as name:type pairs (int32 | float64 | string)
        #[arg(short, long, default_value = DEFAULT_SCHEMA)]
        schema: String,
    },
    /// Convert a CCOL file back into CSV
    #[command(alias = "custom_to_csv")]
    ToCsv {
        /// Source CCOL file
        input: PathBuf,
        /// Destination CSV file
        output: PathBuf,
        /// Only read and emit these columns, in this order
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,
    },
    /// Print header fields, schema, and block table statistics
    Inspect {
        /// CCOL file to inspect
        file: PathBuf,
        /// Print per-block details
        #[arg(long)]
        blocks: bool,
    },
    /// Time a full CSV parse of one column against a selective CCOL read
    Bench {
        /// CSV file
        csv: PathBuf,
        /// CCOL file converted from the same CSV
        ccol: PathBuf,
        /// Column to fetch
        #[arg(short, long, default_value = "id")]
        column: String,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn open_reader(path: &Path) -> anyhow::Result<Reader<File>> {
    Reader::open(path).with_context(|| format!("opening CCOL file {:?}", path))
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_to_ccol(input: PathBuf, output: PathBuf, schema: &str) -> anyhow::Result<()> {
    let schema = Schema::parse(schema).with_context(|| format!("parsing schema {:?}", schema))?;
    let t0 = Instant::now();

    let src = File::open(&input).with_context(|| format!("opening input file {:?}", input))?;
    let csv_size = src.metadata()?.len();
    let columns = bridge::read_csv(BufReader::new(src), &schema)
        .with_context(|| format!("reading CSV {:?}", input))?;

    let summary = write_file(&output, &schema, &columns)
        .with_context(|| format!("writing CCOL file {:?}", output))?;

    info!(
        rows = summary.row_count,
        columns = summary.columns.len(),
        csv = %human_bytes(csv_size),
        ccol = %human_bytes(summary.file_size),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "converted {:?} → {:?}",
        input,
        output
    );
    Ok(())
}

fn run_to_csv(input: PathBuf, output: PathBuf, columns: Vec<String>) -> anyhow::Result<()> {
    let t0 = Instant::now();
    let mut reader = open_reader(&input)?;

    let names: Vec<String> = if columns.is_empty() {
        reader.schema().names().map(str::to_string).collect()
    } else {
        columns.clone()
    };
    let order: Vec<&str> = names.iter().map(String::as_str).collect();
    let wanted = if columns.is_empty() {
        None
    } else {
        Some(order.as_slice())
    };
    let data = reader
        .read(wanted)
        .with_context(|| format!("decoding {:?}", input))?;

    let rows = usize::try_from(reader.row_count())?;
    let dst = File::create(&output).with_context(|| format!("creating output file {:?}", output))?;
    bridge::write_csv(BufWriter::new(dst), &order, &data, rows)
        .with_context(|| format!("writing CSV {:?}", output))?;

    info!(
        rows,
        columns = order.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "converted {:?} → {:?}",
        input,
        output
    );
    Ok(())
}

fn run_inspect(file: PathBuf, show_blocks: bool) -> anyhow::Result<()> {
    let reader = open_reader(&file)?;
    let file_size = std::fs::metadata(&file)?.len();
    let header = &reader.header;

    println!("=== CCOL File: {:?} ===", file);
    println!();
    println!("  format version : {}", header.version);
    println!("  rows           : {}", header.row_count);
    println!("  columns        : {}", header.column_count);
    println!(
        "  metadata       : {} at offset {}",
        human_bytes(header.metadata_len as u64),
        header.metadata_offset
    );
    println!("  raw size       : {}", human_bytes(reader.raw_size()));
    println!("  compressed     : {}", human_bytes(reader.compressed_size()));
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  ratio          : {:.2}x", reader.ratio());
    println!();
    println!("  {:<20}  {:<8}  {:>12}  {:>12}", "column", "type", "compressed", "raw");
    println!("  {}", "-".repeat(58));
    for col in reader.columns() {
        println!(
            "  {:<20}  {:<8}  {:>12}  {:>12}",
            col.name,
            col.column_type.name(),
            human_bytes(col.compressed_size()),
            human_bytes(col.raw_size())
        );
    }

    if show_blocks {
        println!();
        println!(
            "  {:<20}  {:>8}  {:>12}  {:>12}  {:>12}  {:>16}",
            "column", "block", "file offset", "compressed", "raw", "checksum"
        );
        println!("  {}", "-".repeat(90));
        for col in reader.columns() {
            for (i, b) in col.blocks.iter().enumerate() {
                let role = match (col.blocks.len(), i) {
                    (1, _) => "data",
                    (_, 0) => "payload",
                    _ => "offsets",
                };
                println!(
                    "  {:<20}  {:>8}  {:>12}  {:>12}  {:>12}  {:016x}",
                    col.name,
                    role,
                    b.offset,
                    human_bytes(b.comp_size),
                    human_bytes(b.raw_size),
                    b.checksum
                );
            }
        }
    }

    Ok(())
}

fn run_bench(csv_path: PathBuf, ccol_path: PathBuf, column: &str) -> anyhow::Result<()> {
    // Full CSV parse, keeping one field.
    let t0 = Instant::now();
    let mut csv_reader = csv::Reader::from_path(&csv_path)
        .with_context(|| format!("opening CSV {:?}", csv_path))?;
    let pos = csv_reader
        .headers()?
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| anyhow::anyhow!("CSV {:?} has no column '{}'", csv_path, column))?;
    let mut csv_rows = 0usize;
    for record in csv_reader.records() {
        let record = record?;
        if record.get(pos).is_some() {
            csv_rows += 1;
        }
    }
    let csv_elapsed = t0.elapsed();

    // Selective CCOL read.
    let t0 = Instant::now();
    let mut reader = open_reader(&ccol_path)?;
    let data = reader.read_column(column)?;
    let ccol_elapsed = t0.elapsed();
    let fetched = reader
        .column_meta(column)
        .map(|c| c.compressed_size())
        .unwrap_or(0);

    if data.len() != csv_rows {
        anyhow::bail!(
            "row count differs: CSV has {} rows, CCOL column has {}",
            csv_rows,
            data.len()
        );
    }

    println!();
    println!("=== Column Read Benchmark: '{}' ===", column);
    println!("  rows              : {}", csv_rows);
    println!(
        "  CSV parse         : {:.4}s ({})",
        csv_elapsed.as_secs_f64(),
        human_bytes(std::fs::metadata(&csv_path)?.len())
    );
    println!(
        "  CCOL selective    : {:.4}s ({} of blocks)",
        ccol_elapsed.as_secs_f64(),
        human_bytes(fetched)
    );
    if ccol_elapsed.as_secs_f64() > 0.0 {
        println!(
            "  speedup           : {:.1}x",
            csv_elapsed.as_secs_f64() / ccol_elapsed.as_secs_f64()
        );
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::ToCcol {
            input,
            output,
            schema,
        } => run_to_ccol(input, output, &schema),
        Commands::ToCsv {
            input,
            output,
            columns,
        } => run_to_csv(input, output, columns),
        Commands::Inspect { file, blocks } => run_inspect(file, blocks),
        Commands::Bench { csv, ccol, column } => run_bench(csv, ccol, &column),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn legacy_subcommand_names_parse() {
        let cli = Cli::try_parse_from(["ccol", "csv_to_custom", "in.csv", "out.ccol"]).unwrap();
        match cli.command {
            Commands::ToCcol { schema, .. } => assert_eq!(schema, DEFAULT_SCHEMA),
            _ => panic!("expected to-ccol"),
        }
        let cli = Cli::try_parse_from(["ccol", "custom_to_csv", "in.ccol", "out.csv", "-c", "id,name"])
            .unwrap();
        match cli.command {
            Commands::ToCsv { columns, .. } => assert_eq!(columns, vec!["id", "name"]),
            _ => panic!("expected to-csv"),
        }
    }

    #[test]
    fn csv_round_trip_through_ccol() {
        let dir = tempfile::tempdir().unwrap();
        let csv_in = dir.path().join("sample.csv");
        let ccol = dir.path().join("sample.ccol");
        let csv_out = dir.path().join("out.csv");
        let subset = dir.path().join("subset.csv");
        std::fs::write(&csv_in, "id,price,name\n1,10.5,apple\n2,20.0,banana\n").unwrap();

        run_to_ccol(csv_in.clone(), ccol.clone(), DEFAULT_SCHEMA).unwrap();
        run_to_csv(ccol.clone(), csv_out.clone(), Vec::new()).unwrap();
        assert_eq!(
            std::fs::read_to_string(&csv_out).unwrap(),
            std::fs::read_to_string(&csv_in).unwrap()
        );

        run_to_csv(ccol.clone(), subset.clone(), vec!["name".into(), "id".into()]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&subset).unwrap(),
            "name,id\napple,1\nbanana,2\n"
        );

        run_inspect(ccol.clone(), true).unwrap();
        run_bench(csv_in, ccol, "price").unwrap();
    }

    #[test]
    fn out_of_range_csv_fails_without_leaving_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let csv_in = dir.path().join("big.csv");
        let ccol = dir.path().join("big.ccol");
        std::fs::write(&csv_in, "id,price,name\n4294967296,1.0,x\n").unwrap();

        let err = run_to_ccol(csv_in, ccol.clone(), DEFAULT_SCHEMA).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ccol_core::CcolError>(),
            Some(ccol_core::CcolError::OutOfRange { .. })
        ));
        assert!(!ccol.exists());
    }

    #[test]
    fn unknown_column_fails_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let csv_in = dir.path().join("s.csv");
        let ccol = dir.path().join("s.ccol");
        std::fs::write(&csv_in, "id,price,name\n1,1.5,a\n").unwrap();
        run_to_ccol(csv_in, ccol.clone(), DEFAULT_SCHEMA).unwrap();

        let err = run_to_csv(ccol, dir.path().join("o.csv"), vec!["nope".into()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ccol_core::CcolError>(),
            Some(ccol_core::CcolError::UnknownColumn(_))
        ));
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
    }
}
