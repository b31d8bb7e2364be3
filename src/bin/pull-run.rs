//! CLI tool to run NDJSON records through a pull pipeline.
//!
//! Each non-empty line of the input file is one JSON-object record. The
//! chain is assembled from flags and applied in kind order: `--keep`
//! filters, then `--require` contract checks, then `--put` writes.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::process;

use clap::Parser;
use pullpipe::{
    BoxStage, Consumer, Filter, Record, RecordStage, Schema, Source, Stage, read_records,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Run newline-delimited JSON records through a pull pipeline.
#[derive(Parser)]
#[command(name = "pull-run")]
struct Cli {
    /// Input file of newline-delimited JSON records (one object per line)
    input: String,

    /// Keep only records whose FIELD equals VALUE (JSON, or a bare string)
    #[arg(long, value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    keep: Vec<(String, Value)>,

    /// Fail unless every record carries a non-null FIELD
    #[arg(long, value_name = "FIELD")]
    require: Vec<String>,

    /// Set FIELD to VALUE on every record (JSON, or a bare string)
    #[arg(long, value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    put: Vec<(String, Value)>,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Show record counts on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Parse `FIELD=VALUE`, taking VALUE as JSON when it parses and as a bare
/// string otherwise.
fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let Some((field, value)) = raw.split_once('=') else {
        return Err(format!("expected FIELD=VALUE, got '{raw}'"));
    };
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let file = match File::open(&cli.input) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error opening input file '{}': {e}", cli.input);
            process::exit(1);
        }
    };
    let records = match read_records(BufReader::new(file)) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error reading input file '{}': {e}", cli.input);
            process::exit(1);
        }
    };
    let input_count = records.len();

    let mut head: BoxStage<Record> = Box::new(Source::from_values(records).with_name("input"));

    for (field, value) in cli.keep {
        let label = format!("keep:{field}");
        let mut filter =
            Filter::new(move |record: &Record| record.get(&field) == Some(&value))
                .with_name(label);
        filter.set_upstream(head);
        head = Box::new(filter);
    }

    if !cli.require.is_empty() {
        let mut schema = Schema::strict();
        for field in &cli.require {
            schema = schema.require(field.clone());
        }
        let mut stage = RecordStage::new("require", schema, |_proxy| Ok(()));
        stage.set_upstream(head);
        head = Box::new(stage);
    }

    if !cli.put.is_empty() {
        let puts = cli.put;
        let mut stage = RecordStage::permissive("put", move |proxy| {
            for (field, value) in &puts {
                proxy.set(field, value.clone())?;
            }
            Ok(())
        });
        stage.set_upstream(head);
        head = Box::new(stage);
    }

    let mut output_records = Vec::new();
    if let Err(e) = head.for_each(|record| output_records.push(record)) {
        eprintln!("Pipeline error: {e}");
        process::exit(1);
    }
    let output_count = output_records.len();

    let mut lines = Vec::with_capacity(output_count);
    for record in &output_records {
        match serde_json::to_string(record) {
            Ok(line) => lines.push(line),
            Err(e) => {
                eprintln!("Error encoding record: {e}");
                process::exit(1);
            }
        }
    }
    let output_text = lines.join("\n");

    if let Some(out_path) = &cli.output {
        if let Some(parent) = Path::new(out_path.as_str()).parent()
            && !parent.as_os_str().is_empty()
            && fs::create_dir_all(parent).is_err()
        {
            eprintln!("Error creating output directory for '{out_path}'");
            process::exit(1);
        }
        if let Err(e) = fs::write(out_path, &output_text) {
            eprintln!("Error writing output file '{out_path}': {e}");
            process::exit(1);
        }
    } else {
        if let Err(e) = io::stdout().write_all(output_text.as_bytes()) {
            eprintln!("Error writing output: {e}");
            process::exit(1);
        }
        if !output_text.is_empty() {
            println!();
        }
    }

    if cli.verbose {
        eprintln!("Records:  {input_count} in -> {output_count} out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_values() {
        let (field, value) = parse_assignment("dept=\"SALES\"").unwrap();
        assert_eq!(field, "dept");
        assert_eq!(value, Value::String("SALES".to_string()));
    }

    #[test]
    fn falls_back_to_bare_strings() {
        let (_, value) = parse_assignment("dept=SALES").unwrap();
        assert_eq!(value, Value::String("SALES".to_string()));
    }

    #[test]
    fn parses_numbers_and_booleans() {
        let (_, value) = parse_assignment("n=42").unwrap();
        assert_eq!(value, Value::from(42));
        let (_, value) = parse_assignment("flag=true").unwrap();
        assert_eq!(value, Value::Bool(true));
    }

    #[test]
    fn rejects_missing_equals() {
        assert!(parse_assignment("dept").is_err());
    }
}
