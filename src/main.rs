use std::fs;
use std::io::{self, Read as _};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context as _};
use log::{debug, info, LevelFilter};
use structopt::StructOpt;

use sqlite2bq::{avro, csv, json, sqlite, Config, Db, Format, RowSink};

/// Dump sqlite3 query results as JSON, CSV or Avro.
#[derive(StructOpt)]
struct Opt {
    /// SQLite database to read from.
    db_filename: PathBuf,
    /// Table to dump. Use '-' to read a query from stdin.
    table: String,
    /// Output format: 'json', 'csv' or 'avro'.
    #[structopt(long = "format", default_value = "json")]
    format: Format,
    /// Field separator.
    #[structopt(long = "csv-fields-terminated-by", default_value = "\t")]
    field_sep: String,
    /// Row separator.
    #[structopt(long = "csv-records-terminated-by", default_value = "\n")]
    row_sep: String,
    /// Output string for NULL values.
    #[structopt(long = "csv-null-string", default_value = "\\N")]
    null_string: String,
    /// Output datetime as epoch seconds instead of RFC 3339.
    #[structopt(long = "epoch", parse(try_from_str), default_value = "true")]
    epoch: bool,
    /// Output directory for multi-file Avro export.
    #[structopt(long = "output-dir")]
    output_dir: Option<PathBuf>,
    /// Start a new output file after this many rows.
    #[structopt(long = "output-file-row-limit", default_value = "0")]
    output_file_row_limit: u64,
    /// Enable debug logging.
    #[structopt(long = "debug")]
    debug: bool,
    /// Only log errors.
    #[structopt(long = "quiet")]
    quiet: bool,
}

impl Opt {
    fn config(&self) -> Config {
        Config {
            field_sep: self.field_sep.clone(),
            row_sep: self.row_sep.clone(),
            null_string: self.null_string.clone(),
            date_epoch: self.epoch,
        }
    }

    fn query(&self) -> anyhow::Result<String> {
        if self.table == "-" {
            let mut query = String::new();
            io::stdin()
                .read_to_string(&mut query)
                .context("unable to read query from stdin")?;
            Ok(query)
        } else {
            Ok(format!("SELECT * FROM \"{}\"", self.table))
        }
    }
}

fn drain(rows: &mut sqlite::RowStream<'_>, sink: &mut dyn RowSink) -> sqlite2bq::Result<u64> {
    let mut count = 0;
    while let Some(row) = rows.next()? {
        sink.write_row(&row)?;
        count += 1;
    }
    sink.finish()?;
    Ok(count)
}

fn run(opt: &Opt) -> anyhow::Result<u64> {
    // Option cross-checks happen before the database is touched.
    if opt.output_file_row_limit > 0 {
        if opt.output_dir.is_none() {
            bail!("can't specify --output-file-row-limit without --output-dir");
        }
        if opt.format != Format::Avro {
            bail!("only avro is supported for multi-file export");
        }
    }

    let sql = opt.query()?;
    debug!("query: {}", sql.trim());

    let db = Db::open(&opt.db_filename)
        .with_context(|| format!("unable to open {}", opt.db_filename.display()))?;
    let mut query = db.query(&sql)?;
    let columns = query.columns().to_vec();
    let config = opt.config();
    let mut rows = query.rows()?;

    let stdout = io::stdout();
    match opt.format {
        Format::Json => {
            let out = io::BufWriter::new(stdout.lock());
            let mut sink = json::JsonSink::new(&config, &columns, out);
            Ok(drain(&mut rows, &mut sink)?)
        }
        Format::Csv => {
            let out = io::BufWriter::new(stdout.lock());
            let mut sink = csv::CsvSink::new(&config, &columns, out)?;
            Ok(drain(&mut rows, &mut sink)?)
        }
        Format::Avro => {
            let schema = avro::build_schema(&columns)?;
            match (&opt.output_dir, opt.output_file_row_limit) {
                (Some(dir), limit) if limit > 0 => {
                    fs::create_dir_all(dir).with_context(|| {
                        format!("unable to create output directory {}", dir.display())
                    })?;
                    let mut sink = avro::AvroSink::parts(&schema, &columns, dir, limit)?;
                    Ok(drain(&mut rows, &mut sink)?)
                }
                _ => {
                    let out = io::BufWriter::new(stdout.lock());
                    let mut sink = avro::AvroSink::stream(&schema, &columns, out);
                    Ok(drain(&mut rows, &mut sink)?)
                }
            }
        }
    }
}

fn main() {
    let opt = Opt::from_args();
    let level = if opt.debug {
        LevelFilter::Debug
    } else if opt.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match run(&opt) {
        Ok(count) => {
            info!("dumped {} rows", count);
        }
        Err(e) => {
            for (i, e) in e.chain().enumerate() {
                if i == 0 {
                    eprintln!("{}", e);
                } else {
                    eprintln!("caused by: {}", e);
                }
            }
            process::exit(1);
        }
    }
}
