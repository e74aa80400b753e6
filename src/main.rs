use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xml_bralnik::{
    discover_documents, extract_document, load_table, process_batch, read_documents, save_table,
    AggregationRecord, BatchSummary, ComponentCategory, ExportMerger, ExtractorConfig, Ledger,
    MergeOutcome, DEFAULT_DELIMITER,
};

#[derive(Parser)]
#[command(name = "xml-bralnik", version, about = "Cadastral elaborate extraction and export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every *.xml file in a directory and merge into the export
    Process {
        /// Directory with the XML documents
        dir: PathBuf,

        /// Export file, created when missing
        #[arg(short, long, default_value = "xml_data_export.csv")]
        output: PathBuf,

        /// JSON extractor configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// SQLite ledger of processed documents
        #[arg(short, long)]
        ledger: Option<PathBuf>,

        /// Export field delimiter
        #[arg(short, long, default_value_t = DEFAULT_DELIMITER as char)]
        delimiter: char,
    },
    /// Extract one document and print its summary
    Show {
        file: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xml_bralnik=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            dir,
            output,
            config,
            ledger,
            delimiter,
        } => run_process(&dir, &output, config.as_deref(), ledger.as_deref(), delimiter)?,
        Commands::Show { file, config } => run_show(&file, config.as_deref())?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ExtractorConfig> {
    match path {
        Some(path) => ExtractorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ExtractorConfig::default()),
    }
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    if !delimiter.is_ascii() {
        bail!("Delimiter must be a single ASCII character, got {:?}", delimiter);
    }
    Ok(delimiter as u8)
}

fn run_process(
    dir: &Path,
    output: &Path,
    config: Option<&Path>,
    ledger: Option<&Path>,
    delimiter: char,
) -> Result<()> {
    let config = load_config(config)?;
    let delimiter = delimiter_byte(delimiter)?;

    println!("📂 Scanning {}...", dir.display());
    let paths = discover_documents(dir)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    let documents = read_documents(&paths);
    println!("✓ Found {} documents", documents.len());

    let store = process_batch(&documents, &config)?;
    let records = store.records();

    let existing = load_table(output, delimiter)
        .with_context(|| format!("Failed to read existing export {}", output.display()))?;
    let now = Utc::now();

    let merged = match ledger {
        Some(ledger_path) => {
            let mut ledger = Ledger::open(ledger_path)
                .with_context(|| format!("Failed to open ledger {}", ledger_path.display()))?;
            let mut outcome: Option<MergeOutcome> = None;
            let run = ledger.merge_with(&records, now, |fresh| {
                let merged = ExportMerger::merge(existing, fresh, now);
                save_table(output, &merged.table, delimiter)?;
                outcome = Some(merged);
                Ok(())
            })?;
            println!("✓ Ledger run {} registered {} documents", run.run_id, run.registered);
            outcome
        }
        None => {
            let merged = ExportMerger::merge(existing, &records, now);
            save_table(output, &merged.table, delimiter)?;
            Some(merged)
        }
    };

    let summary = BatchSummary::from_store(&store, merged.as_ref());
    print_summary(&summary, output);

    for (file_name, reason) in store.failures() {
        eprintln!("❌ {}: {}", file_name, reason);
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary, output: &Path) {
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Documents:        {}", summary.documents);
    println!("✓ Extracted:        {}", summary.succeeded);
    println!("✓ Failed:           {}", summary.failed);
    println!("✓ New rows:         {}", summary.merged);
    println!("✓ Already exported: {}", summary.skipped);
    println!("✓ Unresolved:       {}", summary.unresolved);
    println!("💾 Export: {}", output.display());
}

fn run_show(file: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());

    let record = extract_document(&file_name, raw, &config)?;
    print_record(&record);
    Ok(())
}

fn print_record(record: &AggregationRecord) {
    println!("📄 {}", record.file_name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Key:              {}", record.composite_key());
    println!("Agent:            {}", record.agent_id);
    println!("Procedures:       {}", record.procedure_count);
    println!("Procedure types:  {}", record.procedure_types.join(", "));
    println!("Payload kinds:    {}", record.payload_kinds.join(", "));
    let components: Vec<String> = ComponentCategory::ALL
        .iter()
        .map(|c| format!("{} {}", c.name(), record.components.get(*c)))
        .collect();
    println!("Components:       {}", components.join(" | "));

    println!("\n📊 Change markers");
    for category in &record.categories {
        let counts: Vec<String> = category
            .counts
            .iter()
            .map(|(marker, count)| format!("{}={}", marker.code(), count))
            .collect();
        println!("  {:<24} {}", category.label, counts.join("  "));
    }

    println!("\n🔗 Descriptors");
    println!("  Parcels:        {}", record.parcels.join(", "));
    println!("  Buildings:      {}", record.buildings.join(", "));
    println!("  Soil quality:   {}", record.soil_quality_zones.join(", "));
    if record.unresolved_buildings > 0 {
        println!("  ⚠️  Unresolved buildings: {}", record.unresolved_buildings);
    }
}
