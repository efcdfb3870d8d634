//! eduparse CLI - educational document analysis tool

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use eduparse::export::{document_to_markdown, to_json, to_markdown, ExportOptions, JsonFormat};
use eduparse::{
    detect_format, AnalysisCache, CacheConfig, DocumentAnalysis, Eduparse, ParseOptions,
    QuestionType,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "eduparse")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Analyze educational documents: questions, structure, concepts and LMS export", long_about = None)]
struct Cli {
    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file with parse options
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fail on the first extraction error instead of degrading
    #[arg(long, global = true)]
    strict: bool,

    /// Page range for PDFs (e.g. "3-7" or "5")
    #[arg(long, global = true)]
    pages: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a document and print the normalized document
    Parse {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Full analysis of one or more documents
    Analyze {
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Cache directory
        #[arg(long, value_name = "DIR", env = "EDUPARSE_CACHE_DIR")]
        cache: Option<PathBuf>,

        /// Do not read or write the cache
        #[arg(long)]
        no_cache: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Output file (single input) or directory (several inputs)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// List the questions found in a document
    Questions {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Fuse a text file with the images it references
    Fuse {
        /// Text file
        #[arg(value_name = "TEXT")]
        input: PathBuf,

        /// Image as id=path (repeatable)
        #[arg(long = "image", value_name = "ID=PATH")]
        images: Vec<String>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Write an LMS content package
    Package {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Package directory
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Also write a .zip archive
        #[arg(long)]
        zip: bool,
    },

    /// Inspect or clear the analysis cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show detected format and metadata
    Info {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count and size
    Stats {
        #[arg(long, value_name = "DIR", env = "EDUPARSE_CACHE_DIR")]
        dir: Option<PathBuf>,
    },
    /// Remove every entry
    Clear {
        #[arg(long, value_name = "DIR", env = "EDUPARSE_CACHE_DIR")]
        dir: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// JSON
    Json,
    /// Markdown
    Md,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = load_options(&cli).and_then(|options| match cli.command {
        Commands::Parse {
            input,
            format,
            output,
            compact,
        } => cmd_parse(&input, options, format, output.as_deref(), compact),
        Commands::Analyze {
            inputs,
            cache,
            no_cache,
            format,
            output,
            compact,
        } => {
            let cache = if no_cache { None } else { Some(cache_config(cache)) };
            cmd_analyze(&inputs, options, cache, format, output.as_deref(), compact)
        }
        Commands::Questions { input } => cmd_questions(&input, options),
        Commands::Fuse {
            input,
            images,
            compact,
        } => cmd_fuse(&input, &images, options, compact),
        Commands::Package { input, output, zip } => cmd_package(&input, options, &output, zip),
        Commands::Cache { action } => match action {
            CacheAction::Stats { dir } => cmd_cache_stats(cache_config(dir)),
            CacheAction::Clear { dir } => cmd_cache_clear(cache_config(dir)),
        },
        Commands::Info { input } => cmd_info(&input, options),
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    });

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_options(cli: &Cli) -> CliResult<ParseOptions> {
    let mut options = match &cli.config {
        Some(path) => serde_json::from_str::<ParseOptions>(&fs::read_to_string(path)?)
            .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?,
        None => ParseOptions::default(),
    };
    if cli.strict {
        options = options.strict();
    }
    if let Some(pages) = &cli.pages {
        let (first, last) = parse_page_range(pages)?;
        options = options.with_pages(first, last);
    }
    Ok(options)
}

fn parse_page_range(spec: &str) -> CliResult<(u32, u32)> {
    let invalid = || format!("Invalid page range: {}", spec);
    let (first, last) = match spec.split_once('-') {
        Some((a, b)) => (a.trim().parse::<u32>(), b.trim().parse::<u32>()),
        None => (spec.trim().parse::<u32>(), spec.trim().parse::<u32>()),
    };
    let (first, last) = (first.map_err(|_| invalid())?, last.map_err(|_| invalid())?);
    if first == 0 || last < first {
        return Err(invalid().into());
    }
    Ok((first, last))
}

fn cache_config(dir: Option<PathBuf>) -> CacheConfig {
    match dir {
        Some(dir) => CacheConfig::new(dir),
        None => CacheConfig::default(),
    }
}

fn json_format(compact: bool) -> JsonFormat {
    if compact {
        JsonFormat::Compact
    } else {
        JsonFormat::Pretty
    }
}

fn emit(content: &str, output: Option<&Path>) -> CliResult<()> {
    if let Some(path) = output {
        fs::write(path, content)?;
        println!("{} {}", "Saved to".green(), path.display());
    } else {
        println!("{}", content);
    }
    Ok(())
}

fn render_analysis(analysis: &DocumentAnalysis, format: OutputFormat, compact: bool) -> CliResult<String> {
    Ok(match format {
        OutputFormat::Json => to_json(analysis, json_format(compact))?,
        OutputFormat::Md => to_markdown(analysis),
    })
}

fn cmd_parse(
    input: &Path,
    options: ParseOptions,
    format: OutputFormat,
    output: Option<&Path>,
    compact: bool,
) -> CliResult<()> {
    let doc = eduparse::parse_file_with_options(input, &options)?;
    let content = match format {
        OutputFormat::Json => to_json(&doc, json_format(compact))?,
        OutputFormat::Md => document_to_markdown(&doc),
    };
    emit(&content, output)
}

fn cmd_analyze(
    inputs: &[PathBuf],
    options: ParseOptions,
    cache: Option<CacheConfig>,
    format: OutputFormat,
    output: Option<&Path>,
    compact: bool,
) -> CliResult<()> {
    let mut pipeline = Eduparse::new()?.with_options(options);
    if let Some(config) = cache {
        pipeline = pipeline.with_cache(config)?;
    }

    if let [input] = inputs {
        let analysis = pipeline.analyze_file(input)?;
        if analysis.incomplete {
            eprintln!("{}", "Enrichment unavailable; structural analysis only".yellow());
        }
        return emit(&render_analysis(&analysis, format, compact)?, output);
    }

    let output_dir = output.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&output_dir)?;

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    pb.set_message("Reading files...");
    let mut batch = Vec::with_capacity(inputs.len());
    for input in inputs {
        let hint = input.extension().and_then(|e| e.to_str()).map(str::to_string);
        batch.push((fs::read(input)?, hint));
    }

    pb.set_message("Analyzing...");
    let results = pipeline.analyze_batch(batch);

    let extension = match format {
        OutputFormat::Json => "json",
        OutputFormat::Md => "md",
    };
    let mut failures = 0;
    let mut written = Vec::new();
    for (input, result) in inputs.iter().zip(results) {
        pb.inc(1);
        match result {
            Ok(analysis) => {
                let stem = input.file_stem().unwrap_or_default().to_string_lossy();
                let path = output_dir.join(format!("{}.analysis.{}", stem, extension));
                fs::write(&path, render_analysis(&analysis, format, compact)?)?;
                written.push((path, analysis.questions.len()));
            }
            Err(e) => {
                failures += 1;
                pb.println(format!("{} {}: {}", "Failed".red(), input.display(), e));
            }
        }
    }
    pb.finish_with_message("Done!");

    println!("\n{}", "Output files:".green().bold());
    for (i, (path, questions)) in written.iter().enumerate() {
        let branch = if i + 1 == written.len() { "└─" } else { "├─" };
        println!("  {} {} ({} questions)", branch.dimmed(), path.display(), questions);
    }
    if failures > 0 {
        return Err(format!("{} of {} documents failed", failures, inputs.len()).into());
    }
    Ok(())
}

fn cmd_questions(input: &Path, options: ParseOptions) -> CliResult<()> {
    let analysis = Eduparse::new()?.with_options(options).analyze_file(input)?;

    if analysis.questions.is_empty() {
        println!("{}", "No questions found".yellow());
        return Ok(());
    }

    println!(
        "{} ({})",
        "Questions".cyan().bold(),
        analysis.questions.len()
    );
    println!("{}", "─".repeat(40).dimmed());
    for question in &analysis.questions {
        let kind = match question.question_type {
            QuestionType::MultipleChoice => question.question_type.as_str().green(),
            QuestionType::FillInBlank => question.question_type.as_str().blue(),
            QuestionType::Essay => question.question_type.as_str().magenta(),
            QuestionType::Unknown => question.question_type.as_str().dimmed(),
        };
        println!("{}. {} [{}]", question.number.bold(), question.text, kind);
        for option in &question.options {
            println!("   {} {}", format!("{}.", option.label).dimmed(), option.text);
        }
    }
    Ok(())
}

fn cmd_fuse(input: &Path, images: &[String], options: ParseOptions, compact: bool) -> CliResult<()> {
    let text = fs::read_to_string(input)?;

    let mut image_data = BTreeMap::new();
    for spec in images {
        let (id, path) = spec
            .split_once('=')
            .ok_or_else(|| format!("Invalid image '{}', expected ID=PATH", spec))?;
        image_data.insert(id.trim().to_string(), fs::read(path.trim())?);
    }

    let pipeline = Eduparse::new()?.with_options(options);
    let combined = pipeline.analyze_mixed(&text, &image_data);

    for id in &combined.failed_images {
        eprintln!("{} image {} could not be analyzed", "Warning:".yellow(), id);
    }
    println!("{}", to_json(&combined, json_format(compact))?);
    Ok(())
}

fn cmd_package(input: &Path, options: ParseOptions, output: &Path, zip: bool) -> CliResult<()> {
    let original = fs::read(input)?;
    let hint = input.extension().and_then(|e| e.to_str());
    let analysis = Eduparse::new()?.with_options(options).analyze(&original, hint)?;

    let export = ExportOptions::default().with_zip(zip);
    let handle = eduparse::to_lms_package(&analysis, &original, output, &export)?;

    println!("{} {}", "Package written to".green().bold(), handle.root.display());
    for (i, file) in handle.files.iter().enumerate() {
        let branch = if i + 1 == handle.files.len() { "└─" } else { "├─" };
        println!("  {} {}", branch.dimmed(), file.display());
    }
    if let Some(archive) = &handle.archive {
        println!("{} {}", "Archive:".green(), archive.display());
    }
    Ok(())
}

fn cmd_cache_stats(config: CacheConfig) -> CliResult<()> {
    let cache = AnalysisCache::open(config)?;
    let stats = cache.stats();

    println!("{}", "Cache".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "Directory".bold(), cache.config().dir.display());
    println!("{}: {} / {}", "Entries".bold(), stats.entries, stats.max_entries);
    println!("{}: {} bytes", "Size".bold(), stats.total_bytes);
    Ok(())
}

fn cmd_cache_clear(config: CacheConfig) -> CliResult<()> {
    let cache = AnalysisCache::open(config)?;
    let count = cache.len();
    cache.clear()?;
    println!("{} {} entries", "Cleared".green(), count);
    Ok(())
}

fn cmd_info(input: &Path, options: ParseOptions) -> CliResult<()> {
    let data = fs::read(input)?;
    let hint = input.extension().and_then(|e| e.to_str());
    let format = detect_format(&data, hint)?;
    let doc = Eduparse::new()?.with_options(options).parse(&data, hint)?;
    let meta = &doc.metadata;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {} ({})", "Format".bold(), format, format.mime_type());
    println!("{}: {}", "Title".bold(), meta.display_title(&doc));
    if let Some(ref author) = meta.author {
        println!("{}: {}", "Author".bold(), author);
    }
    if let Some(ref subject) = meta.subject {
        println!("{}: {}", "Subject".bold(), subject);
    }
    if !meta.keywords.is_empty() {
        println!("{}: {}", "Keywords".bold(), meta.keywords.join(", "));
    }
    if let Some(ref created) = meta.created {
        println!("{}: {}", "Created".bold(), created);
    }
    if let Some(ref modified) = meta.modified {
        println!("{}: {}", "Modified".bold(), modified);
    }
    if let Some(pages) = meta.page_count {
        println!("{}: {}", "Pages".bold(), pages);
    } else if let Some(pages) = meta.estimated_pages {
        println!("{}: ~{:.1}", "Pages".bold(), pages);
    }
    if let (Some(w), Some(h)) = (meta.width, meta.height) {
        println!("{}: {}x{}", "Dimensions".bold(), w, h);
    }

    println!();
    println!("{}", "Content Statistics".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "Words".bold(), doc.word_count());
    println!("{}: {}", "Characters".bold(), doc.raw_text.chars().count());
    println!("{}: {}", "Headings".bold(), doc.headings.len());
    println!("{}: {}", "Tables".bold(), doc.tables.len());
    println!("{}: {}", "Figures".bold(), doc.figures.len());
    println!("{}: {}", "Math regions".bold(), doc.math_regions.len());

    if !doc.warnings.is_empty() {
        println!();
        println!("{}", "Warnings".yellow().bold());
        for warning in &doc.warnings {
            println!("  {} {}", "-".dimmed(), warning);
        }
    }
    Ok(())
}

fn cmd_version() {
    println!("{} {}", "eduparse".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Educational document analysis tool");
    println!();
    println!("License: MIT");
}
