use clap::{Parser, ValueEnum};
use embedded_templates::fs_utils::{
    WalkConfig, build_exclude_set, collect_sources, output_path, read_file_contents,
    relative_path,
};
use embedded_templates::position::{LineIndex, offset_range};
use embedded_templates::{
    LocalsSource, PreprocessOptions, Replacement, ReplacementKind, Result, TemplateMatch,
    preprocess, scan_templates,
};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const LONG_HELP: &str = r#"
Rewrites:
  <template>...</template>  ->  [GLIMMER_TEMPLATE(`...`)]
  hbs`...`                  ->  hbs(`...`)        (with --import-identifier hbs)

  With --template-tokens the free identifiers of each template are passed along:
  <template><Foo/></template> ->  [GLIMMER_TEMPLATE(`<Foo/>`, { scope() { return {Foo}; } })]

Examples:
  # Rewrite a file to stdout
  embedded-templates app/components/hello.gjs
  # Rewrite from stdin
  cat hello.gjs | embedded-templates - --relative-path app/components/hello.gjs
  # Only rewrite hbs literals actually imported from ember-cli-htmlbars
  embedded-templates app --import-path ember-cli-htmlbars --import-identifier hbs --out-dir tmp
  # Inline source maps and scope tokens
  embedded-templates app --source-maps --template-tokens --out-dir tmp
  # Print replacement records as JSON
  embedded-templates hello.gjs --replacements=json
  # List located templates
  embedded-templates app --list
"#;

/// Rewrite embedded templates into parseable JavaScript.
#[derive(Parser, Debug)]
#[command(
    name = "embedded-templates",
    version,
    about = "Rewrite embedded templates into parseable JavaScript.",
    after_long_help = LONG_HELP
)]
struct Cli {
    /// Files and directories to process. Use '-' for stdin.
    #[arg(value_name = "INPUTS", required = true)]
    inputs: Vec<PathBuf>,

    /// Relative path reported for a single input (source map naming, errors)
    #[arg(long, value_name = "PATH")]
    relative_path: Option<String>,

    /// Base directory that relative paths and exclude globs are resolved against
    #[arg(short, long, value_name = "DIR", env = "EMBEDDED_TEMPLATES_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Module the template tag function must be imported from
    #[arg(long, value_name = "MODULE")]
    import_path: Option<String>,

    /// Exported name of the template tag function, e.g. hbs
    #[arg(long, value_name = "NAME")]
    import_identifier: Option<String>,

    /// Custom tag name to rewrite instead of <template>
    #[arg(long, value_name = "TAG")]
    template_tag: Option<String>,

    /// Call wrapped around tag blocks
    #[arg(long, value_name = "NAME", default_value = embedded_templates::DEFAULT_TEMPLATE_TAG_REPLACEMENT)]
    template_tag_replacement: String,

    /// Append an inline source map
    #[arg(long)]
    source_maps: bool,

    /// Inject scope() with each template's free identifiers
    #[arg(long)]
    template_tokens: bool,

    /// Registered module providing the locals extractor
    #[arg(long, value_name = "MODULE", requires = "locals_export")]
    locals_module: Option<String>,

    /// Dotted export path of the locals extractor inside --locals-module
    #[arg(long, value_name = "PATH", requires = "locals_module")]
    locals_export: Option<String>,

    /// File extensions picked up in directories (comma separated)
    #[arg(long = "ext", value_name = "EXT", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Exclude glob patterns (repeatable). Patterns are relative to base-dir (default CWD)
    #[arg(short = 'x', long = "exclude", value_name = "GLOB", action = clap::ArgAction::Append)]
    exclude: Vec<String>,

    /// Disable compliance with .gitignore files
    #[arg(long)]
    no_gitignore: bool,

    /// Output file for a single input (defaults to stdout)
    #[arg(short, long, value_name = "FILE", conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Directory receiving one output file per input, mirroring relative paths
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Print replacement records instead of output (optionally: plain, json)
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "plain", conflicts_with = "list")]
    replacements: Option<ReportFormat>,

    /// List located templates (optionally: plain, json)
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "plain")]
    list: Option<ReportFormat>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum ReportFormat {
    /// One line per record
    Plain,
    /// JSON output for scripting
    Json,
}

/// A source to process: where it came from and what it contains
struct Input {
    display: String,
    relative: String,
    content: String,
}

#[derive(Serialize)]
struct TemplateInfo {
    path: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "tagName", skip_serializing_if = "Option::is_none")]
    tag_name: Option<String>,
    line: usize,
    column: usize,
    start: usize,
    end: usize,
}

#[derive(Serialize)]
struct FileReplacements {
    path: String,
    replacements: Vec<Replacement>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let inputs = match load_inputs(&cli) {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if cli.output.is_some() && inputs.len() > 1 {
        eprintln!("Error: --output takes a single input; use --out-dir for several");
        std::process::exit(2);
    }

    if let Err(e) = run(&cli, &inputs) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    debug!("Logging initialized with level: {}", level);
}

fn base_dir(cli: &Cli) -> PathBuf {
    cli.base_dir
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn load_inputs(cli: &Cli) -> Result<Vec<Input>> {
    if cli.inputs.len() == 1 && cli.inputs[0].as_path() == Path::new("-") {
        info!("Reading source from stdin...");
        let mut content = String::new();
        io::stdin().read_to_string(&mut content)?;
        let relative = cli
            .relative_path
            .clone()
            .unwrap_or_else(|| "stdin.js".to_string());
        return Ok(vec![Input {
            display: "<stdin>".to_string(),
            relative,
            content,
        }]);
    }

    let base = base_dir(cli);
    let mut walk = WalkConfig {
        base_dir: base.clone(),
        exclude: build_exclude_set(&cli.exclude)?,
        use_gitignore: !cli.no_gitignore,
        ..WalkConfig::default()
    };
    if !cli.extensions.is_empty() {
        walk.extensions = cli
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .collect();
    }

    let sources = collect_sources(&cli.inputs, &walk)?;
    info!("Found {} source file(s)", sources.len());

    let single = sources.len() == 1;
    sources
        .into_iter()
        .map(|path| {
            let relative = match (&cli.relative_path, single) {
                (Some(relative), true) => relative.clone(),
                _ => relative_path(&path, &base),
            };
            Ok(Input {
                display: path.display().to_string(),
                relative,
                content: read_file_contents(&path)?,
            })
        })
        .collect()
}

fn options_for(cli: &Cli, relative: &str) -> PreprocessOptions {
    let mut options = PreprocessOptions::new(relative, cli.template_tag_replacement.as_str())
        .with_source_maps(cli.source_maps)
        .with_template_tokens(cli.template_tokens);

    options.import_path.clone_from(&cli.import_path);
    options.import_identifier.clone_from(&cli.import_identifier);
    options.template_tag.clone_from(&cli.template_tag);

    if let (Some(module), Some(export)) = (&cli.locals_module, &cli.locals_export) {
        options = options.with_locals(LocalsSource::Lazy {
            require_path: module.clone(),
            export_path: export.clone(),
        });
    }

    options
}

/// Processes every input; per-file failures are reported and turn into a
/// non-zero exit once all files were tried
fn run(cli: &Cli, inputs: &[Input]) -> Result<()> {
    let mut failures = 0usize;
    let mut listed = Vec::new();
    let mut reports = Vec::new();

    for input in inputs {
        let outcome = if let Some(format) = cli.list {
            list_templates(cli, input, format, &mut listed)
        } else if let Some(format) = cli.replacements {
            report_replacements(cli, input, format, &mut reports)
        } else {
            write_output(cli, input)
        };

        if let Err(e) = outcome {
            eprintln!("Error: {}: {e}", input.display);
            failures += 1;
        }
    }

    if cli.list == Some(ReportFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&listed)?);
    }
    if cli.replacements == Some(ReportFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    if failures > 0 {
        eprintln!("{failures} of {} file(s) failed", inputs.len());
        std::process::exit(1);
    }
    Ok(())
}

fn list_templates(
    cli: &Cli,
    input: &Input,
    format: ReportFormat,
    listed: &mut Vec<TemplateInfo>,
) -> Result<()> {
    let matches = scan_templates(&input.content, &input.relative, cli.template_tag.as_deref())?;
    let lines = LineIndex::new(&input.content);

    for template in &matches {
        let info = template_info(&input.relative, template, &lines)?;
        match format {
            ReportFormat::Plain => println!(
                "{}:{}:{} {}{}",
                info.path,
                info.line,
                info.column,
                info.kind,
                info.tag_name
                    .as_deref()
                    .map(|t| format!(" {t}"))
                    .unwrap_or_default()
            ),
            ReportFormat::Json => listed.push(info),
        }
    }
    Ok(())
}

fn template_info(
    path: &str,
    template: &TemplateMatch,
    lines: &LineIndex<'_>,
) -> Result<TemplateInfo> {
    let open = offset_range(template.start())?;
    let close = offset_range(template.end())?;
    let location = lines.locate(open.start)?;

    Ok(TemplateInfo {
        path: path.to_string(),
        kind: template.kind(),
        tag_name: match template {
            TemplateMatch::TemplateLiteral { tag_name, .. } => Some(tag_name.clone()),
            TemplateMatch::TemplateTag { .. } => None,
        },
        line: location.line,
        column: location.col,
        start: open.start,
        end: close.end,
    })
}

fn report_replacements(
    cli: &Cli,
    input: &Input,
    format: ReportFormat,
    reports: &mut Vec<FileReplacements>,
) -> Result<()> {
    let result = preprocess(&input.content, &options_for(cli, &input.relative))?;

    match format {
        ReportFormat::Plain => {
            for replacement in &result.replacements {
                println!("{}", format_replacement(&input.relative, replacement));
            }
        }
        ReportFormat::Json => reports.push(FileReplacements {
            path: input.relative.clone(),
            replacements: result.replacements,
        }),
    }
    Ok(())
}

fn format_replacement(path: &str, replacement: &Replacement) -> String {
    let kind = match replacement.kind {
        ReplacementKind::Start => "start",
        ReplacementKind::End => "end",
    };
    format!(
        "{path}:{}:{} {kind} index={} old={} new={}",
        replacement.original_line,
        replacement.original_col,
        replacement.index,
        replacement.old_length,
        replacement.new_length
    )
}

fn write_output(cli: &Cli, input: &Input) -> Result<()> {
    debug!("Processing {}", input.display);
    let result = preprocess(&input.content, &options_for(cli, &input.relative))?;
    info!(
        "{}: {} replacement(s)",
        input.relative,
        result.replacements.len()
    );

    if let Some(out_dir) = &cli.out_dir {
        let target = output_path(out_dir, &input.relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Writing output to {}", target.display());
        std::fs::write(target, result.output)?;
    } else if let Some(output_path) = &cli.output {
        info!("Writing output to {}", output_path.display());
        std::fs::write(output_path, result.output)?;
    } else {
        print!("{}", result.output);
        io::stdout().flush()?;
    }
    Ok(())
}
