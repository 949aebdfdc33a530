// xmlify: render streamed tool-call arguments as XML-like tool tags.
//
// Usage:
//   xmlify --config xmlify.yaml transcript.sse
//   xmlify --format deltas --tool read_file < deltas.jsonl
//   xmlify --format anthropic --tool write_to_file --final-json capture.sse

use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use xmlify_rs::config::validation::validate_config;
use xmlify_rs::config::{load_config, AppConfig, InputFormat, ToolConfig};
use xmlify_rs::observability::{init_tracing, log_session_complete};
use xmlify_rs::protocol::DeltaSource;
use xmlify_rs::session::{SessionOptions, StreamSession};
use xmlify_rs::{StaticToolRegistry, XmlifyError};

#[derive(Parser)]
#[command(
    name = "xmlify",
    version,
    about = "Incrementally transcode streamed tool-call JSON arguments into XML tool tags."
)]
struct Cli {
    /// YAML config with the tool registry and feature flags.
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Transcript format; overrides `input.format` from the config.
    #[arg(long, value_name = "FORMAT")]
    format: Option<InputFormat>,

    /// Register a tool name. Can be specified multiple times.
    #[arg(long = "tool", value_name = "NAME")]
    tools: Vec<String>,

    /// Print each closed call's parsed arguments as JSON lines on stderr.
    #[arg(long)]
    final_json: bool,

    /// Transcript file; stdin when omitted.
    #[arg(value_name = "INPUT")]
    input: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    init_tracing(&config.features.log_level);

    if let Err(e) = run(&cli, &config) {
        tracing::error!(error = %e, "transcoding failed");
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, XmlifyError> {
    let mut config = match cli.config.as_deref() {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    for name in &cli.tools {
        if config.tool_names().any(|known| known == name.as_str()) {
            continue;
        }
        config.tools.push(ToolConfig {
            name: name.clone(),
            description: String::new(),
        });
    }
    if let Some(format) = cli.format {
        config.input.format = format;
    }
    if cli.final_json {
        config.features.emit_final_json = true;
    }
    validate_config(&config)?;
    if config.tools.is_empty() {
        return Err(XmlifyError::Config(
            "no tools registered; pass --tool or list them under `tools` in --config".into(),
        ));
    }
    Ok(config)
}

fn run(cli: &Cli, config: &AppConfig) -> Result<(), XmlifyError> {
    let reader: Box<dyn BufRead> = match cli.input.as_deref() {
        Some(path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let registry = Arc::new(StaticToolRegistry::from_config(config));
    let mut session = StreamSession::with_options(
        registry,
        SessionOptions {
            tentative_json: config.features.emit_tentative_json,
        },
    );
    let mut source = DeltaSource::new(config.input.format);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let started = Instant::now();

    tracing::info!(
        format = %config.input.format,
        tools = config.tools.len(),
        "transcoding started"
    );

    for line in reader.lines() {
        let mut line = line?;
        line.push('\n');
        for batch in source.feed(&line)? {
            write_fragment(&mut out, &session.process_delta_batch(&batch).xml)?;
        }
    }
    for batch in source.finish()? {
        write_fragment(&mut out, &session.process_delta_batch(&batch).xml)?;
    }
    write_fragment(&mut out, &session.finalize())?;

    if config.features.emit_final_json {
        let stderr = io::stderr();
        let mut err = stderr.lock();
        for (call, input) in session.final_inputs() {
            let record = serde_json::json!({
                "index": call.index,
                "id": call.id,
                "name": call.name,
                "input": input,
            });
            let line = serde_json::to_string(&record)
                .map_err(|e| XmlifyError::Internal(format!("failed to encode final input: {e}")))?;
            writeln!(err, "{line}")?;
        }
    }

    log_session_complete(&session.stats(), started);
    Ok(())
}

fn write_fragment(out: &mut impl Write, xml: &str) -> io::Result<()> {
    if xml.is_empty() {
        return Ok(());
    }
    out.write_all(xml.as_bytes())?;
    out.flush()
}
