use std::error::Error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;
use xbf::batch::validate_all;
use xbf::format::TableKind;
use xbf::schema::PermissiveResolver;
use xbf::{
    FormatVersion, LoadOptions, ReaderContext, ResolvePolicy, SchemaResolver, Script, WriteOptions,
};

#[derive(Parser, Debug)]
#[command(name = "xbf", version, about = "Compiled XAML binary (XBF) inspector and compiler")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a compiled file and print its token stream as JSON.
    Dump {
        /// Input file path. Omit or use '-' to read from stdin.
        input: Option<String>,

        /// Output file path (prints to stdout if omitted).
        #[arg(short, long, value_name = "file")]
        output: Option<String>,

        /// Indentation size; 0 prints compact JSON (default: 2).
        #[arg(long, value_name = "number", default_value_t = 2)]
        indent: usize,

        /// Skip grammar validation while decoding.
        #[arg(long = "no-validate", action = ArgAction::SetFalse, default_value_t = true)]
        validate: bool,
    },
    /// Print the header and metadata tables of a compiled file as JSON.
    Tables {
        /// Input file path. Omit or use '-' to read from stdin.
        input: Option<String>,

        /// Indentation size; 0 prints compact JSON (default: 2).
        #[arg(long, value_name = "number", default_value_t = 2)]
        indent: usize,
    },
    /// Decode and grammar-check compiled files.
    Validate {
        #[arg(required = true)]
        inputs: Vec<String>,
    },
    /// Compile a JSON token script into a binary file.
    Compile {
        /// Script path. Omit or use '-' to read from stdin.
        input: Option<String>,

        /// Output file path (writes to stdout if omitted).
        #[arg(short, long, value_name = "file")]
        output: Option<String>,

        /// Format version to write: 1, 2 or 2.1 (default: the script's, else 2.1).
        #[arg(long = "format-version", value_name = "version")]
        format_version: Option<FormatVersion>,

        /// Write every symbol to the tables instead of using stable indices.
        #[arg(long = "no-stable-indices", action = ArgAction::SetFalse, default_value_t = true)]
        stable_indices: bool,

        /// Drop line records from the node stream.
        #[arg(long = "no-line-info")]
        no_line_info: bool,
    },
}

#[derive(Debug)]
enum InputSource {
    Stdin,
    File(String),
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("ERROR  {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("XBF_LOG").unwrap_or_else(|_| EnvFilter::new("error"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    match args.command {
        Command::Dump {
            input,
            output,
            indent,
            validate,
        } => run_dump(input.as_deref(), output.as_deref(), indent, validate),
        Command::Tables { input, indent } => run_tables(input.as_deref(), indent),
        Command::Validate { inputs } => run_validate(&inputs),
        Command::Compile {
            input,
            output,
            format_version,
            stable_indices,
            no_line_info,
        } => {
            let (bytes, source) = read_input(input.as_deref())?;
            let script = Script::from_json(std::str::from_utf8(&bytes)?)?;
            let mut options =
                script.write_options(&WriteOptions::new().with_stable_indices(stable_indices))?;
            if let Some(version) = format_version {
                options = options.with_version(version);
            }
            if no_line_info {
                options = options.with_line_info(false);
            }
            let compiled = script.compile(&options)?;
            tracing::debug!(version = %options.version, bytes = compiled.len(), "compiled script");
            let target = OutputTarget::from_arg(output.as_deref());
            write_output(target.path(), &compiled)?;
            if let OutputTarget::File(path) = &target {
                report_status("Compiled", &source, path);
            }
            Ok(())
        }
    }
}

fn context() -> ReaderContext {
    ReaderContext::new(Rc::new(PermissiveResolver::new()))
}

fn load_options() -> LoadOptions {
    LoadOptions::new().with_resolve_policy(ResolvePolicy::Report)
}

fn run_dump(
    input: Option<&str>,
    output: Option<&str>,
    indent: usize,
    validate: bool,
) -> Result<(), Box<dyn Error>> {
    let (bytes, source) = read_input(input)?;
    let options = load_options().with_validate_grammar(validate);
    let tokens = xbf::decode_with_options(bytes, &context(), &options)?;
    let target = OutputTarget::from_arg(output);
    with_output_writer(target.path(), |writer| {
        write_json(writer, &tokens.to_json(), indent)
    })?;
    if let OutputTarget::File(path) = &target {
        report_status("Decoded", &source, path);
    }
    Ok(())
}

fn run_tables(input: Option<&str>, indent: usize) -> Result<(), Box<dyn Error>> {
    let (bytes, _) = read_input(input)?;
    let nodes = xbf::open_with_options(bytes, &context(), &load_options())?;
    let metadata = nodes.metadata();
    let header = metadata.header();

    let mut counts = serde_json::Map::new();
    for table in TableKind::ALL {
        counts.insert(table.name().to_string(), json!(metadata.tables().len(table)));
    }
    let summary = json!({
        "version": header.version.to_string(),
        "hash": header.version.has_hash().then(|| hex(&header.hash)),
        "counts": counts,
        "tables": serde_json::to_value(metadata.tables())?,
    });

    with_output_writer(None, |writer| write_json(writer, &summary, indent))
}

fn run_validate(inputs: &[String]) -> Result<(), Box<dyn Error>> {
    let mut buffers: Vec<Arc<[u8]>> = Vec::with_capacity(inputs.len());
    for path in inputs {
        buffers.push(Arc::from(fs::read(path)?));
    }
    let results = validate_all(
        &buffers,
        || Rc::new(PermissiveResolver::new()) as Rc<dyn SchemaResolver>,
        &load_options(),
    );

    let mut failed = 0usize;
    for (path, result) in inputs.iter().zip(results) {
        match result {
            Ok(tokens) => println!("✔ {}: {tokens} tokens", display_path(path)),
            Err(err) => {
                failed += 1;
                println!("✖ {}: {err}", display_path(path));
            }
        }
    }
    if failed > 0 {
        return Err(format!("{failed} of {} files failed validation", inputs.len()).into());
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(DIGITS[usize::from(byte >> 4)] as char);
        out.push(DIGITS[usize::from(byte & 0x0F)] as char);
    }
    out
}

fn read_input(input: Option<&str>) -> Result<(Vec<u8>, InputSource), Box<dyn Error>> {
    match input {
        None | Some("-") => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            Ok((buf, InputSource::Stdin))
        }
        Some(path) => {
            let buf = fs::read(path)?;
            Ok((buf, InputSource::File(path.to_string())))
        }
    }
}

#[derive(Clone, Debug)]
enum OutputTarget {
    Stdout,
    File(String),
}

impl OutputTarget {
    fn from_arg(output: Option<&str>) -> Self {
        match output {
            Some(path) if path != "-" => OutputTarget::File(path.to_string()),
            _ => OutputTarget::Stdout,
        }
    }

    fn path(&self) -> Option<&str> {
        match self {
            OutputTarget::Stdout => None,
            OutputTarget::File(path) => Some(path.as_str()),
        }
    }
}

fn with_output_writer<F>(path: Option<&str>, f: F) -> Result<(), Box<dyn Error>>
where
    F: FnOnce(&mut dyn Write) -> Result<(), Box<dyn Error>>,
{
    match path {
        Some(path) if path != "-" => {
            let mut file = fs::File::create(path)?;
            f(&mut file)
        }
        _ => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            f(&mut handle)
        }
    }
}

fn write_output(path: Option<&str>, data: &[u8]) -> Result<(), Box<dyn Error>> {
    with_output_writer(path, |writer| {
        writer.write_all(data)?;
        Ok(())
    })
}

fn write_json(writer: &mut dyn Write, value: &Value, indent: usize) -> Result<(), Box<dyn Error>> {
    if indent == 0 {
        serde_json::to_writer(writer, value)?;
        return Ok(());
    }

    let indent_bytes = vec![b' '; indent];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent_bytes);
    let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
    value.serialize(&mut serializer)?;
    Ok(())
}

fn report_status(verb: &str, source: &InputSource, output_path: &str) {
    let input_label = match source {
        InputSource::Stdin => "stdin".to_string(),
        InputSource::File(path) => display_path(path),
    };
    println!("✔ {verb} {input_label} → {}", display_path(output_path));
}

fn display_path(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
