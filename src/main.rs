use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use upload_shrink::config::{self, AppConfig};
use upload_shrink::envelope::RequestEnvelope;
use upload_shrink::multipart::MultipartWriter;
use upload_shrink::pipeline::Pipeline;
use upload_shrink::{host, mime, output};

/// Where to read a request event from.
#[derive(clap::Args, Clone)]
struct EventArgs {
    /// Request envelope JSON file, or '-' for stdin
    #[arg(long, default_value = "-")]
    event: PathBuf,
}

#[derive(Parser)]
#[command(name = "upload-shrink")]
#[command(about = "Shrink uploaded images and return them inline")]
#[command(long_about = "\
Shrink uploaded images and return them inline

Takes an API Gateway proxy request carrying a multipart/form-data upload,
checks that the 'upload' file part really is a PNG or JPEG, re-encodes it
without metadata, and answers with the result as a base64 body.

Request envelope (JSON):

  {
    \"headers\": { \"Content-Type\": \"multipart/form-data; boundary=X\" },
    \"body\": \"<multipart body, base64 when isBase64Encoded>\",
    \"isBase64Encoded\": true
  }

Every failure is answered with status 400 and the error message as body.

Run 'upload-shrink wrap photo.jpg --base64 > event.json' to build an event
from a local image, then 'upload-shrink invoke --event event.json'.
Run 'upload-shrink gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: $UPLOAD_SHRINK_CONFIG, else built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one request envelope through the pipeline and print the response
    Invoke(EventArgs),
    /// Decode and sniff a request without transforming it
    Inspect(EventArgs),
    /// Build a request envelope for a local image
    Wrap {
        /// Image file to upload
        file: PathBuf,
        /// Base64-wrap the body, as API Gateway does for binary media
        #[arg(long)]
        base64: bool,
        /// Multipart boundary
        #[arg(long, default_value = "upload-shrink-boundary")]
        boundary: String,
        /// Value for the path field
        #[arg(long)]
        path: Option<String>,
        /// Value for the tags field
        #[arg(long)]
        tags: Option<String>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
    /// Serve requests from the AWS Lambda runtime
    #[cfg(feature = "lambda")]
    Lambda,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let load = || bootstrap(cli.config.as_deref());

    match cli.command {
        Command::Invoke(ref args) => {
            let config = load()?;
            let request = read_event(&args.event)?;
            let pipeline = Pipeline::from_config(&config);
            match pipeline.handle(&request) {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    output::print_response_summary(&response, None);
                }
                Err(err) => {
                    let response = err.to_response();
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    output::print_response_summary(&response, Some(&err));
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Inspect(ref args) => {
            let config = load()?;
            let request = read_event(&args.event)?;
            let pipeline = Pipeline::from_config(&config);
            let report = pipeline.inspect(&request)?;
            output::print_inspect_report(&report, &config.form_fields());
        }
        Command::Wrap {
            ref file,
            base64,
            ref boundary,
            ref path,
            ref tags,
        } => {
            let config = load()?;
            let request = wrap_file(
                &config,
                file,
                base64,
                boundary,
                path.as_deref(),
                tags.as_deref(),
            )?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        #[cfg(feature = "lambda")]
        Command::Lambda => {
            let config = load()?;
            host::run_lambda(Pipeline::from_config(&config))?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// One-time process setup. Any failure here aborts startup.
fn bootstrap(config_flag: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = config::load_config(config_flag)?;
    host::init_tracing(config.host.log_format)?;
    if config.host.library_path_from_exe {
        host::prepare_library_path()?;
    }
    Ok(config)
}

fn read_event(path: &Path) -> Result<RequestEnvelope, Box<dyn std::error::Error>> {
    let json = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&json)?)
}

/// Build the request API Gateway would deliver for a browser upload of `file`.
fn wrap_file(
    config: &AppConfig,
    file: &Path,
    base64: bool,
    boundary: &str,
    path: Option<&str>,
    tags: Option<&str>,
) -> Result<RequestEnvelope, Box<dyn std::error::Error>> {
    let data = std::fs::read(file)?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let part_type = mime::sniff(&data).unwrap_or("application/octet-stream");

    let mut writer = MultipartWriter::new(boundary);
    if let Some(path) = path {
        writer = writer.field(&config.form.path_field, path);
    }
    if let Some(tags) = tags {
        writer = writer.field(&config.form.tags_field, tags);
    }
    let content_type = writer.content_type();
    let body = writer
        .file(&config.form.upload_field, &filename, part_type, &data)
        .finish();

    let body = if base64 {
        STANDARD.encode(&body)
    } else {
        String::from_utf8(body).map_err(|_| "binary upload needs --base64")?
    };
    Ok(RequestEnvelope::new(body, &content_type, base64))
}
