//! Process bootstrap: everything that happens once, before the first request.
//!
//! - install the tracing subscriber
//! - put the executable's directory on `LD_LIBRARY_PATH`
//! - (feature `lambda`) hand the pipeline to the Lambda runtime
//!
//! Failures here are process-fatal. `main` reports them and exits non-zero;
//! no request is ever served by a half-initialized process.

use crate::config::LogFormat;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum HostError {
    #[error("failed to resolve executable directory: {0}")]
    ExecutableDir(#[source] std::io::Error),
    #[error("executable path has no parent directory: {}", .0.display())]
    NoParent(PathBuf),
    #[error("cannot build LD_LIBRARY_PATH: {0}")]
    JoinPaths(#[from] env::JoinPathsError),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[cfg(feature = "lambda")]
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[cfg(feature = "lambda")]
    #[error("lambda runtime stopped: {0}")]
    Lambda(String),
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for CLI output.
pub fn init_tracing(format: LogFormat) -> Result<(), HostError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    result.map_err(|e| HostError::Tracing(e.to_string()))
}

/// Prepend the executable's directory to `LD_LIBRARY_PATH`.
///
/// Must run before any thread is spawned. Returns the directory added.
pub fn prepare_library_path() -> Result<PathBuf, HostError> {
    let exe = env::current_exe().map_err(HostError::ExecutableDir)?;
    let dir = exe
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| HostError::NoParent(exe.clone()))?;

    let current = env::var_os(LIBRARY_PATH_VAR);
    let value = library_path_value(&dir, current.as_deref())?;
    // SAFETY: called once from `main` before the async runtime or any other
    // thread exists, so nothing can read the environment concurrently.
    unsafe { env::set_var(LIBRARY_PATH_VAR, &value) };
    tracing::debug!(dir = %dir.display(), "library search path prepared");
    Ok(dir)
}

/// `dir` followed by the existing entries, with `dir` appearing once.
pub fn library_path_value(dir: &Path, existing: Option<&OsStr>) -> Result<OsString, HostError> {
    let rest = existing
        .map(|value| env::split_paths(value).collect::<Vec<_>>())
        .unwrap_or_default();
    let paths = std::iter::once(dir.to_path_buf()).chain(
        rest.into_iter()
            .filter(|p| !p.as_os_str().is_empty() && p != dir),
    );
    Ok(env::join_paths(paths)?)
}

#[cfg(feature = "lambda")]
pub use lambda::run_lambda;

#[cfg(feature = "lambda")]
mod lambda {
    use super::HostError;
    use crate::envelope::RequestEnvelope;
    use crate::imaging::ImageTransform;
    use crate::pipeline::Pipeline;
    use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
    use lambda_runtime::{LambdaEvent, service_fn};
    use std::sync::Arc;

    /// Serve API Gateway events until the runtime shuts down.
    ///
    /// Failed requests are answered with their 400 envelope rather than an
    /// invocation error, so the client always sees the message.
    pub fn run_lambda<T: ImageTransform + 'static>(pipeline: Pipeline<T>) -> Result<(), HostError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(HostError::Runtime)?;
        let pipeline = Arc::new(pipeline);

        runtime
            .block_on(lambda_runtime::run(service_fn(
                move |event: LambdaEvent<ApiGatewayProxyRequest>| {
                    let pipeline = Arc::clone(&pipeline);
                    async move {
                        let span = tracing::info_span!("invocation", id = %event.context.request_id);
                        let request = RequestEnvelope::from(event.payload);
                        let response = span.in_scope(|| pipeline.respond(&request));
                        Ok::<ApiGatewayProxyResponse, lambda_runtime::Error>(response.into())
                    }
                },
            )))
            .map_err(|e| HostError::Lambda(e.to_string()))
    }
}
