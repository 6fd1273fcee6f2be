use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use docqa_core::config::Config;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const QUIET_DEPENDENCIES: &str = "hyper=warn,reqwest=warn,sqlx=warn,h2=warn,tonic=warn";

/// Flushes exported spans when dropped.
#[must_use]
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("OTel shutdown failed: {e}");
        }
    }
}

fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},{QUIET_DEPENDENCIES}",
            config.logging.level.as_filter()
        ))
    })
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber: stderr, the configured log file, and OTLP export
/// when compiled in and enabled.
pub fn init(config: &Config) -> TelemetryGuard {
    let file = config
        .logging
        .file
        .as_deref()
        .and_then(|path| match open_log_file(path) {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!("cannot open log file {}: {e}", path.display());
                None
            }
        });

    // stderr shares the terminal with the prompt
    let stderr_level = if file.is_some() {
        LevelFilter::WARN
    } else {
        LevelFilter::TRACE
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(stderr_level);
    let file_layer = file.map(|f| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(f))
    });

    let registry = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(stderr_layer)
        .with(file_layer);

    #[cfg(feature = "otel")]
    if config.observability.exporter == "otlp" {
        match setup_otel_tracer(&config.observability.endpoint) {
            Ok((tracer, provider)) => {
                registry
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .init();
                return TelemetryGuard {
                    provider: Some(provider),
                };
            }
            Err(e) => eprintln!("OTel initialization failed, falling back to fmt: {e}"),
        }
    }

    registry.init();
    TelemetryGuard {
        #[cfg(feature = "otel")]
        provider: None,
    }
}

#[cfg(feature = "otel")]
fn setup_otel_tracer(
    endpoint: &str,
) -> anyhow::Result<(
    opentelemetry_sdk::trace::SdkTracer,
    opentelemetry_sdk::trace::SdkTracerProvider,
)> {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_service_name("docqa")
                .build(),
        )
        .build();

    let tracer = provider.tracer("docqa");
    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok((tracer, provider))
}
