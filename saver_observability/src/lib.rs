//! Logging and metrics setup shared by the saver crates.
//!
//! Logs go through `tracing`. Metrics are recorded with OpenTelemetry
//! instruments created from [`meter`]; they are only exported when the
//! OpenTelemetry SDK is explicitly enabled.
use std::borrow::Cow;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{InstrumentationScope, global};
use opentelemetry_otlp::{ExporterBuildError, MetricExporter, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader};
use opentelemetry_sdk::trace::SdkTracerProvider;
use snafu::{ResultExt, Snafu};
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::{prelude::*, registry::LookupSpan};

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter, UpDownCounter},
};

use crate::format::SaverFormat;

mod format;

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";
const RUST_LOG_TARGET: &str = "RUST_LOG_TARGET";

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum ObservabilityError {
    #[snafu(display("Failed to build exporter"))]
    Exporter { source: ExporterBuildError },
}

/// Returns a meter with the given instrumentation scope name.
pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Installs the global tracing subscriber.
///
/// `default_log_level` is used as the filter directive when `RUST_LOG` is not set.
pub fn init_observability(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
    default_log_level: &str,
) -> Result<(), ObservabilityError> {
    // The otel sdk doesn't follow the disabled env variable flag,
    // so exports stay off unless OTEL_SDK_DISABLED=false.
    let sdk_disabled = std::env::var(OTEL_SDK_DISABLED)
        .map(|v| v == "true")
        .unwrap_or(true);

    let otel_layer = otel(
        package_name,
        package_version,
        default_log_level,
        !sdk_disabled,
    )?;

    let layers = vec![stdout(default_log_level), otel_layer];

    tracing_subscriber::registry().with(layers).init();

    Ok(())
}

fn env_filter(default_log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level))
}

fn stdout<S>(default_log_level: &str) -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let log_env_filter = env_filter(default_log_level);

    let json_fmt = std::env::var(RUST_LOG_FORMAT)
        .map(|val| val == "json")
        .unwrap_or(false);

    if json_fmt {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(log_env_filter)
            .boxed()
    } else {
        let with_target = std::env::var(RUST_LOG_TARGET)
            .map(|val| val == "true")
            .unwrap_or(false);

        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .event_format(SaverFormat::default().with_target(with_target))
            .fmt_fields(SaverFormat::default())
            .with_filter(log_env_filter)
            .boxed()
    }
}

fn otel<S>(
    package_name: impl Into<Cow<'static, str>>,
    version: impl Into<Cow<'static, str>>,
    default_log_level: &str,
    sdk_enabled: bool,
) -> Result<BoxedLayer<S>, ObservabilityError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let package_name = package_name.into();
    let version = version.into();

    let resource = Resource::builder().build();

    let otel_env_filter = env_filter(default_log_level);

    let instrumentation_lib = InstrumentationScope::builder(package_name)
        .with_version(version)
        .build();

    let mut trace_provider = SdkTracerProvider::builder().with_resource(resource.clone());

    if sdk_enabled {
        let span_exporter = SpanExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;

        trace_provider = trace_provider.with_batch_exporter(span_exporter);
    }

    let trace_provider = trace_provider.build();
    let tracer = trace_provider.tracer_with_scope(instrumentation_lib);

    let mut meter_provider = MeterProviderBuilder::default().with_resource(resource);

    if sdk_enabled {
        let metrics_exporter = MetricExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;

        let metrics_reader = PeriodicReader::builder(metrics_exporter)
            .with_interval(Duration::from_secs(10))
            .build();

        meter_provider = meter_provider.with_reader(metrics_reader);
    }

    let meter_provider = meter_provider.build();

    global::set_meter_provider(meter_provider.clone());

    let otel_trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let otel_metrics_layer = MetricsLayer::new(meter_provider);
    let otel_layer = otel_env_filter
        .and_then(otel_metrics_layer)
        .and_then(otel_trace_layer)
        .boxed();

    Ok(otel_layer)
}
