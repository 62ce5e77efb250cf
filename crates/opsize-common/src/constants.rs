//! System-wide constants and defaults.

/// Application name used in CLI output and report files.
pub const APP_NAME: &str = "opsize";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "opsize";

/// Container runtime binary driven by the default adapter.
pub const DOCKER_BIN: &str = "docker";

/// Reserved name of the network shared by an operator and its services.
pub const DEFAULT_NETWORK_NAME: &str = "opsize-net";

/// Prefix applied to every container name created by a profiling run.
pub const CONTAINER_NAME_PREFIX: &str = "opsize";

/// Cgroups unified hierarchy mount point.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Kernel CPU accounting file used for host CPU time.
pub const PROC_STAT_PATH: &str = "/proc/stat";

/// Default bound on waiting for the runtime to report a container ID.
pub const ID_WAIT_TIMEOUT_SECS: u64 = 15;

/// Default interval between two metric samples.
pub const SAMPLE_INTERVAL_MS: u64 = 200;

/// Exit code recorded for an operator that was forcibly terminated.
pub const FORCED_TERMINATION_EXIT_CODE: i32 = -9;

/// Length of a full container ID as printed by the runtime.
pub const CONTAINER_ID_LENGTH: usize = 64;

/// Bytes in a megabyte (decimal, as reported in manifests).
pub const BYTES_PER_MEGABYTE: f64 = 1e6;

/// Environment passed to every operator container.
pub const OPERATOR_BASE_ENV: &[(&str, &str)] = &[("NVIDIA_CLARA_NOSYNCLOCK", "1")];

/// Image of the inference server started for operators declaring `models`.
pub const INFERENCE_SERVER_IMAGE: &str = "nvcr.io/nvidia/tritonserver";

/// Tag of the inference server image.
pub const INFERENCE_SERVER_TAG: &str = "20.07-v1-py3";

/// Service name given to the synthesized inference server.
pub const INFERENCE_SERVICE_NAME: &str = "inference-server";

/// HTTP port of the inference server.
pub const INFERENCE_HTTP_PORT: u16 = 8000;

/// gRPC port of the inference server.
pub const INFERENCE_GRPC_PORT: u16 = 8001;

/// Environment variables receiving the inference server HTTP endpoint.
pub const INFERENCE_HTTP_ENV_VARS: &[&str] = &[
    "NVIDIA_TRITON_HTTPURI",
    "CLARA_TRITON_URI",
    "NVIDIA_CLARA_TRTISURI",
];

/// Environment variable receiving the inference server gRPC endpoint.
pub const INFERENCE_GRPC_ENV_VAR: &str = "NVIDIA_TRITON_GRPCURI";

/// Mount point of the models directory inside the model-serving service.
pub const MODELS_MOUNT_PATH: &str = "/models";

/// Per-model configuration file expected in the models directory.
pub const MODEL_CONFIG_FILE: &str = "config.pbtxt";

/// Placeholder for the service data directory in service commands. The
/// runtime does not expand it, so it is removed before launch.
pub const SERVICE_DATA_PATH_PLACEHOLDER: &str = "$(NVIDIA_CLARA_SERVICE_DATA_PATH)";

/// HTTP path polled to decide that a model-serving service is ready.
/// Each served model is then polled at `<path>/<model>`.
pub const SERVICE_READY_PATH: &str = "/api/status";

/// Bound on waiting for a service to become ready.
pub const SERVICE_READY_TIMEOUT_SECS: u64 = 30;

/// Delay between two readiness probes.
pub const SERVICE_READY_POLL_MS: u64 = 1000;

/// Memory added on top of the observed maximum before rounding.
pub const DEFAULT_MEMORY_HEADROOM_MB: f64 = 100.0;

/// Memory requests are rounded up to a multiple of this value.
pub const DEFAULT_MEMORY_ROUND_MB: u64 = 256;

/// Fractional margin applied to the observed CPU maximum.
pub const DEFAULT_CPU_MARGIN: f64 = 0.0;

/// Extension of per-operator metrics files.
pub const METRICS_FILE_EXTENSION: &str = "csv";

/// Header line of per-operator metrics files.
pub const METRICS_FILE_HEADER: &str = "timestamp,cpu_percent,memory_mb";

/// File name of the machine-readable run report.
pub const REPORT_FILE_NAME: &str = "report.json";
