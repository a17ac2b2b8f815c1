use serde::{Deserialize, Serialize};

/// Main configuration structure for the test station
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StationConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sequence selection and policy
    #[serde(default)]
    pub sequence: SequenceConfig,

    /// Measurement protocol timing
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Instrument model selection
    #[serde(default)]
    pub instruments: InstrumentsConfig,

    /// Pre-test diagnostic thresholds
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Result archival
    #[serde(default)]
    pub results: ResultsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Which test list to run and how to react to failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SequenceConfig {
    /// Part dash number selecting the limits
    #[serde(default)]
    pub dash: String,

    /// Test type within the dash (e.g. FINAL, BURNIN)
    #[serde(default = "default_test_type")]
    pub test_type: String,

    /// Stop the sequence at the first failing step
    #[serde(default)]
    pub stop_on_first_failure: bool,

    /// Reuse measurements across steps with identical conditions
    #[serde(default = "default_true")]
    pub speedup_enabled: bool,
}

fn default_test_type() -> String {
    "FINAL".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            dash: String::new(),
            test_type: default_test_type(),
            stop_on_first_failure: false,
            speedup_enabled: true,
        }
    }
}

/// Settle times and polling bounds for the measurement protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProtocolConfig {
    /// Delay after any relay change
    #[serde(default = "default_relay_settle_ms")]
    pub relay_settle_ms: u64,

    /// Delay before re-reading the scope error register
    #[serde(default = "default_scope_error_settle_ms")]
    pub scope_error_settle_ms: u64,

    /// Interval between acquisition-complete polls
    #[serde(default = "default_acquisition_poll_ms")]
    pub acquisition_poll_ms: u64,

    /// Upper bound on acquisition-complete polls
    #[serde(default = "default_max_acquisition_polls")]
    pub max_acquisition_polls: u32,

    /// Line voltage increment when ramping
    #[serde(default = "default_line_ramp_step_volts")]
    pub line_ramp_step_volts: f64,

    /// Delay after each ramp increment
    #[serde(default = "default_line_ramp_settle_ms")]
    pub line_ramp_settle_ms: u64,

    /// Scope vertical scale restored after every scope measurement (V/div)
    #[serde(default = "default_scope_scale_volts")]
    pub default_scope_scale_volts: f64,

    /// Sequence-wide default per auxiliary supply channel
    #[serde(default = "default_aux_defaults")]
    pub aux_defaults: Vec<f64>,

    /// Line supply current limit
    #[serde(default = "default_line_current_limit_amps")]
    pub line_current_limit_amps: f64,

    /// Interval between chamber at-setpoint polls
    #[serde(default = "default_soak_poll_ms")]
    pub soak_poll_ms: u64,

    /// Upper bound on chamber at-setpoint polls
    #[serde(default = "default_max_soak_polls")]
    pub max_soak_polls: u32,
}

const fn default_relay_settle_ms() -> u64 {
    50
}

const fn default_scope_error_settle_ms() -> u64 {
    100
}

const fn default_acquisition_poll_ms() -> u64 {
    10
}

const fn default_max_acquisition_polls() -> u32 {
    500
}

const fn default_line_ramp_step_volts() -> f64 {
    5.0
}

const fn default_line_ramp_settle_ms() -> u64 {
    20
}

const fn default_scope_scale_volts() -> f64 {
    1.0
}

fn default_aux_defaults() -> Vec<f64> {
    vec![12.0]
}

const fn default_line_current_limit_amps() -> f64 {
    10.0
}

const fn default_soak_poll_ms() -> u64 {
    1000
}

const fn default_max_soak_polls() -> u32 {
    1800
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            relay_settle_ms: default_relay_settle_ms(),
            scope_error_settle_ms: default_scope_error_settle_ms(),
            acquisition_poll_ms: default_acquisition_poll_ms(),
            max_acquisition_polls: default_max_acquisition_polls(),
            line_ramp_step_volts: default_line_ramp_step_volts(),
            line_ramp_settle_ms: default_line_ramp_settle_ms(),
            default_scope_scale_volts: default_scope_scale_volts(),
            aux_defaults: default_aux_defaults(),
            line_current_limit_amps: default_line_current_limit_amps(),
            soak_poll_ms: default_soak_poll_ms(),
            max_soak_polls: default_max_soak_polls(),
        }
    }
}

impl ProtocolConfig {
    /// Protocol settings with every delay set to zero, for simulated benches.
    pub fn immediate() -> Self {
        Self {
            relay_settle_ms: 0,
            scope_error_settle_ms: 0,
            acquisition_poll_ms: 0,
            line_ramp_settle_ms: 0,
            soak_poll_ms: 0,
            ..Self::default()
        }
    }
}

/// Instrument model per kind; the factory resolves these names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InstrumentsConfig {
    #[serde(default = "default_model")]
    pub line_supply: String,

    /// One model per auxiliary supply channel
    #[serde(default = "default_aux_models")]
    pub aux_supplies: Vec<String>,

    #[serde(default = "default_model")]
    pub dmm: String,

    #[serde(default = "default_model")]
    pub load: String,

    /// Number of electronic load channels
    #[serde(default = "default_load_channels")]
    pub load_channels: u8,

    #[serde(default = "default_model")]
    pub scope: String,

    #[serde(default = "default_model")]
    pub relay_matrix: String,

    #[serde(default = "default_model")]
    pub function_generator: String,

    /// Temperature chamber, if the station has one
    #[serde(default)]
    pub temperature_controller: Option<String>,
}

fn default_model() -> String {
    "sim".to_string()
}

fn default_aux_models() -> Vec<String> {
    vec![default_model()]
}

const fn default_load_channels() -> u8 {
    2
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            line_supply: default_model(),
            aux_supplies: default_aux_models(),
            dmm: default_model(),
            load: default_model(),
            load_channels: default_load_channels(),
            scope: default_model(),
            relay_matrix: default_model(),
            function_generator: default_model(),
            temperature_controller: None,
        }
    }
}

/// Pre-test diagnostic thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DiagnosticsConfig {
    /// Run the pre-test diagnostic pass at synchronize
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Line voltage applied during the diagnostic pass
    #[serde(default = "default_nominal_line_volts")]
    pub nominal_line_volts: f64,

    /// Largest acceptable unloaded input current
    #[serde(default = "default_max_idle_input_amps")]
    pub max_idle_input_amps: f64,

    /// Output checked for reversed orientation
    #[serde(default = "default_orientation_output")]
    pub orientation_output: u8,
}

const fn default_nominal_line_volts() -> f64 {
    48.0
}

const fn default_max_idle_input_amps() -> f64 {
    0.5
}

const fn default_orientation_output() -> u8 {
    1
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            nominal_line_volts: default_nominal_line_volts(),
            max_idle_input_amps: default_max_idle_input_amps(),
            orientation_output: default_orientation_output(),
        }
    }
}

/// Result archival configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResultsConfig {
    /// Directory receiving one JSON archive per sequence
    #[serde(default = "default_results_dir")]
    pub output_dir: String,

    /// Write the JSON archive after each sequence
    #[serde(default = "default_true")]
    pub archive: bool,
}

fn default_results_dir() -> String {
    ".teststation/results".to_string()
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_results_dir(),
            archive: true,
        }
    }
}
