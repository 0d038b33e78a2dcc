use metascope_container::ParseOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Walker limits and capabilities handed to every parse.
    #[serde(default)]
    pub parser: ParseOptions,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Print JSON even without `--json`
    #[serde(default)]
    pub json: bool,

    /// Pretty-print JSON output (default: true)
    #[serde(default = "default_pretty")]
    pub pretty: bool,

    /// Include the per-format `warnings` list in text output
    #[serde(default = "default_show_warnings")]
    pub show_warnings: bool,

    /// Indentation step for the text tree rendering
    #[serde(default = "default_indent")]
    pub indent: usize,
}

fn default_pretty() -> bool {
    true
}

fn default_show_warnings() -> bool {
    true
}

fn default_indent() -> usize {
    2
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json: false,
            pretty: default_pretty(),
            show_warnings: default_show_warnings(),
            indent: default_indent(),
        }
    }
}
