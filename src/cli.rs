use clap::{Parser, Subcommand};
use metascope_codec::Codec;
use metascope_container::ContainerKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "metascope")]
#[command(author, version, about = "Read structural and codec metadata straight from media files")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a file and print its metadata tree
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Container kind to parse as (mp4, mkv, webm, avi, png, gif, webp)
        #[arg(short, long)]
        kind: Option<ContainerKind>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the container kind detected from a file
    Detect {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Decode a bare NAL unit or OBU buffer
    Codec {
        /// File holding the buffer
        #[arg(required = true)]
        file: PathBuf,

        /// Codec the buffer belongs to (h264, hevc, av1)
        #[arg(long)]
        codec: Codec,

        /// Treat the file as hex text instead of raw bytes
        #[arg(long)]
        hex: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_probe_kind_parses() {
        let cli = Cli::parse_from(["metascope", "probe", "a.bin", "--kind", "webm", "--json"]);
        match cli.command {
            Commands::Probe { kind, json, .. } => {
                assert_eq!(kind, Some(ContainerKind::Matroska));
                assert!(json);
            }
            _ => panic!("expected probe"),
        }
    }

    #[test]
    fn test_codec_rejects_unknown() {
        assert!(Cli::try_parse_from(["metascope", "codec", "a.bin", "--codec", "vp9"]).is_err());
    }
}
