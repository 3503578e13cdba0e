//! Command-line configuration: flag names and defaults mirror
//! the reference's `getopt_long` table.

use std::path::PathBuf;

use clap::Parser;

use crate::error::IngestError;

#[derive(Parser, Debug)]
#[command(name = "spead-vis-ingest", about = "High-rate UDP ingester for SPEAD visibility streams")]
pub struct Cli {
    /// Number of SPEAD streams (one UDP port each).
    #[arg(short = 's', long = "streams", default_value_t = 2)]
    pub streams: usize,

    /// Number of receive threads sharing the stream set.
    #[arg(short = 'r', long = "recv", default_value_t = 1)]
    pub recv: usize,

    /// Number of writer threads used per buffer flush.
    #[arg(short = 'w', long = "write", default_value_t = 8)]
    pub write: usize,

    /// Number of time samples held per buffer. Despite the flag name,
    /// this controls `num_times_in_buffer`, not the buffer count — the
    /// naming is inherited as-is from the external interface this crate
    /// exposes.
    #[arg(short = 'b', long = "buffers", default_value_t = 8)]
    pub buffertimes: usize,

    /// Maximum number of buffers held in the pool at once. Despite the
    /// flag name, this controls the buffer count, not the time depth —
    /// see `buffertimes` above.
    #[arg(short = 't', long = "buffertimes", default_value_t = 2)]
    pub buffers: usize,

    /// First UDP port; stream `i` binds to `port + i`.
    #[arg(short = 'p', long = "port", default_value_t = 41000)]
    pub port: u16,

    /// Number of channels written per output file.
    #[arg(short = 'c', long = "channels", default_value_t = 1)]
    pub channels: usize,

    /// Output directory and file-name prefix. Omit to run with no
    /// raw-file writes: buffers are still reassembled and cleared, just
    /// never persisted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Seconds of inactivity before a buffer is force-flushed.
    #[arg(short = 'e', long = "expire", default_value_t = 5)]
    pub expire: u64,

    /// Phase-centre right ascension, in radians.
    #[arg(short = 'a', long = "ascension", default_value_t = 0.0)]
    pub ascension: f64,

    /// Phase-centre declination, in radians.
    #[arg(short = 'd', long = "declination", default_value_t = 0.0)]
    pub declination: f64,

    /// Path to the antenna coordinate file. Omit to run without
    /// UVW computation.
    #[arg(short = 'x', long = "antenna")]
    pub antenna: Option<PathBuf>,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Rejects flag combinations that parse fine but can never describe
    /// a working receiver.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.buffertimes == 0 {
            return Err(IngestError::InvalidArgument(
                "--buffers must be at least 1 time sample per buffer".to_string(),
            ));
        }
        if self.buffers == 0 {
            return Err(IngestError::InvalidArgument(
                "--buffertimes must allow at least 1 buffer in the pool".to_string(),
            ));
        }
        #[cfg(feature = "with_ms")]
        if self.antenna.is_none() {
            return Err(IngestError::InvalidArgument(
                "--antenna is required when built with the with_ms feature".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_cli() {
        let cli = Cli::parse_from(["spead-vis-ingest"]);
        assert_eq!(cli.streams, 2);
        assert_eq!(cli.recv, 1);
        assert_eq!(cli.write, 8);
        assert_eq!(cli.buffertimes, 8);
        assert_eq!(cli.buffers, 2);
        // Flag names are swapped relative to their meaning: -b/--buffers
        // sets buffertimes (8), -t/--buffertimes sets buffers (2).
        assert_eq!(cli.port, 41000);
        assert_eq!(cli.channels, 1);
        assert_eq!(cli.expire, 5);
        assert!(cli.antenna.is_none());
    }

    #[test]
    fn short_flags_override_defaults() {
        let cli = Cli::parse_from(["spead-vis-ingest", "-s", "4", "-p", "42000", "-vvv"]);
        assert_eq!(cli.streams, 4);
        assert_eq!(cli.port, 42000);
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn output_defaults_to_absent() {
        let cli = Cli::parse_from(["spead-vis-ingest"]);
        assert!(cli.output.is_none());
    }

    #[test]
    fn validate_accepts_defaults() {
        let cli = Cli::parse_from(["spead-vis-ingest"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_buffertimes() {
        let cli = Cli::parse_from(["spead-vis-ingest", "-b", "0"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_buffers() {
        let cli = Cli::parse_from(["spead-vis-ingest", "-t", "0"]);
        assert!(cli.validate().is_err());
    }
}
