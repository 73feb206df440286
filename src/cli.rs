use clap::{Parser, ValueEnum};

/// Keyword mention counts and STIX vulnerability bundles over HTTP.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = TracingFormat::default())]
    pub tracing: TracingFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    /// Colored, human-readable lines
    Pretty,
    /// One JSON object per event
    Json,
}

impl Default for TracingFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            TracingFormat::Pretty
        } else {
            TracingFormat::Json
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_flag_parses() {
        let args = Args::try_parse_from(["keyword-pulse", "--tracing", "json"]).unwrap();
        assert_eq!(args.tracing, TracingFormat::Json);
        assert!(Args::try_parse_from(["keyword-pulse", "--tracing", "xml"]).is_err());
    }
}
