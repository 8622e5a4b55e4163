use std::path::PathBuf;

use clap::Parser;

use crate::config::PastisConfig;
use crate::error::PastisResult;

/// Common arguments shared across the PASTIS binaries
#[derive(Parser, Debug, Clone)]
pub struct SharedAnalysisArgs {
    /// JSON configuration file; built-in defaults are used when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for output files
    #[arg(long, default_value = "pastis_output")]
    pub output_dir: PathBuf,

    /// Override the random seed from the configuration
    #[arg(long)]
    pub seed: Option<u64>,

    /// Enable debug output
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

impl SharedAnalysisArgs {
    /// Load the configuration and apply command-line overrides
    pub fn load_config(&self) -> PastisResult<PastisConfig> {
        let mut config = match &self.config {
            Some(path) => PastisConfig::load_from_file(path)?,
            None => PastisConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.closed_loop.seed = seed;
        }
        Ok(config)
    }

    /// Create the output directory and return the path of `name` inside it
    pub fn output_path(&self, name: &str) -> PastisResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(self.output_dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        shared: SharedAnalysisArgs,
    }

    #[test]
    fn test_defaults_and_seed_override() {
        let args = Wrapper::parse_from(["tool", "--seed", "7"]);
        assert_eq!(args.shared.output_dir, PathBuf::from("pastis_output"));
        let config = args.shared.load_config().unwrap();
        assert_eq!(config.closed_loop.seed, 7);
    }

    #[test]
    fn test_output_path_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let args = Wrapper::parse_from(["tool", "--output-dir", out.to_str().unwrap()]);
        let path = args.shared.output_path("matrix.json").unwrap();
        assert!(out.is_dir());
        assert_eq!(path, out.join("matrix.json"));
    }
}
