use super::enums::{InspectFormat, MemoryOutput, OutputKind};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use tracestitch_runtime::{Config, Limits, SyncOverride};

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Correlate a capture and write the timeline in one or more formats")]
    Convert(ConvertArgs),

    #[command(about = "Show the layout of a capture without replaying it")]
    Inspect {
        #[arg(help = "Capture directory, directory of captures, or .jsonl file")]
        input: PathBuf,

        #[arg(long, default_value = "plain")]
        format: InspectFormat,
    },

    #[command(about = "Show or create the configuration file")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Print the effective configuration as TOML")]
    Show,

    #[command(about = "Write the default configuration")]
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ConvertArgs {
    #[arg(help = "Capture directory, directory of captures, or .jsonl file")]
    pub input: PathBuf,

    #[arg(
        short = 'f',
        long = "format",
        value_delimiter = ',',
        required = true,
        help = "Output formats (repeat or comma-separate)"
    )]
    pub formats: Vec<OutputKind>,

    #[arg(
        short,
        long,
        help = "Artifact path prefix (default: the input path without extension)"
    )]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Only records in left:right, raw capture units; either side may be empty")]
    pub limit: Option<Limits>,

    #[arg(long, help = "Average counters over windows of this many raw units")]
    pub sampling: Option<u64>,

    #[arg(long, help = "Explicit mapping source_start:target_start:ratio")]
    pub sync: Option<SyncOverride>,

    #[arg(long, value_delimiter = ',', num_args = 1.., help = "Cuts to replay separately ('all' merges)")]
    pub cuts: Option<Vec<String>>,

    #[arg(long, value_enum, help = "Allocator counters as one running total or per block size")]
    pub memory: Option<MemoryOutput>,

    #[arg(long, help = "Drop unmatched records of complete captures instead of failing")]
    pub lenient: bool,

    #[arg(long, help = "Strip args from every record")]
    pub remove_args: bool,

    #[arg(long, help = "Suppress identical consecutive records")]
    pub distinct: bool,

    #[arg(long, help = "Drop records from processes outside the capture")]
    pub strip_aliens: bool,

    #[arg(long, help = "Per-partition read-ahead depth (0 reads inline)")]
    pub prefetch: Option<usize>,
}

impl ConvertArgs {
    /// Flags given on the command line win over the config file
    pub fn apply(&self, config: &mut Config) {
        if let Some(limit) = self.limit {
            config.limits = limit;
        }
        if let Some(window) = self.sampling {
            config.sampling_window = Some(window);
        }
        if let Some(sync) = self.sync {
            config.sync = Some(sync);
        }
        if let Some(cuts) = &self.cuts {
            config.cuts = Some(cuts.clone());
        }
        if let Some(memory) = self.memory {
            config.memory = memory.into();
        }
        if let Some(depth) = self.prefetch {
            config.prefetch = depth;
        }
        if self.lenient {
            config.strict = false;
        }
        config.remove_args |= self.remove_args;
        config.distinct |= self.distinct;
        config.strip_aliens |= self.strip_aliens;
    }
}
