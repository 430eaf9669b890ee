//! Command-line argument parsing

use crate::concurrency::config::{DEFAULT_CONCURRENCY, DEFAULT_PART_SIZE};
use crate::config::{DEFAULT_LIBRARY_URL, DEFAULT_TIMEOUT_SECS};
use crate::error::{LibraryError, Result};
use clap::{Parser, Subcommand};

const LIBRARY_SCHEME: &str = "library://";

#[derive(Parser, Debug)]
#[command(name = "sif-library-client")]
#[command(about = "Transfer SIF images to and from a container library")]
#[command(version, author)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(
        long = "quiet",
        short = 'q',
        global = true,
        help = "Suppress all output except errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download an image from the library
    Pull {
        /// Image reference, `library://entity/collection/container[:tag]`
        reference: String,

        /// Destination file
        destination: String,

        #[arg(long = "arch", default_value = "", help = "Architecture to select from multi-arch images")]
        arch: String,

        #[arg(
            long = "concurrency",
            short = 'j',
            default_value_t = DEFAULT_CONCURRENCY,
            help = "Number of concurrent download workers"
        )]
        concurrency: usize,

        #[arg(
            long = "part-size",
            default_value_t = DEFAULT_PART_SIZE,
            help = "Size of each downloaded part in bytes"
        )]
        part_size: i64,

        #[arg(long = "url", env = "LIBRARY_URL", default_value = DEFAULT_LIBRARY_URL, help = "Library service URL")]
        url: String,

        #[arg(long = "token", env = "LIBRARY_TOKEN", help = "Bearer token for the library service")]
        token: Option<String>,

        #[arg(long = "skip-tls", short = 'k', help = "Skip TLS certificate verification")]
        skip_tls: bool,

        #[arg(
            long = "timeout",
            short = 't',
            default_value_t = DEFAULT_TIMEOUT_SECS,
            help = "Timeout in seconds for network operations"
        )]
        timeout: u64,
    },

    /// Print the config derived from a local SIF file
    Inspect {
        /// Path to the SIF file
        file: String,
    },
}

/// Parsed `library://entity/collection/container:tag`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub path: String,
    pub tag: String,
}

impl ImageRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let rest = reference.strip_prefix(LIBRARY_SCHEME).unwrap_or(reference);
        let (path, tag) = match rest.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') => (path, tag),
            _ => (rest, "latest"),
        };

        let path = path.trim_matches('/');
        if path.split('/').count() != 3 || path.split('/').any(str::is_empty) {
            return Err(LibraryError::Config(format!(
                "image reference must be library://entity/collection/container[:tag], got {:?}",
                reference
            )));
        }
        if tag.is_empty() {
            return Err(LibraryError::Config(format!("empty tag in {:?}", reference)));
        }

        Ok(Self {
            path: path.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if let Command::Pull {
            concurrency,
            part_size,
            timeout,
            ..
        } = &self.command
        {
            if *concurrency == 0 {
                return Err(LibraryError::Config("concurrency must be greater than 0".into()));
            }
            if *part_size <= 0 {
                return Err(LibraryError::InvalidPartSize(*part_size));
            }
            if *timeout == 0 {
                return Err(LibraryError::Config("timeout must be greater than 0".into()));
            }
        }
        if self.verbose && self.quiet {
            return Err(LibraryError::Config(
                "--verbose and --quiet cannot be used together".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref_parse() {
        let r = ImageRef::parse("library://alice/tools/busybox:1.36").unwrap();
        assert_eq!(r.path, "alice/tools/busybox");
        assert_eq!(r.tag, "1.36");

        let r = ImageRef::parse("alice/tools/busybox").unwrap();
        assert_eq!(r.tag, "latest");

        assert!(ImageRef::parse("library://busybox").is_err());
        assert!(ImageRef::parse("library://a/b/c:").is_err());
    }

    #[test]
    fn test_pull_args() {
        let args = Args::try_parse_from([
            "sif-library-client",
            "pull",
            "library://alice/tools/busybox",
            "busybox.sif",
            "--concurrency",
            "8",
            "--url",
            "http://localhost:8080",
        ])
        .unwrap();
        args.validate().unwrap();
        match args.command {
            Command::Pull {
                concurrency, url, ..
            } => {
                assert_eq!(concurrency, 8);
                assert_eq!(url, "http://localhost:8080");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_zero_part_size_rejected() {
        let args = Args::try_parse_from([
            "sif-library-client",
            "pull",
            "a/b/c",
            "out.sif",
            "--part-size",
            "0",
        ])
        .unwrap();
        assert!(matches!(args.validate(), Err(LibraryError::InvalidPartSize(0))));
    }
}
