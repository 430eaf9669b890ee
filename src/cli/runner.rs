//! Runs the parsed command line against a [`LibraryClient`]

use crate::cli::args::{Args, Command, ImageRef};
use crate::client::LibraryClient;
use crate::concurrency::config::TransferSpec;
use crate::concurrency::progress::ConsoleProgress;
use crate::concurrency::sink::{PositionalSink, PositionalSource, read_full_at};
use crate::config::ClientConfig;
use crate::digest::digest_source;
use crate::error::{LibraryError, Result};
use crate::image::config::SifConfig;
use crate::image::sif::SifHeader;
use crate::logging::Logger;
use std::fs::{File, OpenOptions};
use std::sync::Arc;
use std::time::Instant;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        args.validate()?;
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };

        Ok(Self { args, output })
    }

    pub async fn run(&self) -> Result<()> {
        match &self.args.command {
            Command::Pull {
                reference,
                destination,
                arch,
                concurrency,
                part_size,
                url,
                token,
                skip_tls,
                timeout,
            } => {
                let config = ClientConfig::new(url.as_str())
                    .with_auth_token(token.clone().filter(|t| !t.is_empty()))
                    .with_download(TransferSpec::new(*concurrency, *part_size))
                    .with_timeout(*timeout)
                    .with_skip_tls(*skip_tls);
                self.pull(config, reference, destination, arch).await
            }
            Command::Inspect { file } => self.inspect(file).await,
        }
    }

    async fn pull(&self, config: ClientConfig, reference: &str, destination: &str, arch: &str) -> Result<()> {
        let start = Instant::now();
        let image = ImageRef::parse(reference)?;
        self.output.section("Pull");
        self.output.info(&format!("Library: {}", config.base_url));
        self.output.info(&format!("Image: {}:{}", image.path, image.tag));

        let client = LibraryClient::builder(config)
            .with_output(self.output.clone())
            .build()?;

        let file: Arc<dyn PositionalSink> = Arc::new(
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(destination)?,
        );
        let progress = ConsoleProgress::new(self.output.clone());

        let size = client
            .pull(&image.path, &image.tag, arch, file, &progress)
            .await?;

        self.output.summary_kv(
            "Pull Summary",
            &[
                ("Destination", destination.to_string()),
                ("Size", self.output.format_size(size)),
                ("Elapsed", self.output.format_duration(start.elapsed())),
            ],
        );
        Ok(())
    }

    async fn inspect(&self, path: &str) -> Result<()> {
        self.output.section("Inspect");
        let file: Arc<dyn PositionalSource> = Arc::new(File::open(path)?);

        let reader = Arc::clone(&file);
        let bytes = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; crate::config::DEFAULT_HEADER_READ_SIZE];
            let n = read_full_at(reader.as_ref(), &mut buf, 0)?;
            buf.truncate(n);
            Ok::<_, std::io::Error>(buf)
        })
        .await??;

        let header = SifHeader::parse(&bytes)?;
        let digest = digest_source(&file).await?;
        let config = SifConfig::from_header(&bytes, &digest, "")?;
        let json = String::from_utf8(config.to_bytes()?)
            .map_err(|e| LibraryError::InvalidSif(e.to_string()))?;

        self.output.summary_kv(
            path,
            &[
                ("Id", header.global.id.to_string()),
                ("Version", header.global.version.clone()),
                ("Architecture", config.architecture.clone()),
                ("Signed", config.signed.to_string()),
                ("Encrypted", config.encrypted.to_string()),
                ("Descriptors", header.descriptors.len().to_string()),
                ("Digest", digest.to_string()),
                ("Config", json),
            ],
        );
        Ok(())
    }
}
