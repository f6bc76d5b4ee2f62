use clap::{Parser, Subcommand};
use eyre::{Context, OptionExt};
use gfycat::{Client, Config, FeedQuery, SortBy, UploadOptions};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Command-line access to a Gfycat account.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML file with a `[credentials]` table and optional `[tags]` lists.
    #[arg(short, long, default_value = "gfycat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload video files, titled after their file names.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Named tag lists from the config file to apply.
        #[arg(short, long = "tags", num_args = 1..)]
        tag_sections: Vec<String>,

        /// Additional tags to apply.
        #[arg(short, long, num_args = 1..)]
        extra_tags: Vec<String>,

        /// Only print what would be uploaded.
        #[arg(short, long)]
        dry_run: bool,

        /// Upload in order of the number after the first `-` in each file name.
        #[arg(short, long)]
        sort: bool,
    },
    /// List the gfycats of a feed.
    Feed {
        /// Whose feed to list; defaults to your own.
        #[arg(short, long)]
        user: Option<String>,

        /// How many to fetch; negative fetches everything.
        #[arg(short, long, default_value_t = 100, allow_negative_numbers = true)]
        limit: i64,

        /// Field to sort by, e.g. `views` or `createDate`.
        #[arg(long)]
        sort_by: Option<SortBy>,

        /// Sort smallest first.
        #[arg(long)]
        asc: bool,

        /// Only list gfycats stuck in review.
        #[arg(long)]
        pending: bool,
    },
}

#[derive(Debug, Deserialize)]
struct CliConfig {
    credentials: CredentialsSection,
    #[serde(default)]
    tags: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CredentialsSection {
    client_id: String,
    client_secret: String,
    /// Where the OAuth tokens are kept between runs.
    #[serde(default = "default_token_file")]
    token_file: PathBuf,
    #[serde(default = "default_true")]
    open_browser: bool,
    /// Seconds to wait for the browser login before giving up.
    authorization_timeout: Option<u64>,
}

fn default_token_file() -> PathBuf {
    PathBuf::from("gfycat-credentials.json")
}

fn default_true() -> bool {
    true
}

impl CliConfig {
    async fn load(path: &Path) -> eyre::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))
    }

    fn client_config(&self) -> eyre::Result<Config> {
        let creds = &self.credentials;
        let mut builder = Config::builder();
        builder
            .client_id(creds.client_id.clone())
            .client_secret(creds.client_secret.clone())
            .credentials_path(creds.token_file.clone())
            .open_browser(creds.open_browser);
        if let Some(secs) = creds.authorization_timeout {
            builder.authorization_timeout(Duration::from_secs(secs));
        }
        builder.build().context("build client configuration")
    }

    fn tags(&self, sections: &[String], extra: &[String]) -> eyre::Result<Vec<String>> {
        let mut tags = extra.to_vec();
        for section in sections {
            let listed = self
                .tags
                .get(section)
                .ok_or_else(|| eyre::eyre!("tag list `{section}` was not found in config file"))?;
            tags.extend(listed.iter().cloned());
        }
        Ok(tags)
    }
}

/// A file to upload and the title it gets.
struct Uploadable {
    title: String,
    path: PathBuf,
}

impl Uploadable {
    fn new(path: PathBuf) -> eyre::Result<Self> {
        let title = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_eyre("file name is not valid UTF-8")
            .with_context(|| format!("derive title for {}", path.display()))?
            .to_string();
        Ok(Self { title, path })
    }

    fn sequence_number(&self) -> eyre::Result<u64> {
        self.title
            .split('-')
            .nth(1)
            .ok_or_eyre("no `-` in file name")
            .and_then(|n| n.trim().parse().context("not a number after `-`"))
            .with_context(|| format!("sort {}", self.path.display()))
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load(&cli.config).await?;

    match cli.command {
        Command::Upload {
            files,
            tag_sections,
            extra_tags,
            dry_run,
            sort,
        } => {
            let tags = config.tags(&tag_sections, &extra_tags)?;
            let mut uploadables = files
                .into_iter()
                .map(Uploadable::new)
                .collect::<eyre::Result<Vec<_>>>()?;
            if sort {
                let mut keyed = uploadables
                    .into_iter()
                    .map(|u| Ok((u.sequence_number()?, u)))
                    .collect::<eyre::Result<Vec<_>>>()?;
                keyed.sort_by_key(|(n, _)| *n);
                uploadables = keyed.into_iter().map(|(_, u)| u).collect();
            }

            eprintln!("Uploading files with the following tags: {tags:?}");
            let client = if dry_run {
                None
            } else {
                let client = Client::new(config.client_config()?)?;
                client.authenticate().await.context("authenticate with Gfycat")?;
                Some(client)
            };

            for Uploadable { title, path } in uploadables {
                eprintln!("Title: {title}; Path: {}", path.display());
                let Some(client) = &client else { continue };
                let options = UploadOptions::default()
                    .title(title)
                    .tags(tags.iter().cloned());
                match client
                    .upload_from_file(&path, options)
                    .await
                    .with_context(|| format!("upload {}", path.display()))?
                {
                    Some(gfy) => println!("{}", gfy.url()),
                    None => eprintln!("{} was uploaded but not confirmed", path.display()),
                }
            }
        }
        Command::Feed {
            user,
            limit,
            sort_by,
            asc,
            pending,
        } => {
            let client = Client::new(config.client_config()?)?;
            client.authenticate().await.context("authenticate with Gfycat")?;

            let mut query = FeedQuery::new().limit(limit);
            if let Some(field) = sort_by {
                query = query.sort_by(field);
            }
            if asc {
                query = query.ascending();
            }
            if pending {
                query = query.filter(|gfy| gfy.is_pending_review());
            }

            let gfycats = client
                .get_feed(user.as_deref(), query)
                .await
                .context("fetch feed")?;
            for (i, gfy) in gfycats.iter().enumerate() {
                println!("{:>4} {} {:>8} views  {}", i + 1, gfy.url(), gfy.views, gfy.title);
            }
        }
    }

    Ok(())
}
