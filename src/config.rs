use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, str::FromStr};

/// Centralized application configuration.
/// Combines `GALLERY_*` environment variables and CLI arguments; CLI wins.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub buckets_root: String,
    pub public_url: String,
    pub signing_secret: String,
    pub cache_ttl_secs: u64,
    pub signed_url_expiry_secs: u64,
    pub page_size: usize,
    pub profile: Option<String>,
    pub bucket: Option<String>,
    pub region: String,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("buckets_root", &self.buckets_root)
            .field("public_url", &self.public_url)
            .field("signing_secret", &"<redacted>")
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("signed_url_expiry_secs", &self.signed_url_expiry_secs)
            .field("page_size", &self.page_size)
            .field("profile", &self.profile)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish()
    }
}

/// One-shot actions requested on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartupFlags {
    pub migrate: bool,
    pub purge_expired: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Browse images in an object-storage bucket with a local cache")]
pub struct Args {
    /// Host to bind to (overrides GALLERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GALLERY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Cache database URL (overrides GALLERY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory holding one sub-directory per bucket (overrides GALLERY_BUCKETS_ROOT)
    #[arg(long)]
    pub buckets_root: Option<String>,

    /// Base URL used in signed links (overrides GALLERY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Secret for signed links; random per process when unset (overrides GALLERY_SIGNING_SECRET)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Cache entry lifetime in seconds (overrides GALLERY_CACHE_TTL_SECS)
    #[arg(long)]
    pub cache_ttl_secs: Option<u64>,

    /// Signed link lifetime in seconds (overrides GALLERY_SIGNED_URL_EXPIRY_SECS)
    #[arg(long)]
    pub signed_url_expiry_secs: Option<u64>,

    /// Maximum keys per listing page (overrides GALLERY_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Saved profile alias to activate at start (overrides GALLERY_PROFILE)
    #[arg(long)]
    pub profile: Option<String>,

    /// Bucket to open when no saved profile is selected (overrides GALLERY_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Region of `--bucket` (overrides GALLERY_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Delete expired cache entries at start-up
    #[arg(long)]
    pub purge_expired: bool,
}

fn env_opt(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_opt(name)? {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and start-up flags.
    pub fn from_env_and_args() -> Result<(Self, StartupFlags)> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<(Self, StartupFlags)> {
        let port = match args.port {
            Some(port) => port,
            None => env_parsed("GALLERY_PORT", 3000)?,
        };
        let cache_ttl_secs = match args.cache_ttl_secs {
            Some(v) => v,
            None => env_parsed("GALLERY_CACHE_TTL_SECS", 24 * 60 * 60)?,
        };
        let signed_url_expiry_secs = match args.signed_url_expiry_secs {
            Some(v) => v,
            None => env_parsed("GALLERY_SIGNED_URL_EXPIRY_SECS", 300)?,
        };
        let page_size = match args.page_size {
            Some(v) => v,
            None => env_parsed("GALLERY_PAGE_SIZE", 1000)?,
        };

        let public_url = match args.public_url {
            Some(url) => url,
            None => env_opt("GALLERY_PUBLIC_URL")?
                .unwrap_or_else(|| format!("http://127.0.0.1:{}", port)),
        };
        let signing_secret = match args.signing_secret {
            Some(secret) => secret,
            None => env_opt("GALLERY_SIGNING_SECRET")?
                .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
        };

        let cfg = Self {
            host: args
                .host
                .map_or_else(|| env_opt("GALLERY_HOST"), |v| Ok(Some(v)))?
                .unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_url: args
                .database_url
                .map_or_else(|| env_opt("GALLERY_DATABASE_URL"), |v| Ok(Some(v)))?
                .unwrap_or_else(|| "sqlite://./data/gallery-cache.db".into()),
            buckets_root: args
                .buckets_root
                .map_or_else(|| env_opt("GALLERY_BUCKETS_ROOT"), |v| Ok(Some(v)))?
                .unwrap_or_else(|| "./data/buckets".into()),
            public_url,
            signing_secret,
            cache_ttl_secs,
            signed_url_expiry_secs,
            page_size,
            profile: args
                .profile
                .map_or_else(|| env_opt("GALLERY_PROFILE"), |v| Ok(Some(v)))?,
            bucket: args
                .bucket
                .map_or_else(|| env_opt("GALLERY_BUCKET"), |v| Ok(Some(v)))?,
            region: args
                .region
                .map_or_else(|| env_opt("GALLERY_REGION"), |v| Ok(Some(v)))?
                .unwrap_or_else(|| "us-east-1".into()),
        };

        let flags = StartupFlags {
            migrate: args.migrate,
            purge_expired: args.purge_expired,
        };
        Ok((cfg, flags))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
