//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Fetch URLs through the request-orchestration engine.
///
/// Webfetch builds wire requests from a reusable session, follows redirects
/// and RFC-8288 `Link` pagination, retries failure statuses, and resumes
/// partial downloads.
#[derive(Parser, Debug)]
#[command(name = "webfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Target URL (a bare host/path defaults to http://)
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request body as a literal string
    #[arg(short = 'd', long, conflicts_with_all = ["body_file", "form"])]
    pub body: Option<String>,

    /// Read the request body from a file
    #[arg(long, value_name = "PATH", conflicts_with = "form")]
    pub body_file: Option<PathBuf>,

    /// Multipart form field, name=value or name=@path for a file part (repeatable)
    #[arg(short = 'F', long = "form")]
    pub form: Vec<String>,

    /// Content-Type for the request body
    #[arg(long)]
    pub content_type: Option<String>,

    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Save the response body to a file instead of stdout
    #[arg(short = 'o', long)]
    pub out_file: Option<PathBuf>,

    /// Resume a partial download of --out-file
    #[arg(long, requires = "out_file")]
    pub resume: bool,

    /// Maximum redirections (-1 = default policy, 0 = disable auto-redirect)
    #[arg(long, default_value_t = -1, value_parser = clap::value_parser!(i32).range(-1..))]
    pub max_redirect: i32,

    /// Retry attempts for failure statuses (0-10)
    #[arg(short = 'r', long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Seconds between retry attempts (1-3600)
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub retry_interval: u64,

    /// Follow the "next" relation of Link headers across pages
    #[arg(long)]
    pub follow_link: bool,

    /// Maximum number of followed pages
    #[arg(long, requires = "follow_link")]
    pub max_follow: Option<u32>,

    /// Keep the Authorization header across redirects
    #[arg(long)]
    pub preserve_authorization: bool,

    /// Emit non-success responses instead of failing
    #[arg(long)]
    pub skip_http_error_check: bool,

    /// Attach headers without validation
    #[arg(long)]
    pub skip_header_validation: bool,

    /// Basic credential as user:password
    #[arg(short = 'u', long, conflicts_with = "bearer")]
    pub user: Option<String>,

    /// Bearer token
    #[arg(long)]
    pub bearer: Option<String>,

    /// Allow credentials over unencrypted connections
    #[arg(long)]
    pub allow_unencrypted_auth: bool,

    /// Proxy URL
    #[arg(long, conflicts_with = "no_proxy")]
    pub proxy: Option<String>,

    /// Disable proxying entirely
    #[arg(long)]
    pub no_proxy: bool,

    /// Request timeout in seconds (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,

    /// User-Agent override
    #[arg(short = 'A', long)]
    pub user_agent: Option<String>,

    /// Disable keep-alive (send Connection: close)
    #[arg(long)]
    pub disable_keep_alive: bool,

    /// Print the status line and response headers before each body
    #[arg(short = 'i', long)]
    pub include_headers: bool,

    /// Print a JSON summary line per page instead of the body
    #[arg(long, conflicts_with = "include_headers")]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
