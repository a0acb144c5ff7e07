//! CLI entry point: the host shell layer over the request engine.
//!
//! Everything here is parameter parsing and output rendering; the policy
//! logic (redirects, retries, resume, pagination) lives in `webfetch_core`.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, info, warn};
use webfetch_core::{
    AuthScheme, Body, Credentials, FormField, Operation, Orchestrator, Page, PageBody,
    ProxyConfig, Session,
};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let session = build_session(&args)?;
    let op = build_operation(&args)?;
    let mut orchestrator = Orchestrator::new(session, op);

    // ^C cancels the in-flight send or retry delay.
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling operation");
            cancel.cancel();
        }
    });

    let outcome = orchestrator.run(&args.url).await?;

    for page in &outcome.pages {
        render_page(&args, page)?;
    }
    for error in &outcome.errors {
        warn!(%error, "page-level error");
    }

    Ok(())
}

fn build_session(args: &Args) -> Result<Session> {
    let mut session = Session::new();

    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("header must be \"Name: value\", got: {header}"))?;
        session.headers.insert(name.trim(), value.trim());
    }

    if let Some(user) = &args.user {
        let (username, password) = user.split_once(':').unwrap_or((user.as_str(), ""));
        session.credentials = Some(Credentials::new(username, password));
        session.auth = AuthScheme::Basic;
    }
    if let Some(token) = &args.bearer {
        session.token = Some(token.clone());
        session.auth = AuthScheme::Bearer;
    }
    session.allow_unencrypted_auth = args.allow_unencrypted_auth;

    if let Some(proxy) = &args.proxy {
        let url = proxy
            .parse()
            .with_context(|| format!("invalid proxy URL: {proxy}"))?;
        session.proxy = Some(ProxyConfig::new(url));
    }
    session.no_proxy = args.no_proxy;

    session.maximum_redirection = args.max_redirect;
    session.maximum_retry_count = u32::from(args.max_retries);
    session.retry_interval = Duration::from_secs(args.retry_interval);
    if args.timeout > 0 {
        session.timeout = Some(Duration::from_secs(args.timeout));
    }
    if let Some(user_agent) = &args.user_agent {
        session.user_agent.clone_from(user_agent);
    }
    session.disable_keep_alive = args.disable_keep_alive;
    session.skip_header_validation = args.skip_header_validation;

    Ok(session)
}

fn build_operation(args: &Args) -> Result<Operation> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {}", args.method))?;

    let body = if let Some(text) = &args.body {
        Some(Body::Text(text.clone()))
    } else {
        args.body_file.clone().map(Body::File)
    };

    let form = if args.form.is_empty() {
        None
    } else {
        Some(
            args.form
                .iter()
                .map(|field| parse_form_field(field))
                .collect::<Result<Vec<_>>>()?,
        )
    };

    Ok(Operation {
        method,
        body,
        form,
        content_type: args.content_type.clone(),
        out_file: args.out_file.clone(),
        resume: args.resume,
        follow_rel_link: args.follow_link,
        maximum_follow_rel_link: args.max_follow.unwrap_or(u32::MAX),
        parse_rel_link: args.follow_link,
        preserve_authorization: args.preserve_authorization,
        skip_http_error_check: args.skip_http_error_check,
        ..Operation::default()
    })
}

/// Parses `name=value` into a string field and `name=@path` into a file
/// field, the way curl spells multipart uploads.
fn parse_form_field(field: &str) -> Result<FormField> {
    let Some((name, value)) = field.split_once('=') else {
        bail!("form field must be name=value or name=@path, got: {field}");
    };
    if let Some(path) = value.strip_prefix('@') {
        Ok(FormField::file(name, PathBuf::from(path)))
    } else {
        Ok(FormField::text(name, value))
    }
}

#[derive(Serialize)]
struct PageSummary<'a> {
    status: u16,
    bytes: u64,
    saved_to: Option<String>,
    links: &'a HashMap<String, String>,
}

fn render_page(args: &Args, page: &Page) -> Result<()> {
    let mut stdout = std::io::stdout().lock();

    if args.json {
        let (bytes, saved_to) = match &page.body {
            PageBody::Buffered(bytes) => (bytes.len() as u64, None),
            PageBody::Saved { path, bytes } => (*bytes, Some(path.display().to_string())),
            PageBody::Skipped => (0, None),
        };
        let summary = PageSummary {
            status: page.status.as_u16(),
            bytes,
            saved_to,
            links: &page.links,
        };
        writeln!(stdout, "{}", serde_json::to_string(&summary)?)?;
        return Ok(());
    }

    if args.include_headers {
        writeln!(stdout, "HTTP {}", page.status)?;
        for (name, value) in &page.headers {
            writeln!(stdout, "{}: {}", name, value.to_str().unwrap_or("<binary>"))?;
        }
        writeln!(stdout)?;
    }

    match &page.body {
        PageBody::Buffered(bytes) => {
            stdout.write_all(bytes)?;
            if !bytes.ends_with(b"\n") {
                writeln!(stdout)?;
            }
        }
        PageBody::Saved { path, bytes } => {
            info!(path = %path.display(), bytes, "saved response body");
        }
        PageBody::Skipped => {
            info!("output file already complete; nothing written");
        }
    }

    Ok(())
}
