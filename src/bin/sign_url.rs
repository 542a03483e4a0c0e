//! CLI tool for minting and checking proxy references
//!
//! Usage:
//!   sealproxy-sign link <url> [--frame] [--base <url>]
//!   sealproxy-sign stylesheet <url> [--base <url>]
//!   sealproxy-sign image <url> [--base <url>]
//!   sealproxy-sign verify <url> <token> [--image]
//!   sealproxy-sign secret

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sealproxy::resolve::{parse_target, resolve, target_form};
use sealproxy::rewrite::links;
use sealproxy::{generate_secret, Signer, StaticSecret};
use std::sync::Arc;
use url::Url;

/// Mint and verify signed Sealproxy references
#[derive(Parser, Debug)]
#[command(name = "sealproxy-sign")]
#[command(author = "Sealproxy Contributors")]
#[command(version)]
#[command(about = "Mint and verify signed Sealproxy references")]
struct Args {
    /// HMAC secret the proxy runs with
    #[arg(long, env = "PROXY_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Prefix printed references with this origin (e.g. https://proxy.example.com)
    #[arg(long, env = "PROXY_ORIGIN")]
    origin: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Proxied page reference
    Link {
        /// Target URL, absolute or relative to --base
        url: String,

        /// Reference for a frame instead of a top-level page
        #[arg(long)]
        frame: bool,

        /// Base URL for relative targets
        #[arg(short = 'b', long)]
        base: Option<String>,
    },

    /// Proxied stylesheet reference
    Stylesheet {
        url: String,

        #[arg(short = 'b', long)]
        base: Option<String>,
    },

    /// Proxied image reference
    Image {
        url: String,

        #[arg(short = 'b', long)]
        base: Option<String>,
    },

    /// Check a token against a URL
    Verify {
        url: String,

        token: String,

        /// The token is an image token (",s" prefix)
        #[arg(long)]
        image: bool,
    },

    /// Print a fresh random secret
    Secret,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Link { url, frame, base } => {
            let signer = signer(args.secret.as_deref())?;
            let target = target(&url, base.as_deref())?;
            let reference = if frame {
                links::frame_link(&signer, &target)
            } else {
                links::page_link(&signer, &target)
            };
            print_reference(&target, &reference, args.origin.as_deref(), args.json)?;
        }

        Commands::Stylesheet { url, base } => {
            let signer = signer(args.secret.as_deref())?;
            let target = target(&url, base.as_deref())?;
            let reference = links::stylesheet_link(&signer, &target);
            print_reference(&target, &reference, args.origin.as_deref(), args.json)?;
        }

        Commands::Image { url, base } => {
            let signer = signer(args.secret.as_deref())?;
            let target = target(&url, base.as_deref())?;
            let reference = links::image_link(&signer, &target);
            print_reference(&target, &reference, args.origin.as_deref(), args.json)?;
        }

        Commands::Verify { url, token, image } => {
            let signer = signer(args.secret.as_deref())?;
            let valid = if image {
                signer.verify_image(&url, &token)
            } else {
                signer.verify_link(&url, &token)
            };

            if args.json {
                println!("{}", serde_json::json!({ "url": url, "valid": valid }));
            } else if valid {
                println!("valid");
            } else {
                println!("invalid");
            }

            if !valid {
                std::process::exit(1);
            }
        }

        Commands::Secret => {
            println!("{}", generate_secret());
        }
    }

    Ok(())
}

fn signer(secret: Option<&str>) -> Result<Signer> {
    match secret {
        Some(secret) if !secret.is_empty() => Ok(Signer::new(Arc::new(StaticSecret::new(secret)))),
        _ => bail!("A secret is required: pass --secret or set PROXY_SECRET"),
    }
}

/// The target string a reference is signed over, in the form the page
/// rewriter would emit for `url`
fn target(reference: &str, base: Option<&str>) -> Result<String> {
    let url = match base {
        Some(base) => {
            let base = Url::parse(base).with_context(|| format!("Invalid base URL: {}", base))?;
            resolve(&base, reference).with_context(|| format!("Cannot resolve {} against {}", reference, base))?
        }
        None => Url::parse(reference.trim()).with_context(|| format!("Invalid URL: {}", reference))?,
    };
    let url = parse_target(url.as_str())?;
    Ok(target_form(reference, &url))
}

fn print_reference(target: &str, reference: &str, origin: Option<&str>, json: bool) -> Result<()> {
    let reference = match origin {
        Some(origin) => format!("{}{}", origin.trim_end_matches('/'), reference),
        None => reference.to_string(),
    };

    if json {
        let output = serde_json::json!({ "url": target, "reference": reference });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", reference);
    }
    Ok(())
}
