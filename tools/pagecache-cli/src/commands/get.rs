//! Look up a cache entry.

use anyhow::Result;
use serde_json::json;

use super::GetArgs;
use crate::context::Context;
use crate::output::{format_timestamp, status_badge};

/// Run the get command.
pub async fn run(args: GetArgs, ctx: &Context) -> Result<()> {
    let cache = ctx.cache().await?;
    let request = cache.for_request(args.request.render_context(&ctx.config.keys.query_header));
    let lookup = request.lookup(&args.path).await?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "path": args.path,
            "cacheKey": request.cache_key().as_str(),
            "status": lookup.status,
            "entry": lookup.entry,
        }));
        return Ok(());
    }

    ctx.output.header(&format!("{} [{}]", args.path, request.cache_key()));
    ctx.output.kv("status", &status_badge(lookup.status));

    let Some(entry) = &lookup.entry else {
        return Ok(());
    };

    ctx.output.kv("kind", entry.value.kind());
    ctx.output.kv("last modified", &format_timestamp(entry.last_modified));
    if let Some(revalidate) = entry.revalidate {
        ctx.output.kv("revalidate", &format!("{}s", revalidate));
    }
    let tags = entry.derived_tags();
    if !tags.is_empty() {
        ctx.output.kv("tags", &tags.join(", "));
    }
    if let Some(html) = entry.html() {
        ctx.output.kv("html", &format!("{} bytes", html.len()));
    }
    if args.full {
        ctx.output.json(entry);
    }
    Ok(())
}
