//! Path and tag invalidation.

use anyhow::Result;
use serde_json::json;

use super::{InvalidatePathArgs, InvalidateTagArgs};
use crate::context::Context;

/// Run the invalidate-path command.
pub async fn run_path(args: InvalidatePathArgs, ctx: &Context) -> Result<()> {
    let cache = ctx.cache().await?;
    cache.delete_all_by_path(&args.path, &args.keys).await?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({ "invalidated": { "path": args.path, "keys": args.keys } }));
    } else {
        ctx.output
            .success(&format!("Invalidated {}{}", args.path, describe_filter(&args.keys)));
    }
    Ok(())
}

/// Run the invalidate-tag command.
pub async fn run_tag(args: InvalidateTagArgs, ctx: &Context) -> Result<()> {
    let cache = ctx.cache().await?;
    cache.revalidate_tag(&args.tag, &args.keys).await?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({ "invalidated": { "tag": args.tag, "keys": args.keys } }));
    } else {
        ctx.output
            .success(&format!("Invalidated tag '{}'{}", args.tag, describe_filter(&args.keys)));
    }
    Ok(())
}

fn describe_filter(keys: &[String]) -> String {
    if keys.is_empty() {
        String::new()
    } else {
        format!(" (variants: {})", keys.join(", "))
    }
}
