//! Delete one cache entry.

use anyhow::Result;

use super::DeleteArgs;
use crate::context::Context;

/// Run the delete command.
pub async fn run(args: DeleteArgs, ctx: &Context) -> Result<()> {
    let cache = ctx.cache().await?;
    let request = cache.for_request(args.request.render_context(&ctx.config.keys.query_header));
    request.delete(&args.path).await?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "deleted": { "path": args.path, "cacheKey": request.cache_key().as_str() }
        }));
    } else {
        ctx.output
            .success(&format!("Deleted {} [{}]", args.path, request.cache_key()));
    }
    Ok(())
}
