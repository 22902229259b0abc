//! Show the composite key for a request.

use anyhow::Result;
use pagecache_core::KeyBuilder;

use super::KeyArgs;
use crate::context::Context;

/// Run the key command.
pub async fn run(args: KeyArgs, ctx: &Context) -> Result<()> {
    let keys = &ctx.config.keys;
    let render = args.request.render_context(&keys.query_header);
    let key = KeyBuilder::new(keys).build(&render);

    if ctx.output.is_json() {
        ctx.output.json(&key);
        return Ok(());
    }

    ctx.output.header("Cache key");
    ctx.output.kv("key", key.as_str());
    ctx.output.kv("config", &ctx.config_source());
    if let Some(device) = key.device() {
        ctx.output.kv("device", &device.to_string());
    }
    for component in key.components() {
        ctx.output.kv("component", component);
    }
    Ok(())
}
