//! CLI command implementations.

pub mod delete;
pub mod get;
pub mod invalidate;
pub mod key;

use clap::Args;
use pagecache_core::{RenderContext, COOKIE_HEADER, USER_AGENT_HEADER};

/// Request signals that feed key derivation.
#[derive(Args, Debug, Default)]
pub struct RequestArgs {
    /// Raw Cookie header.
    #[arg(long)]
    pub cookie: Option<String>,

    /// Query signal (URL-encoded JSON object).
    #[arg(long)]
    pub query: Option<String>,

    /// User-Agent header.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Treat the request as rendered by the app router.
    #[arg(long)]
    pub app_router: bool,
}

impl RequestArgs {
    /// Build the render context the cache would see.
    pub fn render_context(&self, query_header: &str) -> RenderContext {
        let mut ctx = RenderContext::new().with_app_router(self.app_router);
        if let Some(cookie) = &self.cookie {
            ctx = ctx.with_header(COOKIE_HEADER, cookie.as_str());
        }
        if let Some(query) = &self.query {
            ctx = ctx.with_header(query_header, query.as_str());
        }
        if let Some(user_agent) = &self.user_agent {
            ctx = ctx.with_header(USER_AGENT_HEADER, user_agent.as_str());
        }
        ctx
    }
}

/// Arguments for the key command.
#[derive(Args)]
pub struct KeyArgs {
    #[command(flatten)]
    pub request: RequestArgs,
}

/// Arguments for the get command.
#[derive(Args)]
pub struct GetArgs {
    /// Page path (e.g. /blog).
    pub path: String,

    #[command(flatten)]
    pub request: RequestArgs,

    /// Print the full stored entry.
    #[arg(long)]
    pub full: bool,
}

/// Arguments for the delete command.
#[derive(Args)]
pub struct DeleteArgs {
    /// Page path (e.g. /blog).
    pub path: String,

    #[command(flatten)]
    pub request: RequestArgs,
}

/// Arguments for the invalidate-path command.
#[derive(Args)]
pub struct InvalidatePathArgs {
    /// Page path (e.g. /blog).
    pub path: String,

    /// Only delete these cache-key variants (repeatable).
    #[arg(short, long = "key")]
    pub keys: Vec<String>,
}

/// Arguments for the invalidate-tag command.
#[derive(Args)]
pub struct InvalidateTagArgs {
    /// Tag to invalidate. `_N_T_<path>` invalidates a path.
    pub tag: String,

    /// Only delete these cache-key variants (repeatable).
    #[arg(short, long = "key")]
    pub keys: Vec<String>,
}
