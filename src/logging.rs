//! Tracing setup. Deployed environments log JSON; dev gets pretty output
//! with file and line numbers.

use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. The HTTP client stack is kept
/// quiet outside dev since every backend call already logs its own span.
fn default_directives(env: &Environment) -> &'static str {
    match env {
        Environment::Dev => "fmcg_dashboard=debug,tower_http=debug,reqwest=info,hyper=info,info",
        Environment::Staging => "fmcg_dashboard=debug,tower_http=info,reqwest=warn,hyper=warn,info",
        Environment::Prod => "fmcg_dashboard=info,tower_http=info,reqwest=warn,hyper=warn,redis=warn,warn",
    }
}

pub fn init_logging(env: &Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(env)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    if env.is_dev() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    }

    tracing::info!(env = ?env, "Logging initialized");
}
