use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cyphernetes::backend::{HttpQueryBackend, QueryBackend};
use cyphernetes::config::{CliArgs, ContextResolver, KubeconfigContextResolver, RuntimeConfig};
use cyphernetes::error::ShellError;
use cyphernetes::graph::GraphRenderer;
use cyphernetes::macros::MacroStore;
use cyphernetes::schema::{Gvr, SchemaIndex, SchemaProvider};
use cyphernetes::shell::ShellLoop;

/// Bridges the async [`QueryBackend`] discovery calls into the synchronous
/// [`SchemaProvider`] contract [`SchemaIndex`] depends on. `SchemaIndex`'s
/// population happens once at startup and is never on the hot completion
/// path, so blocking the calling thread for the duration of one HTTP round
/// trip is an acceptable cost for keeping the two traits decoupled.
struct BackendSchemaProvider(Arc<dyn QueryBackend>);

impl SchemaProvider for BackendSchemaProvider {
    fn list_gvrs(&self) -> Result<Vec<(String, Gvr)>> {
        let backend = self.0.clone();
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(backend.list_gvrs()))
    }

    fn field_paths(&self, schema_name: &str) -> Result<Vec<String>> {
        // `SchemaIndex` works in terms of fully qualified schema names
        // (`io.k8s.api.apps.v1.Deployment`); the backend's discovery
        // endpoint is keyed by bare kind, so take the last dotted segment.
        let kind = schema_name.rsplit('.').next().unwrap_or(schema_name).to_string();
        let backend = self.0.clone();
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(backend.field_paths(&kind)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match CliArgs::parse(cli_args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let config = match RuntimeConfig::resolve(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.report());
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.as_tracing_filter()));
    // Wrapped in a `reload::Layer` so the shell's `\d` meta-command can
    // actually change the live log level instead of only flipping a session
    // flag nothing reads.
    let (filter, log_reload) = tracing_subscriber::reload::Layer::new(filter);
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
    info!(target: "cyphernetes", backend_url = %config.backend_url, namespace = %config.namespace, "starting shell");

    let resolver = KubeconfigContextResolver { path: KubeconfigContextResolver::default_path() };
    let context_name = match resolver.current_context() {
        Ok(ctx) => ctx,
        Err(e) => {
            let err = ShellError::fatal_init(e.to_string());
            eprintln!("{}", err.report());
            std::process::exit(1);
        }
    };

    let client = reqwest::Client::new();
    let backend: Arc<dyn QueryBackend> = match HttpQueryBackend::new(client.clone(), &config.backend_url) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            eprintln!("{}", ShellError::fatal_init(e.to_string()).report());
            std::process::exit(1);
        }
    };

    let schema = Arc::new(SchemaIndex::new(Arc::new(BackendSchemaProvider(backend.clone()))));
    schema.prime();

    let (store, warning) = MacroStore::bootstrap(config.macros_path.as_deref());
    if let Some(w) = warning {
        eprintln!("{}", w.report());
    }
    let macros = Arc::new(parking_lot::RwLock::new(store));

    let renderer = GraphRenderer::new(client, config.dot2ascii_url.clone());

    let mut shell = match ShellLoop::new(context_name, &config, macros, schema, backend, renderer, Some(log_reload)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e.report());
            std::process::exit(1);
        }
    };

    let code = match shell.run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.report());
            1
        }
    };
    std::process::exit(code);
}
