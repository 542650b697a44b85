//! ShellLoop (C6): the orchestrator. Reads a line, classifies it as a
//! meta-command, a macro invocation, or a graph query, dispatches it, and
//! formats whatever comes back. This is the only module that owns the
//! line editor and drives cancellation; every other component is a pure
//! function or a narrow trait it calls into.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rustyline::error::ReadlineError;
use rustyline::Editor;
use tokio_util::sync::CancellationToken;

use crate::ansi;
use crate::backend::QueryBackend;
use crate::completer::ShellHelper;
use crate::config::RuntimeConfig;
use crate::error::{ShellError, ShellResult};
use crate::graph::{Graph, GraphRenderer};
use crate::macros::MacroStore;
use crate::output;
use crate::painter;
use crate::schema::SchemaIndex;
use crate::session::{CommandLineState, Session};

/// Handle to the live `tracing` filter, reloaded by `\d` so the meta-command
/// actually changes what gets logged instead of only flipping a flag nothing
/// reads (§4.6).
pub type LogReloadHandle = tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>;

const HELP_TEXT: &str = "\
Cyphernetes interactive shell.

  MATCH (p:Pod) RETURN p.metadata.name;   run a graph query
  :name arg...                            expand and run a macro
  \\n <namespace> | \\n all                 switch namespace ('all' = all namespaces)
  \\d                                      toggle debug log level
  \\q                                      toggle exec-time display
  \\r                                      toggle raw (uncolored) output
  \\m                                      toggle multi-line input
  \\g                                      toggle graph output
  \\gl                                     toggle graph layout LR/TB
  \\lm                                     list macros with descriptions
  exit                                     quit the shell
";

/// Outcome of reading one line from the editor, abstracting over the three
/// ways `readline` can end so the caller doesn't match on `ReadlineError`.
enum LineEvent {
    Line(String),
    CtrlC,
    CtrlD,
}

pub struct ShellLoop {
    session: Session,
    state: CommandLineState,
    macros: Arc<RwLock<MacroStore>>,
    schema: Arc<SchemaIndex>,
    backend: Arc<dyn QueryBackend>,
    renderer: GraphRenderer,
    editor: Option<Editor<ShellHelper, rustyline::history::DefaultHistory>>,
    history_path: Option<std::path::PathBuf>,
    log_reload: Option<LogReloadHandle>,
}

impl ShellLoop {
    pub fn new(
        context_name: String,
        config: &RuntimeConfig,
        macros: Arc<RwLock<MacroStore>>,
        schema: Arc<SchemaIndex>,
        backend: Arc<dyn QueryBackend>,
        renderer: GraphRenderer,
        log_reload: Option<LogReloadHandle>,
    ) -> ShellResult<Self> {
        let mut session = Session::new(context_name, config.namespace.clone());
        session.output_format = config.output_format;
        session.flags.no_color = config.no_color;
        session.flags.debug = config.log_level == crate::config::LogLevel::Debug;

        let mut editor: Editor<ShellHelper, rustyline::history::DefaultHistory> =
            Editor::new().map_err(|e| ShellError::fatal_init(format!("failed to initialize line editor: {e}")))?;
        editor.set_helper(Some(ShellHelper { schema: schema.clone(), macros: macros.clone(), no_color: config.no_color }));

        let mut warning = None;
        if let Some(path) = &config.history_path {
            if path.exists() {
                if let Err(e) = editor.load_history(path) {
                    warning = Some(ShellError::io(format!("failed to load history {}: {e}", path.display())));
                }
            }
        }
        if let Some(w) = warning {
            eprintln!("{}", w.report());
        }

        Ok(Self {
            session,
            state: CommandLineState::default(),
            macros,
            schema,
            backend,
            renderer,
            editor: Some(editor),
            history_path: config.history_path.clone(),
            log_reload,
        })
    }

    fn prompt(&self) -> String {
        let ns = self.session.namespace_display();
        let plain = format!("({}) {} » ", self.session.context_name, ns);
        if self.session.flags.no_color {
            return plain;
        }
        let color = if self.session.all_namespaces() { ansi::PROMPT_ALL_NAMESPACES } else { ansi::PROMPT_NAMESPACED };
        format!("\x1b[{color}m({}) {}\x1b[0m » ", self.session.context_name, ns)
    }

    fn multiline_prompt(&self) -> String {
        "... ".to_string()
    }

    /// Move the editor onto a blocking thread for the duration of one
    /// `readline` call, then hand it back. This is how the foreground,
    /// synchronous line-editor coexists with the async query path (§5
    /// "Ambient addition") without ever blocking the executor.
    async fn read_line(&mut self, prompt: &str) -> ShellResult<LineEvent> {
        let mut editor = self.editor.take().expect("editor always present between reads");
        let prompt = prompt.to_string();
        let (editor, event) = tokio::task::spawn_blocking(move || {
            let result = editor.readline(&prompt);
            (editor, result)
        })
        .await
        .map_err(|e| ShellError::fatal_init(format!("line editor task panicked: {e}")))?;
        self.editor = Some(editor);

        match event {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Some(editor) = self.editor.as_mut() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                }
                Ok(LineEvent::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(LineEvent::CtrlC),
            Err(ReadlineError::Eof) => Ok(LineEvent::CtrlD),
            Err(e) => Err(ShellError::io(format!("line editor error: {e}"))),
        }
    }

    /// Drive the interactive loop until `exit`, EOF-on-empty-input, or
    /// Ctrl-C-on-empty-input. Returns the process exit code.
    pub async fn run(&mut self) -> ShellResult<i32> {
        loop {
            let prompt = if self.state.is_buffering() { self.multiline_prompt() } else { self.prompt() };
            match self.read_line(&prompt).await? {
                LineEvent::Line(raw) => {
                    if self.accumulate_or_ready(raw) {
                        let joined = self.state.joined();
                        self.state.clear_buffer();
                        match self.dispatch(joined.trim().trim_end_matches(';').to_string()).await {
                            Ok(true) => {
                                self.save_history();
                                return Ok(0);
                            }
                            Ok(false) => {}
                            Err(e) => {
                                if e.is_fatal() {
                                    eprintln!("{}", e.report());
                                    self.save_history();
                                    return Ok(1);
                                }
                                println!("{}", e.report());
                            }
                        }
                    }
                }
                LineEvent::CtrlC => {
                    if self.state.is_buffering() {
                        self.state.clear_buffer();
                        continue;
                    }
                    self.save_history();
                    return Ok(0);
                }
                LineEvent::CtrlD => {
                    if self.state.is_buffering() {
                        continue;
                    }
                    self.save_history();
                    return Ok(0);
                }
            }
        }
    }

    /// Line lifecycle step 2/3 (§4.6): decide whether `raw` completes the
    /// current input or needs to be buffered for multi-line accumulation.
    /// Returns true when `raw` (plus whatever was previously buffered) is
    /// ready to dispatch.
    fn accumulate_or_ready(&mut self, raw: String) -> bool {
        if !self.session.flags.multiline_enabled {
            self.state.accumulated_lines.push(raw);
            return true;
        }
        let trimmed = raw.trim();
        let is_terminator = trimmed.is_empty()
            || trimmed.ends_with(';')
            || trimmed.starts_with('\\')
            || trimmed == "exit"
            || trimmed == "help"
            || trimmed.starts_with(':');
        self.state.accumulated_lines.push(raw);
        is_terminator
    }

    /// Dispatch one already-joined command. Returns `Ok(true)` when the
    /// command was `exit`, so `run()` — the single point that owns the
    /// process exit code — can flush history before returning, rather than
    /// this function tearing down the process itself (§7: `exit` must not
    /// skip the same history-persisting shutdown Ctrl-C/Ctrl-D get).
    async fn dispatch(&mut self, line: String) -> ShellResult<bool> {
        if line.is_empty() {
            return Ok(false);
        }
        if line == "exit" {
            return Ok(true);
        }
        if line == "help" {
            print!("{HELP_TEXT}");
            return Ok(false);
        }
        if let Some(rest) = line.strip_prefix('\\') {
            self.dispatch_meta(rest)?;
            return Ok(false);
        }
        if let Some(rest) = line.strip_prefix(':') {
            self.dispatch_macro(rest).await?;
            return Ok(false);
        }
        self.run_single_statement(&line).await?;
        Ok(false)
    }

    fn dispatch_meta(&mut self, rest: &str) -> ShellResult<()> {
        let mut parts = rest.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        match cmd {
            "n" => {
                let arg = parts.next().ok_or_else(|| ShellError::macro_error("\\n requires a namespace or 'all'"))?;
                self.session.set_namespace(arg);
                println!("namespace set to {}", self.session.namespace_display());
            }
            "d" => {
                self.session.flags.debug = !self.session.flags.debug;
                let level = if self.session.flags.debug { "debug" } else { "info" };
                if let Some(handle) = &self.log_reload {
                    if let Err(e) = handle.reload(tracing_subscriber::EnvFilter::new(level)) {
                        println!("Error >> failed to change log level: {e}");
                    }
                }
                println!("debug logging {}", on_off(self.session.flags.debug));
            }
            "q" => {
                self.session.flags.print_exec_time = !self.session.flags.print_exec_time;
                println!("exec-time display {}", on_off(self.session.flags.print_exec_time));
            }
            "r" => {
                self.session.flags.raw_output = !self.session.flags.raw_output;
                println!("raw output {}", on_off(self.session.flags.raw_output));
            }
            "m" => {
                self.session.flags.multiline_enabled = !self.session.flags.multiline_enabled;
                println!("multi-line input {}", on_off(self.session.flags.multiline_enabled));
            }
            "g" => {
                self.session.flags.graph_output_enabled = !self.session.flags.graph_output_enabled;
                println!("graph output {}", on_off(self.session.flags.graph_output_enabled));
            }
            "gl" => {
                self.session.flags.graph_layout_lr = !self.session.flags.graph_layout_lr;
                println!("graph layout {}", if self.session.flags.graph_layout_lr { "LR" } else { "TB" });
            }
            "lm" => {
                for m in self.macros.read().iter_sorted() {
                    match &m.description {
                        Some(d) => println!(":{:<20} {}", m.name, d),
                        None => println!(":{}", m.name),
                    }
                }
            }
            other => {
                println!("Error >> unknown meta-command \\{other}");
            }
        }
        Ok(())
    }

    /// Expand and run a macro (§4.6): every statement's graph fragment is
    /// merged *and* every statement's tabular `Data` is merged before the one
    /// `sanitize` pass, so a node only corroborated by an earlier statement's
    /// result (not the last one) still survives.
    async fn dispatch_macro(&mut self, rest: &str) -> ShellResult<()> {
        let (aggregated_data, sanitized) = self.expand_macro(rest).await?;
        self.present(&aggregated_data, &sanitized).await;
        Ok(())
    }

    /// Expand `rest` (a macro name plus arguments) into its constituent
    /// statements, run each in turn, and merge their responses into one
    /// `(Data, Graph)` pair: graph fragments via `Graph::merge`, tabular data
    /// via [`merge_tabular`], before the single `sanitize` pass (§4.6). Split
    /// out from `dispatch_macro` so tests can assert on the aggregated result
    /// directly instead of only on stdout.
    async fn expand_macro(&mut self, rest: &str) -> ShellResult<(serde_json::Value, Graph)> {
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or("");
        let args: Vec<String> = parts.map(|s| s.to_string()).collect();
        let statements = self.macros.read().execute(name, &args)?;

        let mut aggregated_graph = Graph::default();
        let mut aggregated_data = serde_json::Value::Null;
        for (i, stmt) in statements.iter().enumerate() {
            match self.execute_one(stmt).await {
                Ok(resp) => {
                    aggregated_graph = aggregated_graph.merge(resp.graph);
                    aggregated_data = merge_tabular(aggregated_data, resp.data);
                }
                Err(e) => {
                    return Err(ShellError::statement(i, e.to_string()));
                }
            }
        }
        let sanitized = aggregated_graph.sanitize(&aggregated_data);
        Ok((aggregated_data, sanitized))
    }

    async fn run_single_statement(&mut self, stmt: &str) -> ShellResult<()> {
        let resp = self.execute_one(stmt).await?;
        let sanitized = resp.graph.sanitize(&resp.data);
        self.present(&resp.data, &sanitized).await;
        Ok(())
    }

    /// Execute one concrete statement, racing it against Ctrl-C so the
    /// shell stays responsive to an interrupt while a query is in flight
    /// (§5 "Ambient addition"). `executing` is the ownership token (§5):
    /// held only for the duration of this call.
    ///
    /// On Ctrl-C, cancellation is not just abandoning the race: the shared
    /// `CancellationToken` is tripped so `QueryBackend::execute` can return
    /// promptly, and the spawned task is `abort()`-ed and then joined before
    /// `executing` is released, so the loop never accepts a new command
    /// while the old request might still be running (§5 "no two queries are
    /// ever issued concurrently from one session").
    async fn execute_one(&mut self, stmt: &str) -> ShellResult<crate::backend::QueryResponse> {
        self.backend.parse(stmt).await.map_err(|e| ShellError::parse(e.to_string()))?;

        self.state.executing = true;
        let start = Instant::now();
        let backend = self.backend.clone();
        let owned_stmt = stmt.to_string();
        let ns = self.session.namespace.clone();
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let mut exec_task =
            tokio::spawn(async move { backend.execute(&owned_stmt, &ns, cancel_for_task).await });

        let result = tokio::select! {
            res = &mut exec_task => {
                match res {
                    Ok(inner) => inner.map_err(|e| ShellError::exec(e.to_string())),
                    Err(e) => Err(ShellError::exec(format!("query task panicked: {e}"))),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("^C (cancelling query...)");
                cancel.cancel();
                exec_task.abort();
                let _ = (&mut exec_task).await;
                Err(ShellError::exec("query cancelled"))
            }
        };
        self.state.last_exec_duration = Some(start.elapsed());
        self.state.executing = false;
        result
    }

    async fn present(&mut self, data: &serde_json::Value, graph: &Graph) {
        let colorize = !self.session.flags.no_color && std::io::stdout().is_terminal();
        if let Some(text) = output::format_data(data, self.session.output_format, colorize, self.session.flags.raw_output) {
            println!("{text}");
        }
        if self.session.flags.print_exec_time {
            if let Some(d) = self.state.last_exec_duration {
                println!("exec time: {:.3}s", d.as_secs_f64());
            }
        }
        if self.session.flags.graph_output_enabled && !graph.is_empty() {
            let ascii = self.renderer.render(graph, self.session.flags.graph_layout_lr).await;
            if !ascii.is_empty() {
                println!("{ascii}");
            }
        }
    }

    fn save_history(&mut self) {
        let Some(path) = &self.history_path else { return };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Some(editor) = self.editor.as_mut() {
            if let Err(e) = editor.save_history(path) {
                eprintln!("{}", ShellError::io(format!("failed to save history {}: {e}", path.display())).report());
            }
        }
    }
}

fn on_off(b: bool) -> &'static str {
    if b {
        "on"
    } else {
        "off"
    }
}

/// Deep-merge one statement's tabular `Data` into the running aggregate
/// (§4.6): objects are merged key-by-key, same-key arrays are concatenated
/// (the kind-keyed row-array shape `sanitize` expects, e.g. two statements
/// each contributing to `"Pod": [...]`), and anything else is overwritten by
/// the later value. `Value::Null` never overwrites a prior non-null value,
/// since a later statement with no data for a key shouldn't erase an earlier
/// statement's corroborating rows.
fn merge_tabular(a: serde_json::Value, b: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match (a, b) {
        (a, Value::Null) => a,
        (Value::Null, b) => b,
        (Value::Object(mut am), Value::Object(bm)) => {
            for (k, bv) in bm {
                let merged = match am.remove(&k) {
                    Some(av) => merge_tabular(av, bv),
                    None => bv,
                };
                am.insert(k, merged);
            }
            Value::Object(am)
        }
        (Value::Array(mut aa), Value::Array(ba)) => {
            aa.extend(ba);
            Value::Array(aa)
        }
        (_, b) => b,
    }
}

/// Paint the buffer for the editor's highlighter, honoring `no_color`
/// (§4.4). Kept as a free function so it can be unit tested without a full
/// `ShellLoop`.
pub fn paint_for_display(buffer: &str, no_color: bool) -> String {
    painter::paint(buffer, no_color)
}
