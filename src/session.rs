//! Process-lifetime shell session state.
//!
//! `Session` replaces the module-scoped globals (current namespace, current
//! format, assorted toggles) that a straightforward port of this kind of tool
//! tends to reach for. Meta-commands mutate fields directly; everything else
//! treats it as read-only context.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn toggle(self) -> Self {
        match self {
            OutputFormat::Json => OutputFormat::Yaml,
            OutputFormat::Yaml => OutputFormat::Json,
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Json
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub print_exec_time: bool,
    pub raw_output: bool,
    pub graph_output_enabled: bool,
    pub graph_layout_lr: bool,
    pub multiline_enabled: bool,
    pub no_color: bool,
    pub debug: bool,
}

/// Singleton-per-process shell session. Owned by `ShellLoop` and threaded
/// through the completer, painter and output formatter.
#[derive(Debug, Clone)]
pub struct Session {
    pub context_name: String,
    pub namespace: String,
    pub output_format: OutputFormat,
    pub flags: Flags,
}

impl Session {
    pub fn new(context_name: String, namespace: String) -> Self {
        Self {
            context_name,
            namespace,
            output_format: OutputFormat::default(),
            flags: Flags::default(),
        }
    }

    /// `namespace == ""` is the deliberate "all namespaces" state; it is not
    /// merely an empty string, it changes the prompt's visual state and the
    /// scope of the query sent to the backend.
    pub fn all_namespaces(&self) -> bool {
        self.namespace.is_empty()
    }

    pub fn set_namespace(&mut self, ns: &str) {
        if ns.eq_ignore_ascii_case("all") {
            self.namespace.clear();
        } else {
            self.namespace = ns.to_string();
        }
    }

    pub fn namespace_display(&self) -> &str {
        if self.all_namespaces() {
            "ALL NAMESPACES"
        } else {
            &self.namespace
        }
    }
}

/// ShellLoop scratch state (§3 `CommandLineState`): lives for the duration of
/// the interactive loop, reset between dispatches.
#[derive(Debug, Default)]
pub struct CommandLineState {
    pub accumulated_lines: Vec<String>,
    pub executing: bool,
    pub last_exec_duration: Option<std::time::Duration>,
}

impl CommandLineState {
    pub fn clear_buffer(&mut self) {
        self.accumulated_lines.clear();
    }

    pub fn is_buffering(&self) -> bool {
        !self.accumulated_lines.is_empty()
    }

    pub fn joined(&self) -> String {
        self.accumulated_lines.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_namespace_is_all_namespaces() {
        let s = Session::new("kind-test".into(), String::new());
        assert!(s.all_namespaces());
        assert_eq!(s.namespace_display(), "ALL NAMESPACES");
    }

    #[test]
    fn default_namespace_is_not_all_namespaces() {
        let s = Session::new("kind-test".into(), "default".into());
        assert!(!s.all_namespaces());
        assert_eq!(s.namespace_display(), "default");
    }

    #[test]
    fn set_namespace_all_clears_it() {
        let mut s = Session::new("ctx".into(), "default".into());
        s.set_namespace("all");
        assert!(s.all_namespaces());
        s.set_namespace("kube-system");
        assert_eq!(s.namespace, "kube-system");
    }

    #[test]
    fn command_line_state_buffers_lines() {
        let mut st = CommandLineState::default();
        assert!(!st.is_buffering());
        st.accumulated_lines.push("MATCH (p:Pod)".into());
        assert!(st.is_buffering());
        st.accumulated_lines.push("RETURN p".into());
        assert_eq!(st.joined(), "MATCH (p:Pod) RETURN p");
        st.clear_buffer();
        assert!(!st.is_buffering());
    }
}
