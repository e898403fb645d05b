use std::sync::{Arc, Mutex};

/// A filter in the per-record log chain. The host scheduler lets plugins
/// decorate every line written to an execution record's log; the one-shot
/// agent routes its bootstrap output through the same chain so decorated
/// launch logs look like any other build output.
pub trait LogFilter: Send + Sync {
    fn decorate(&self, line: &str) -> String;
}

/// The log sink of a single execution record.
///
/// Cloning is cheap and shares the underlying buffer, so the node, its
/// surface, and the launcher can all append to the same record log.
#[derive(Clone, Default)]
pub struct TaskLog {
    buf: Arc<Mutex<String>>,
    filters: Arc<Vec<Box<dyn LogFilter>>>,
}

impl TaskLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(filters: Vec<Box<dyn LogFilter>>) -> Self {
        Self {
            buf: Arc::new(Mutex::new(String::new())),
            filters: Arc::new(filters),
        }
    }

    pub fn write_line(&self, line: &str) {
        let mut decorated = line.to_string();
        for filter in self.filters.iter() {
            decorated = filter.decorate(&decorated);
        }
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        buf.push_str(&decorated);
        buf.push('\n');
    }

    pub fn contents(&self) -> String {
        self.buf.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl std::fmt::Debug for TaskLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLog")
            .field("filters", &self.filters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Prefix(&'static str);

    impl LogFilter for Prefix {
        fn decorate(&self, line: &str) -> String {
            format!("{}{}", self.0, line)
        }
    }

    #[test]
    fn writes_are_shared_between_clones() {
        let log = TaskLog::new();
        let clone = log.clone();
        log.write_line("from original");
        clone.write_line("from clone");
        assert_eq!(log.contents(), "from original\nfrom clone\n");
    }

    #[test]
    fn filters_apply_in_order() {
        let log = TaskLog::with_filters(vec![Box::new(Prefix("a:")), Box::new(Prefix("b:"))]);
        log.write_line("msg");
        assert_eq!(log.contents(), "b:a:msg\n");
    }
}
