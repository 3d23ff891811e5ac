//! External file registry: maps an execution's stdout/stderr to the paths
//! the File Sink Subscriber wrote them to, so the Pipeline Reader can find
//! them by `(execution_id, kind)` without depending on the sink directly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use shelld_core::ids::ExecutionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Stdout,
    Stderr,
}

pub trait FileRegistry: Send + Sync {
    fn register(&self, execution_id: &ExecutionId, kind: OutputKind, path: PathBuf);
    fn lookup(&self, execution_id: &ExecutionId, kind: OutputKind) -> Option<PathBuf>;
    fn forget(&self, execution_id: &ExecutionId);
}

#[derive(Default)]
pub struct InMemoryFileRegistry {
    entries: RwLock<HashMap<(ExecutionId, OutputKind), PathBuf>>,
}

impl InMemoryFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileRegistry for InMemoryFileRegistry {
    fn register(&self, execution_id: &ExecutionId, kind: OutputKind, path: PathBuf) {
        self.entries
            .write()
            .unwrap()
            .insert((execution_id.clone(), kind), path);
    }

    fn lookup(&self, execution_id: &ExecutionId, kind: OutputKind) -> Option<PathBuf> {
        self.entries
            .read()
            .unwrap()
            .get(&(execution_id.clone(), kind))
            .cloned()
    }

    fn forget(&self, execution_id: &ExecutionId) {
        self.entries
            .write()
            .unwrap()
            .retain(|(id, _), _| id != execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_round_trips() {
        let registry = InMemoryFileRegistry::new();
        let id = ExecutionId::generate();
        registry.register(&id, OutputKind::Stdout, PathBuf::from("/tmp/x-stdout.txt"));
        assert_eq!(
            registry.lookup(&id, OutputKind::Stdout),
            Some(PathBuf::from("/tmp/x-stdout.txt"))
        );
        assert_eq!(registry.lookup(&id, OutputKind::Stderr), None);
    }

    #[test]
    fn forget_clears_both_kinds() {
        let registry = InMemoryFileRegistry::new();
        let id = ExecutionId::generate();
        registry.register(&id, OutputKind::Stdout, PathBuf::from("/tmp/a"));
        registry.register(&id, OutputKind::Stderr, PathBuf::from("/tmp/b"));
        registry.forget(&id);
        assert_eq!(registry.lookup(&id, OutputKind::Stdout), None);
        assert_eq!(registry.lookup(&id, OutputKind::Stderr), None);
    }
}
