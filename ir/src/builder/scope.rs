//! Scope arena and the backward fold that nests declarations.
//!
//! Statements are appended to one flat list, each tagged with the id of the
//! scope that was innermost when it was emitted. Scopes nest strictly, so the
//! records of the innermost scope are always a suffix of the arena.

use crate::stmt::Stmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

#[derive(Debug, Clone)]
struct Record {
    scope: ScopeId,
    stmt: Stmt,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeArena {
    records: Vec<Record>,
    stack: Vec<ScopeId>,
    next_id: u32,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current(&self) -> Option<ScopeId> {
        self.stack.last().copied()
    }

    pub fn open(&mut self) -> ScopeId {
        let id = ScopeId(self.next_id);
        self.next_id += 1;
        self.stack.push(id);
        id
    }

    /// Record `stmt` in the innermost scope. Returns `false` when no scope is open.
    pub fn push(&mut self, stmt: Stmt) -> bool {
        let Some(scope) = self.current() else { return false };
        self.records.push(Record { scope, stmt });
        true
    }

    /// Close the innermost scope and fold its statements.
    pub fn close(&mut self) -> Option<Stmt> {
        let scope = self.stack.pop()?;
        let start = self.suffix_start(scope);
        let stmts = self.records.drain(start..).map(|r| r.stmt);
        Some(fold(stmts.collect()))
    }

    /// Folded view of every open scope, outermost first, without closing them.
    pub fn snapshot(&self) -> Vec<Stmt> {
        self.stack
            .iter()
            .map(|&scope| {
                let stmts = self.records.iter().filter(|r| r.scope == scope).map(|r| r.stmt.clone()).collect();
                fold(stmts)
            })
            .collect()
    }

    fn suffix_start(&self, scope: ScopeId) -> usize {
        let start = self.records.iter().rposition(|r| r.scope != scope).map_or(0, |i| i + 1);
        debug_assert!(self.records[..start].iter().all(|r| r.scope != scope), "scope records are not contiguous");
        start
    }
}

/// Fold a flat statement list into a nested tree.
///
/// Scanning backwards, every open declaration takes all statements after it
/// (already folded) as its body. Leading statements form an outer sequence.
pub fn fold(stmts: Vec<Stmt>) -> Stmt {
    let mut tail: Vec<Stmt> = Vec::with_capacity(stmts.len());
    for s in stmts.into_iter().rev() {
        if s.is_open_decl() {
            let body = Stmt::seq(tail.drain(..).rev());
            tail.push(s.with_body(body));
        } else {
            tail.push(s);
        }
    }
    Stmt::seq(tail.into_iter().rev())
}
