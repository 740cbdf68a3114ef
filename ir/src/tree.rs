//! Tree visualization for statement trees.

use std::borrow::Cow;
use std::io;

use ptree::{Style, TreeItem};

use crate::stmt::{SendShape, Stmt};

#[derive(Clone)]
pub struct StmtTree<'a> {
    stmt: &'a Stmt,
}

impl<'a> StmtTree<'a> {
    pub fn new(stmt: &'a Stmt) -> Self {
        Self { stmt }
    }
}

impl TreeItem for StmtTree<'_> {
    type Child = Self;

    fn write_self<W: io::Write>(&self, f: &mut W, _style: &Style) -> io::Result<()> {
        write!(f, "{}", format_node(self.stmt))
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        let children: Vec<_> = self.stmt.children().into_iter().map(StmtTree::new).collect();
        Cow::Owned(children)
    }
}

/// One-line rendering of a statement without its children.
pub fn format_node(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Let { var, value: Some(v), .. } => format!("let {var}: {} = {v}", var.dtype()),
        Stmt::Let { var, value: None, .. } => format!("let {var}: {} (external)", var.dtype()),
        Stmt::Alloc { buf, size, kind, .. } => format!("alloc {buf}: {} [{size} bytes, {kind}]", buf.dtype()),
        Stmt::Assign { var, value } => format!("{var} = {value}"),
        Stmt::Store { buf, offset, value } => format!("store {buf}[{offset}] = {value}"),
        Stmt::Seq(v) => format!("seq ({})", v.len()),
        Stmt::If { cond, else_body: Some(_), .. } => format!("if {cond} (then, else)"),
        Stmt::If { cond, .. } => format!("if {cond}"),
        Stmt::While { cond, .. } => format!("while {cond}"),
        Stmt::Send(s) => {
            let reg = s.reg.as_ref().map(|r| format!(" -> {r}")).unwrap_or_default();
            match &s.shape {
                SendShape::Block { owords } => {
                    format!("{}.block(ow={owords}) {}[{}]{reg} {}", s.op, s.mem_buf, s.mem_off, s.dtype)
                }
                SendShape::Block2d(b) => {
                    let (x, y) = s.coords.as_ref().map(|(x, y)| (x.to_string(), y.to_string())).unwrap_or_default();
                    format!(
                        "{}.2d({}x{}x{}{}{}) {}[{}] @({x}, {y}){reg} {}",
                        s.op,
                        b.width,
                        b.height,
                        b.count,
                        if b.vnni { ",vnni" } else { "" },
                        if b.transpose { ",transpose" } else { "" },
                        s.mem_buf,
                        s.mem_off,
                        s.dtype
                    )
                }
            }
        }
        Stmt::Dpas(d) => format!(
            "dpas.{}x{}x{} {} = {} + {} * {} ({} <- {} x {})",
            d.simd, d.sdepth, d.rcount, d.dst, d.acc, d.a, d.b, d.c_type, d.a_type, d.b_type
        ),
        Stmt::Mad(m) => format!("mad.{} {} = {} + {} * {} ({})", m.simd, m.dst, m.acc, m.a, m.b, m.c_type),
        Stmt::ZeroOut { buf, size } => format!("zero_out {buf} [{size} bytes]"),
        Stmt::Barrier => "barrier".to_string(),
        Stmt::Chain(v) => format!("chain ({})", v.len()),
    }
}

/// Render a statement as an ASCII tree string.
pub fn render_stmt_tree(stmt: &Stmt) -> String {
    let tree = StmtTree::new(stmt);
    let mut buf = Vec::new();
    ptree::write_tree(&tree, &mut buf).expect("tree rendering failed");
    String::from_utf8(buf).expect("invalid utf8 in tree")
}
