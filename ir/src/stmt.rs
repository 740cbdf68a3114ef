//! Statement nodes.
//!
//! A kernel body is a single [`Stmt`] tree. Declarations (`Let`, `Alloc`) own
//! the subtree in which their variable is visible; the builder produces them
//! with `body: None` and the scope fold fills the body in.

use tessel_dtype::DType;

use crate::expr::{Expr, Var};
use crate::types::{AllocKind, CacheHint, SendOp};

/// Geometry of a 2D block transfer.
///
/// Surface dimensions are runtime values (elements for width/height, elements
/// for pitch); the block itself is static.
#[derive(Debug, Clone, PartialEq)]
pub struct Block2d {
    pub surface_width: Expr,
    pub surface_height: Expr,
    pub surface_pitch: Expr,
    pub width: i64,
    pub height: i64,
    /// Number of adjacent blocks fetched by one message.
    pub count: i64,
    pub vnni: bool,
    pub transpose: bool,
    /// Out-of-bounds elements read as zero.
    pub zero_out: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendShape {
    /// Linear transfer of `owords` 16-byte units.
    Block { owords: u32 },
    Block2d(Block2d),
}

impl SendShape {
    pub fn is_2d(&self) -> bool {
        matches!(self, Self::Block2d(_))
    }
}

/// Memory transfer between a global buffer and registers.
#[derive(Debug, Clone, PartialEq)]
pub struct SendStmt {
    pub op: SendOp,
    pub shape: SendShape,
    pub dtype: DType,
    pub mem_buf: Expr,
    /// Byte offset for block transfers, base offset for 2D transfers.
    pub mem_off: Expr,
    /// Register region; absent for prefetches.
    pub reg: Option<Expr>,
    /// Block x/y coordinates (2D transfers only).
    pub coords: Option<(Expr, Expr)>,
    pub cache: CacheHint,
}

impl SendStmt {
    /// Bytes moved by one message.
    pub fn payload_bytes(&self) -> i64 {
        match &self.shape {
            SendShape::Block { owords } => *owords as i64 * 16,
            SendShape::Block2d(b) => b.width * b.height * b.count * self.dtype.bytes() as i64,
        }
    }
}

/// Systolic multiply-accumulate: `dst = acc + a * b` over a fixed
/// `simd x sdepth x rcount` shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DpasStmt {
    pub simd: u8,
    pub sdepth: u8,
    pub rcount: u8,
    pub c_type: DType,
    pub a_type: DType,
    pub b_type: DType,
    pub dst: Expr,
    pub acc: Expr,
    pub a: Expr,
    pub b: Expr,
}

/// Generic fused multiply-add over `simd` lanes. A zero stride broadcasts
/// the operand.
#[derive(Debug, Clone, PartialEq)]
pub struct MadStmt {
    pub simd: u32,
    pub c_type: DType,
    pub a_type: DType,
    pub a_stride: i64,
    pub b_type: DType,
    pub b_stride: i64,
    pub dst: Expr,
    pub acc: Expr,
    pub a: Expr,
    pub b: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Binding visible in `body`. A missing value is supplied externally
    /// (kernel argument or hardware builtin).
    Let { var: Var, value: Option<Expr>, body: Option<Box<Stmt>> },
    /// Buffer visible in `body`. `size` is in bytes, zero for buffers owned by
    /// the caller.
    Alloc { buf: Var, size: i64, kind: AllocKind, body: Option<Box<Stmt>> },
    Assign { var: Var, value: Expr },
    Store { buf: Expr, offset: Expr, value: Expr },
    Seq(Vec<Stmt>),
    If { cond: Expr, then_body: Box<Stmt>, else_body: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    Send(SendStmt),
    Dpas(DpasStmt),
    Mad(MadStmt),
    ZeroOut { buf: Var, size: i64 },
    Barrier,
    /// Instruction group that later passes must keep contiguous.
    Chain(Vec<Stmt>),
}

impl Default for Stmt {
    fn default() -> Self {
        Self::empty()
    }
}

impl Stmt {
    pub fn empty() -> Self {
        Self::Seq(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Seq(v) if v.is_empty())
    }

    /// Sequence constructor: flattens nested sequences, drops empty ones and
    /// unwraps a single remaining statement.
    pub fn seq(stmts: impl IntoIterator<Item = Stmt>) -> Self {
        let mut flat = Vec::new();
        for s in stmts {
            match s {
                Self::Seq(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.pop().unwrap_or_default();
        }
        Self::Seq(flat)
    }

    pub fn let_(var: Var, value: Option<Expr>) -> Self {
        Self::Let { var, value, body: None }
    }

    pub fn alloc(buf: Var, size: i64, kind: AllocKind) -> Self {
        Self::Alloc { buf, size, kind, body: None }
    }

    pub fn if_then(cond: Expr, then_body: Stmt, else_body: Option<Stmt>) -> Self {
        Self::If { cond, then_body: Box::new(then_body), else_body: else_body.map(Box::new) }
    }

    pub fn while_loop(cond: Expr, body: Stmt) -> Self {
        Self::While { cond, body: Box::new(body) }
    }

    /// Declaration whose body has not been assigned yet.
    pub fn is_open_decl(&self) -> bool {
        matches!(self, Self::Let { body: None, .. } | Self::Alloc { body: None, .. })
    }

    /// Attach `body` to an open declaration. Any other statement is returned
    /// unchanged.
    pub fn with_body(self, body: Stmt) -> Self {
        match self {
            Self::Let { var, value, body: None } => Self::Let { var, value, body: Some(Box::new(body)) },
            Self::Alloc { buf, size, kind, body: None } => Self::Alloc { buf, size, kind, body: Some(Box::new(body)) },
            other => other,
        }
    }

    /// Variable bound by this statement, if any.
    pub fn bound_var(&self) -> Option<&Var> {
        match self {
            Self::Let { var, .. } => Some(var),
            Self::Alloc { buf, .. } => Some(buf),
            _ => None,
        }
    }

    /// Child statements in program order.
    pub fn children(&self) -> Vec<&Stmt> {
        match self {
            Self::Let { body, .. } | Self::Alloc { body, .. } => body.iter().map(|b| b.as_ref()).collect(),
            Self::Seq(v) | Self::Chain(v) => v.iter().collect(),
            Self::If { then_body, else_body, .. } => {
                std::iter::once(then_body.as_ref()).chain(else_body.as_deref()).collect()
            }
            Self::While { body, .. } => vec![body.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Expressions read directly by this statement (not by its children).
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Self::Let { value, .. } => value.iter().collect(),
            Self::Assign { value, .. } => vec![value],
            Self::Store { buf, offset, value } => vec![buf, offset, value],
            Self::If { cond, .. } | Self::While { cond, .. } => vec![cond],
            Self::Send(s) => {
                let mut out = vec![&s.mem_buf, &s.mem_off];
                out.extend(s.reg.iter());
                if let Some((x, y)) = &s.coords {
                    out.extend([x, y]);
                }
                if let SendShape::Block2d(b) = &s.shape {
                    out.extend([&b.surface_width, &b.surface_height, &b.surface_pitch]);
                }
                out
            }
            Self::Dpas(d) => vec![&d.dst, &d.acc, &d.a, &d.b],
            Self::Mad(m) => vec![&m.dst, &m.acc, &m.a, &m.b],
            _ => Vec::new(),
        }
    }

    /// Render as an indented tree.
    pub fn tree(&self) -> String {
        crate::tree::render_stmt_tree(self)
    }
}

impl From<SendStmt> for Stmt {
    fn from(s: SendStmt) -> Self {
        Self::Send(s)
    }
}

impl From<DpasStmt> for Stmt {
    fn from(s: DpasStmt) -> Self {
        Self::Dpas(s)
    }
}

impl From<MadStmt> for Stmt {
    fn from(s: MadStmt) -> Self {
        Self::Mad(s)
    }
}

impl std::fmt::Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.tree())
    }
}
