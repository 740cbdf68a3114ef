//! Typed expression nodes.
//!
//! [`Expr`] is an immutable, `Arc`-shared value node. All constructors go
//! through [`Expr::binary`]/[`Expr::unary`], which fold constants and keep
//! additive offsets in the canonical `x + c` form so that pipeline cursors
//! such as `k_idx + 32` compare and print predictably.

use std::hash::{Hash, Hasher};
use std::ops;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tessel_dtype::DType;

use crate::types::{BinaryOp, ConstValue, UnaryOp};

static VAR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// Variables
// ============================================================================

/// Named, typed variable.
///
/// Identity is the `id`: two variables sharing a name (e.g. the `A_blk` of the
/// main and of the short reduction loop) are distinct.
#[derive(Debug, Clone)]
pub struct Var {
    id: u64,
    name: Arc<str>,
    dtype: DType,
    mutable: bool,
}

impl Var {
    pub fn new(name: impl Into<Arc<str>>, dtype: DType) -> Self {
        Self { id: VAR_ID_COUNTER.fetch_add(1, Ordering::Relaxed), name: name.into(), dtype, mutable: false }
    }

    pub fn new_mut(name: impl Into<Arc<str>>, dtype: DType) -> Self {
        Self { mutable: true, ..Self::new(name, dtype) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn expr(&self) -> Expr {
        Expr::var(self)
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// Expression nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Var(Var),
    Const(ConstValue),
    Unary(UnaryOp, Expr),
    Binary(BinaryOp, Expr, Expr),
    Select(Expr, Expr, Expr),
    /// Byte-addressed element access into a buffer or register region.
    Index { buf: Expr, offset: Expr },
    /// Named operation with opaque semantics.
    Call { name: Arc<str>, args: SmallVec<[Expr; 4]> },
    Cast(Expr),
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ExprNode {
    kind: ExprKind,
    dtype: DType,
}

/// Immutable typed expression. Cloning is a reference-count bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
    fn make(kind: ExprKind, dtype: DType) -> Self {
        Self(Arc::new(ExprNode { kind, dtype }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn dtype(&self) -> &DType {
        &self.0.dtype
    }

    // =========================================================================
    // Leaf constructors
    // =========================================================================

    pub fn var(var: &Var) -> Self {
        Self::make(ExprKind::Var(var.clone()), var.dtype().clone())
    }

    pub fn constant(value: ConstValue, dtype: DType) -> Self {
        let value = value.cast(&dtype).unwrap_or(value);
        Self::make(ExprKind::Const(value), dtype)
    }

    /// Integer literal, `s32` unless the surrounding operation picks another type.
    pub fn int(value: i64) -> Self {
        Self::constant(ConstValue::Int(value), DType::S32)
    }

    pub fn int_typed(value: i64, dtype: DType) -> Self {
        Self::constant(ConstValue::Int(value), dtype)
    }

    pub fn bool(value: bool) -> Self {
        Self::make(ExprKind::Const(ConstValue::Bool(value)), DType::Bool)
    }

    pub fn float(value: f64, dtype: DType) -> Self {
        Self::make(ExprKind::Const(ConstValue::Float(value)), dtype)
    }

    pub fn call(name: impl Into<Arc<str>>, args: impl IntoIterator<Item = Expr>, dtype: DType) -> Self {
        Self::make(ExprKind::Call { name: name.into(), args: args.into_iter().collect() }, dtype)
    }

    pub fn cast(&self, dtype: DType) -> Self {
        if *self.dtype() == dtype {
            return self.clone();
        }
        if let Some(c) = self.as_const()
            && let Some(v) = c.cast(&dtype)
        {
            return Self::make(ExprKind::Const(v), dtype);
        }
        Self::make(ExprKind::Cast(self.clone()), dtype)
    }

    /// Element access at a byte offset. The result has the buffer's element type.
    pub fn index(&self, offset: impl Into<Expr>) -> Self {
        let offset = offset.into();
        // buf[a][b] -> buf[a + b]
        if let ExprKind::Index { buf, offset: inner } = self.kind() {
            return buf.index(inner + &offset);
        }
        let dtype = DType::Scalar(self.dtype().base());
        Self::make(ExprKind::Index { buf: self.clone(), offset }, dtype)
    }

    /// Buffer and byte offset of an `Index`; any other expression is its own
    /// buffer at offset zero.
    pub fn split_index(&self) -> (Expr, Expr) {
        match self.kind() {
            ExprKind::Index { buf, offset } => (buf.clone(), offset.clone()),
            _ => (self.clone(), Self::int(0)),
        }
    }

    pub fn select(cond: Expr, a: Expr, b: Expr) -> Self {
        if let Some(c) = cond.as_bool() {
            return if c { a } else { b };
        }
        let dtype = a.dtype().clone();
        Self::make(ExprKind::Select(cond, a, b), dtype)
    }

    // =========================================================================
    // Folding constructors
    // =========================================================================

    pub fn unary(op: UnaryOp, a: Expr) -> Self {
        match (op, a.kind()) {
            (UnaryOp::Neg, ExprKind::Const(ConstValue::Int(v))) => Self::int_typed(v.wrapping_neg(), a.dtype().clone()),
            (UnaryOp::Neg, ExprKind::Const(ConstValue::Float(v))) => Self::float(-v, a.dtype().clone()),
            (UnaryOp::Not, ExprKind::Const(ConstValue::Bool(v))) => Self::bool(!v),
            (UnaryOp::Not, ExprKind::Unary(UnaryOp::Not, inner)) => inner.clone(),
            (UnaryOp::Not, ExprKind::Binary(op, x, y)) if op.is_comparison() => {
                let negated = match op {
                    BinaryOp::Lt => BinaryOp::Ge,
                    BinaryOp::Le => BinaryOp::Gt,
                    BinaryOp::Gt => BinaryOp::Le,
                    BinaryOp::Ge => BinaryOp::Lt,
                    BinaryOp::Eq => BinaryOp::Ne,
                    _ => BinaryOp::Eq,
                };
                Self::binary(negated, x.clone(), y.clone())
            }
            _ => {
                let dtype = a.dtype().clone();
                Self::make(ExprKind::Unary(op, a), dtype)
            }
        }
    }

    pub fn binary(op: BinaryOp, a: Expr, b: Expr) -> Self {
        let (a, b) = unify(a, b);

        if let (Some(x), Some(y)) = (a.as_const(), b.as_const())
            && let Some(folded) = fold_const(op, x, y, a.dtype())
        {
            return folded;
        }

        // Constants go to the right-hand side.
        if a.is_const() && !b.is_const() && (op.is_commutative() || op.is_comparison()) {
            return Self::binary(op.swapped(), b, a);
        }

        if let Some(c) = b.as_int() {
            match op {
                BinaryOp::Sub if a.dtype().is_int() => return Self::binary(BinaryOp::Add, a, Self::int(-c)),
                BinaryOp::Add | BinaryOp::Sub if c == 0 => return a,
                BinaryOp::Mul | BinaryOp::Div if c == 1 && a.dtype().is_int() => return a,
                BinaryOp::Mul if c == 0 && a.dtype().is_int() => return Self::int_typed(0, a.dtype().clone()),
                BinaryOp::Mod if c == 1 && a.dtype().is_int() => return Self::int_typed(0, a.dtype().clone()),
                _ => {}
            }
            // (x + c1) + c2 -> x + (c1 + c2), same for products
            if let ExprKind::Binary(inner, x, c1) = a.kind()
                && *inner == op
                && matches!(op, BinaryOp::Add | BinaryOp::Mul)
                && let Some(c1) = c1.as_int()
            {
                let c = if op == BinaryOp::Add { c1.wrapping_add(c) } else { c1.wrapping_mul(c) };
                return Self::binary(op, x.clone(), Self::int(c));
            }
        }

        match (op, a.as_bool(), b.as_bool()) {
            (BinaryOp::And, Some(true), _) => return b,
            (BinaryOp::And, _, Some(true)) => return a,
            (BinaryOp::And, Some(false), _) | (BinaryOp::And, _, Some(false)) => return Self::bool(false),
            (BinaryOp::Or, Some(false), _) => return b,
            (BinaryOp::Or, _, Some(false)) => return a,
            (BinaryOp::Or, Some(true), _) | (BinaryOp::Or, _, Some(true)) => return Self::bool(true),
            _ => {}
        }

        let dtype = if op.is_comparison() || op.is_logical() { DType::Bool } else { a.dtype().clone() };
        Self::make(ExprKind::Binary(op, a, b), dtype)
    }

    // =========================================================================
    // Comparisons (the std comparison traits return plain bools)
    // =========================================================================

    pub fn lt(&self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Lt, self.clone(), other.into())
    }

    pub fn le(&self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Le, self.clone(), other.into())
    }

    pub fn gt(&self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Gt, self.clone(), other.into())
    }

    pub fn ge(&self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Ge, self.clone(), other.into())
    }

    pub fn eq_(&self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Eq, self.clone(), other.into())
    }

    pub fn ne_(&self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Ne, self.clone(), other.into())
    }

    pub fn min(&self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Min, self.clone(), other.into())
    }

    pub fn max(&self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Max, self.clone(), other.into())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn is_const(&self) -> bool {
        matches!(self.kind(), ExprKind::Const(_))
    }

    pub fn as_const(&self) -> Option<ConstValue> {
        match self.kind() {
            ExprKind::Const(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            ExprKind::Const(ConstValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind() {
            ExprKind::Const(ConstValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self.kind() {
            ExprKind::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_const().is_some_and(|c| c.is_zero())
    }

    /// Split `x + c` into `(x, c)`; any other expression is `(self, 0)`.
    pub fn split_offset(&self) -> (Expr, i64) {
        if let ExprKind::Binary(BinaryOp::Add, x, c) = self.kind()
            && let Some(c) = c.as_int()
        {
            return (x.clone(), c);
        }
        match self.as_int() {
            Some(c) => (Self::int_typed(0, self.dtype().clone()), c),
            None => (self.clone(), 0),
        }
    }

    /// Direct operands of this node.
    pub fn children(&self) -> SmallVec<[&Expr; 3]> {
        match self.kind() {
            ExprKind::Var(_) | ExprKind::Const(_) => SmallVec::new(),
            ExprKind::Unary(_, a) | ExprKind::Cast(a) => smallvec::smallvec![a],
            ExprKind::Binary(_, a, b) => smallvec::smallvec![a, b],
            ExprKind::Index { buf, offset } => smallvec::smallvec![buf, offset],
            ExprKind::Select(c, a, b) => smallvec::smallvec![c, a, b],
            ExprKind::Call { args, .. } => args.iter().collect(),
        }
    }

    /// Rebuild this expression bottom-up, replacing nodes for which `f` returns
    /// a value. Rebuilt nodes go through the folding constructors again.
    pub fn rewrite(&self, f: &mut impl FnMut(&Expr) -> Option<Expr>) -> Expr {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        match self.kind() {
            ExprKind::Var(_) | ExprKind::Const(_) => self.clone(),
            ExprKind::Unary(op, a) => Self::unary(*op, a.rewrite(f)),
            ExprKind::Binary(op, a, b) => Self::binary(*op, a.rewrite(f), b.rewrite(f)),
            ExprKind::Select(c, a, b) => Self::select(c.rewrite(f), a.rewrite(f), b.rewrite(f)),
            ExprKind::Index { buf, offset } => {
                Self::make(ExprKind::Index { buf: buf.rewrite(f), offset: offset.rewrite(f) }, self.dtype().clone())
            }
            ExprKind::Call { name, args } => {
                Self::make(ExprKind::Call { name: name.clone(), args: args.iter().map(|a| a.rewrite(f)).collect() }, self.dtype().clone())
            }
            ExprKind::Cast(a) => a.rewrite(f).cast(self.dtype().clone()),
        }
    }

    /// Replace every reference to `var` with `value`.
    pub fn substitute(&self, var: &Var, value: &Expr) -> Expr {
        self.rewrite(&mut |e| match e.as_var() {
            Some(v) if v == var => Some(value.clone()),
            _ => None,
        })
    }
}

/// Bring both operands to a common type. Integer literals adopt the type of
/// the other side, otherwise floats win over integers and wider over narrower.
fn unify(a: Expr, b: Expr) -> (Expr, Expr) {
    if a.dtype() == b.dtype() || a.dtype().is_ptr() || b.dtype().is_ptr() {
        return (a, b);
    }
    if a.as_int().is_some() && !b.is_const() && !b.dtype().is_bool() {
        let dtype = b.dtype().clone();
        return (a.cast(dtype), b);
    }
    if b.as_int().is_some() && !a.dtype().is_bool() {
        let dtype = a.dtype().clone();
        return (a, b.cast(dtype));
    }
    let (da, db) = (a.dtype().clone(), b.dtype().clone());
    let target = match (da.is_float(), db.is_float()) {
        (true, false) => da,
        (false, true) => db,
        _ if db.bits() > da.bits() => db,
        _ => da,
    };
    (a.cast(target.clone()), b.cast(target))
}

fn fold_const(op: BinaryOp, x: ConstValue, y: ConstValue, dtype: &DType) -> Option<Expr> {
    use ConstValue::*;
    let cmp = |ord: std::cmp::Ordering| -> Option<Expr> {
        use std::cmp::Ordering::*;
        let r = match op {
            BinaryOp::Lt => ord == Less,
            BinaryOp::Le => ord != Greater,
            BinaryOp::Gt => ord == Greater,
            BinaryOp::Ge => ord != Less,
            BinaryOp::Eq => ord == Equal,
            BinaryOp::Ne => ord != Equal,
            _ => return None,
        };
        Some(Expr::bool(r))
    };
    match (x, y) {
        (Int(a), Int(b)) => {
            if op.is_comparison() {
                return cmp(a.cmp(&b));
            }
            let v = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div if b != 0 => a / b,
                BinaryOp::Mod if b != 0 => a % b,
                BinaryOp::Min => a.min(b),
                BinaryOp::Max => a.max(b),
                _ => return None,
            };
            Some(Expr::int_typed(v, dtype.clone()))
        }
        (Float(a), Float(b)) => {
            if op.is_comparison() {
                return cmp(a.partial_cmp(&b)?);
            }
            let v = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Min => a.min(b),
                BinaryOp::Max => a.max(b),
                _ => return None,
            };
            Some(Expr::float(v, dtype.clone()))
        }
        (Bool(a), Bool(b)) => {
            let v = match op {
                BinaryOp::And => a && b,
                BinaryOp::Or => a || b,
                BinaryOp::Eq => a == b,
                BinaryOp::Ne => a != b,
                _ => return None,
            };
            Some(Expr::bool(v))
        }
        _ => None,
    }
}

// ============================================================================
// Conversions and operator overloads
// ============================================================================

impl From<&Var> for Expr {
    fn from(var: &Var) -> Self {
        Expr::var(var)
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Self {
        e.clone()
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::int(v)
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::int(v as i64)
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::bool(v)
    }
}

macro_rules! impl_binary_ops {
    ($($trait:ident :: $method:ident => $op:expr),* $(,)?) => {$(
        impl ops::$trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl ops::$trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, self.clone(), rhs.clone())
            }
        }

        impl ops::$trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, self, rhs.clone())
            }
        }

        impl ops::$trait<i64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: i64) -> Expr {
                Expr::binary($op, self, Expr::int(rhs))
            }
        }

        impl ops::$trait<i64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: i64) -> Expr {
                Expr::binary($op, self.clone(), Expr::int(rhs))
            }
        }
    )*};
}

impl_binary_ops! {
    Add::add => BinaryOp::Add,
    Sub::sub => BinaryOp::Sub,
    Mul::mul => BinaryOp::Mul,
    Div::div => BinaryOp::Div,
    Rem::rem => BinaryOp::Mod,
    BitAnd::bitand => BinaryOp::And,
    BitOr::bitor => BinaryOp::Or,
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

impl ops::Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::unary(UnaryOp::Not, self)
    }
}

// ============================================================================
// Display
// ============================================================================

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            ExprKind::Var(v) => write!(f, "{v}"),
            ExprKind::Const(c) => write!(f, "{c}"),
            ExprKind::Unary(UnaryOp::Neg, a) => write!(f, "-{a}"),
            ExprKind::Unary(UnaryOp::Not, a) => write!(f, "!{a}"),
            ExprKind::Binary(op @ (BinaryOp::Min | BinaryOp::Max), a, b) => write!(f, "{}({a}, {b})", op.symbol()),
            ExprKind::Binary(op, a, b) => write!(f, "({a} {} {b})", op.symbol()),
            ExprKind::Select(c, a, b) => write!(f, "({c} ? {a} : {b})"),
            ExprKind::Index { buf, offset } => write!(f, "{buf}[{offset}]"),
            ExprKind::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            ExprKind::Cast(a) => write!(f, "{}({a})", self.dtype()),
        }
    }
}
