//! Procedural kernel construction.
//!
//! [`Builder`] lets strategy code emit statements one after another while it
//! keeps track of nesting: every `Let`/`Alloc` scopes over whatever is emitted
//! after it in the same scope, and `if_`/`while_` bodies are built in their own
//! scopes from caller closures.
//!
//! ```ignore
//! let mut b = Builder::new();
//! b.declare_kernel(iface, exec, ConstraintSet::new())?;
//! let k = b.arg("k")?;
//! let acc = b.def(DType::S32, "acc", Some(Expr::int(0)), false)?;
//! b.if_(k.gt(0), |b| b.assign(&acc, acc.expr() + 1))?;
//! let kernel = b.end_kernel()?;
//! ```

pub mod scope;

use snafu::{OptionExt, ensure};
use tessel_dtype::DType;

use crate::constraint::ConstraintSet;
use crate::error::*;
use crate::expr::{Expr, Var};
use crate::kernel::{ExecConfig, KernelIface};
use crate::layout::{Layout, Tensor};
use crate::stmt::Stmt;
use crate::tree::format_node;
use crate::types::AllocKind;
use crate::validate::check_scopes;

pub use scope::{ScopeArena, ScopeId, fold};

/// Hardware-provided thread coordinates, one per axis.
#[derive(Debug, Clone)]
pub struct Builtins {
    pub group_ids: [Expr; 3],
    pub local_ids: [Expr; 3],
    pub local_sizes: [Expr; 3],
}

#[derive(Debug, Default)]
pub struct Builder {
    scopes: ScopeArena,
    iface: KernelIface,
    exec: Option<ExecConfig>,
    cset: ConstraintSet,
    builtins: Option<Builtins>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Kernel lifecycle
    // =========================================================================

    /// Open the kernel scope and bind arguments and hardware builtins.
    #[tracing::instrument(skip_all, fields(nargs = iface.nargs()))]
    pub fn declare_kernel(&mut self, iface: KernelIface, exec: ExecConfig, cset: ConstraintSet) -> Result<()> {
        ensure!(self.scopes.depth() == 0, KernelAlreadyOpenSnafu { depth: self.scopes.depth() });

        self.scopes.open();
        for arg in iface.args() {
            let stmt = match arg.dtype().addrspace() {
                Some(addrspace) => {
                    let kind = match addrspace {
                        tessel_dtype::AddrSpace::Slm => AllocKind::Slm,
                        tessel_dtype::AddrSpace::Global => AllocKind::Global,
                    };
                    Stmt::alloc(arg.clone(), 0, kind)
                }
                None => Stmt::let_(arg.clone(), None),
            };
            self.append(stmt)?;
        }
        self.iface = iface;
        self.exec = Some(exec);
        self.cset = cset;

        let mut builtins = Builtins {
            group_ids: std::array::from_fn(|_| Expr::int(0)),
            local_ids: std::array::from_fn(|_| Expr::int(0)),
            local_sizes: std::array::from_fn(|_| Expr::int(0)),
        };
        for i in 0..3 {
            builtins.group_ids[i] = self.let_typed(DType::U32, &format!("tg_idx{i}"), None)?.expr();
            builtins.local_ids[i] = self.let_typed(DType::U16, &format!("local_id{i}"), None)?.expr();
            builtins.local_sizes[i] = self.let_typed(DType::U16, &format!("local_size{i}"), None)?.expr();
        }
        self.builtins = Some(builtins);

        tracing::debug!(exec = ?exec, "kernel declared");
        Ok(())
    }

    /// Close the kernel scope and return the kernel body.
    ///
    /// Fails if any scope other than the kernel scope is still open, or if the
    /// folded tree references a variable outside of its binding.
    pub fn end_kernel(&mut self) -> Result<Stmt> {
        let depth = self.scopes.depth();
        ensure!(depth == 1, ScopeImbalanceSnafu { depth });

        let stmt = self.pop_scope()?;
        self.builtins = None;
        check_scopes(&stmt)?;
        tracing::debug!(constraints = self.cset.len(), "kernel finalized");
        Ok(stmt)
    }

    pub fn depth(&self) -> usize {
        self.scopes.depth()
    }

    pub fn iface(&self) -> &KernelIface {
        &self.iface
    }

    pub fn exec(&self) -> Option<&ExecConfig> {
        self.exec.as_ref()
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.cset
    }

    pub fn into_constraints(self) -> ConstraintSet {
        self.cset
    }

    /// Folded view of every open scope, outermost first.
    pub fn pending(&self) -> Vec<Stmt> {
        self.scopes.snapshot()
    }

    // =========================================================================
    // Builtins and arguments
    // =========================================================================

    fn builtins(&self) -> Result<&Builtins> {
        self.builtins.as_ref().context(NoOpenScopeSnafu { what: "hardware builtins" })
    }

    pub fn group_ids(&self) -> Result<[Expr; 3]> {
        Ok(self.builtins()?.group_ids.clone())
    }

    pub fn local_ids(&self) -> Result<[Expr; 3]> {
        Ok(self.builtins()?.local_ids.clone())
    }

    pub fn local_sizes(&self) -> Result<[Expr; 3]> {
        Ok(self.builtins()?.local_sizes.clone())
    }

    /// Kernel argument by name, or its value if the constraints pin it.
    pub fn arg(&self, name: &str) -> Result<Expr> {
        let var = self.iface.find_arg(name).context(UnknownArgumentSnafu { name })?;
        Ok(self.cset.single_value(var).unwrap_or_else(|| var.expr()))
    }

    pub fn assume(&mut self, expr: Expr) {
        self.cset.add(expr);
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Mutable variable. Pointers and `force_alloc` declarations get register
    /// storage, optionally zero-filled; anything else is a `Let`.
    pub fn def(&mut self, dtype: DType, name: &str, init: Option<Expr>, force_alloc: bool) -> Result<Var> {
        let dtype = dtype.with_mut();
        let var = Var::new_mut(name, dtype.clone());
        if force_alloc || dtype.is_ptr() {
            let size = dtype.bytes() as i64;
            self.append(Stmt::alloc(var.clone(), size, AllocKind::Grf))?;
            if let Some(init) = init {
                ensure!(init.is_zero(), NonZeroAllocInitSnafu { name, init: init.to_string() });
                self.append(Stmt::ZeroOut { buf: var.clone(), size })?;
            }
        } else {
            self.append(Stmt::let_(var.clone(), init))?;
        }
        Ok(var)
    }

    /// Register buffer holding a whole layout.
    pub fn def_tensor(&mut self, layout: Layout, name: &str, init: Option<Expr>) -> Result<Tensor> {
        let count = layout.elems().max(1) as usize;
        let dtype = DType::Scalar(layout.dtype().base()).vec(count);
        let var = self.def(dtype, name, init, true)?;
        Ok(Tensor::new(var.expr(), layout))
    }

    /// Shared-local-memory buffer of `size` bytes.
    pub fn def_slm(&mut self, dtype: DType, name: &str, size: i64) -> Result<Var> {
        let var = Var::new_mut(name, dtype.ptr(tessel_dtype::AddrSpace::Slm).with_mut());
        self.append(Stmt::alloc(var.clone(), size, AllocKind::Slm))?;
        Ok(var)
    }

    pub fn let_(&mut self, name: &str, value: Expr) -> Result<Var> {
        let dtype = value.dtype().clone();
        self.let_typed(dtype, name, Some(value))
    }

    /// Immutable binding. A missing value is supplied externally.
    pub fn let_typed(&mut self, dtype: DType, name: &str, value: Option<Expr>) -> Result<Var> {
        let var = Var::new(name, dtype);
        self.append(Stmt::let_(var.clone(), value))?;
        Ok(var)
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    /// Build `then` in its own scope and emit `if cond { then }`.
    ///
    /// Bodies may fail with any error an IR error converts into, so pass code
    /// can thread its own error type through nested control flow.
    pub fn if_<E>(&mut self, cond: Expr, then: impl FnOnce(&mut Self) -> Result<(), E>) -> Result<(), E>
    where
        E: From<Error>,
    {
        check_condition(&cond)?;
        let then_body = self.scoped(then)?;
        Ok(self.append(Stmt::if_then(cond, then_body, None))?)
    }

    pub fn if_else<E>(
        &mut self,
        cond: Expr,
        then: impl FnOnce(&mut Self) -> Result<(), E>,
        otherwise: impl FnOnce(&mut Self) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<Error>,
    {
        check_condition(&cond)?;
        let then_body = self.scoped(then)?;
        let else_body = self.scoped(otherwise)?;
        Ok(self.append(Stmt::if_then(cond, then_body, Some(else_body)))?)
    }

    pub fn while_<E>(&mut self, cond: Expr, body: impl FnOnce(&mut Self) -> Result<(), E>) -> Result<(), E>
    where
        E: From<Error>,
    {
        check_condition(&cond)?;
        let body = self.scoped(body)?;
        Ok(self.append(Stmt::while_loop(cond, body))?)
    }

    fn scoped<E>(&mut self, f: impl FnOnce(&mut Self) -> Result<(), E>) -> Result<Stmt, E>
    where
        E: From<Error>,
    {
        self.begin_scope();
        f(self)?;
        Ok(self.pop_scope()?)
    }

    // =========================================================================
    // Plain statements
    // =========================================================================

    pub fn assign(&mut self, var: &Var, value: impl Into<Expr>) -> Result<()> {
        self.append(Stmt::Assign { var: var.clone(), value: value.into() })
    }

    pub fn store(&mut self, buf: Expr, offset: impl Into<Expr>, value: Expr) -> Result<()> {
        self.append(Stmt::Store { buf, offset: offset.into(), value })
    }

    pub fn barrier(&mut self) -> Result<()> {
        self.append(Stmt::Barrier)
    }

    /// Record a statement in the innermost scope.
    pub fn append(&mut self, stmt: impl Into<Stmt>) -> Result<()> {
        let stmt = stmt.into();
        let what = (self.scopes.depth() == 0).then(|| format_node(&stmt));
        ensure!(self.scopes.push(stmt), NoOpenScopeSnafu { what: what.unwrap_or_default() });
        Ok(())
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    pub fn begin_scope(&mut self) -> ScopeId {
        self.scopes.open()
    }

    /// Close the innermost scope and append its folded statement to the parent.
    pub fn end_scope(&mut self) -> Result<()> {
        let stmt = self.pop_scope()?;
        ensure!(self.scopes.depth() > 0, NoOpenScopeSnafu { what: format_node(&stmt) });
        self.append(stmt)
    }

    /// Close the innermost scope and return its folded statement.
    pub fn pop_scope(&mut self) -> Result<Stmt> {
        self.scopes.close().context(NoOpenScopeSnafu { what: "scope close" })
    }
}

fn check_condition(cond: &Expr) -> Result<()> {
    ensure!(cond.dtype().is_bool(), ConditionNotBoolSnafu { actual: cond.dtype().clone() });
    Ok(())
}
