//! Textual listing encoder.
//!
//! Emits the manifest as directives followed by one line per instruction,
//! indented by nesting depth:
//!
//! ```text
//! .kernel gemm_kernel
//! .hw XeHpc
//! .regs 128
//! .simd 16
//! .slm 0
//! .caps
//! .arg A global_ptr(stateless)
//! ...
//! while (k_idx < (k - 64))
//!   load.2d(16x32x1) A[...] @(..., ...) -> A_blk[0] f32
//! end
//! ```

use enumset::EnumSet;
use itertools::Itertools;
use tessel_ir::Stmt;
use tessel_ir::tree::format_node;

use crate::types::{Capability, KernelImage, KernelManifest};
use crate::{Encoder, Result};

/// Reference encoder producing a human-readable listing.
#[derive(Debug, Clone)]
pub struct ListingEncoder {
    capabilities: EnumSet<Capability>,
}

impl ListingEncoder {
    pub fn new() -> Self {
        Self { capabilities: EnumSet::all() }
    }

    /// Restrict the capabilities this encoder accepts.
    pub fn with_capabilities(mut self, capabilities: EnumSet<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl Default for ListingEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for ListingEncoder {
    fn encode(&self, body: &Stmt, manifest: &KernelManifest) -> Result<KernelImage> {
        let mut code_lines: Vec<String> = Vec::new();

        code_lines.push(format!(".kernel {}", manifest.name));
        code_lines.push(format!(".hw {}", manifest.hw));
        code_lines.push(format!(".regs {}", manifest.regs));
        code_lines.push(format!(".simd {}", manifest.simd));
        code_lines.push(format!(".slm {}", manifest.slm_bytes));
        if manifest.thread_group_size > 0 {
            code_lines.push(format!(".thread_group {}", manifest.thread_group_size));
        }
        code_lines.push(format!(".caps {}", manifest.capabilities.iter().map(|c| c.as_ref().to_string()).join(",")));
        for arg in &manifest.args {
            code_lines.push(format!(".arg {} {}", arg.name, arg.kind));
        }
        code_lines.push(String::new());

        render(body, 0, &mut code_lines);
        tracing::debug!(lines = code_lines.len(), "listing rendered");

        Ok(KernelImage {
            name: manifest.name.clone(),
            backend: self.backend_name().to_string(),
            code: code_lines.join("\n").into_bytes(),
            manifest: manifest.clone(),
        })
    }

    fn backend_name(&self) -> &str {
        "listing"
    }

    fn capabilities(&self) -> EnumSet<Capability> {
        self.capabilities
    }
}

fn render(stmt: &Stmt, depth: usize, out: &mut Vec<String>) {
    let line = |text: String| format!("{}{text}", "  ".repeat(depth));
    match stmt {
        Stmt::Seq(stmts) => stmts.iter().for_each(|s| render(s, depth, out)),
        Stmt::Let { body, .. } | Stmt::Alloc { body, .. } => {
            out.push(line(format_node(stmt)));
            if let Some(body) = body {
                render(body, depth, out);
            }
        }
        Stmt::If { cond, then_body, else_body } => {
            out.push(line(format!("if {cond}")));
            render(then_body, depth + 1, out);
            if let Some(else_body) = else_body {
                out.push(line("else".to_string()));
                render(else_body, depth + 1, out);
            }
            out.push(line("end".to_string()));
        }
        Stmt::While { cond, body } => {
            out.push(line(format!("while {cond}")));
            render(body, depth + 1, out);
            out.push(line("end".to_string()));
        }
        Stmt::Chain(stmts) => {
            out.push(line("{".to_string()));
            stmts.iter().for_each(|s| render(s, depth + 1, out));
            out.push(line("}".to_string()));
        }
        _ => out.push(line(format_node(stmt))),
    }
}
