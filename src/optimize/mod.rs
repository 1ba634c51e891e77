// ABOUTME: IR optimization passes: self- and mutual-recursion tail-call elimination

mod mutual_tco;
mod self_tco;

use crate::ir::IrNode;
use crate::lower::IrModule;
use tracing::debug;

pub use mutual_tco::rewrite_mutual_recursion;
pub use self_tco::rewrite_self_recursion;

/// Run all optimization passes over a lowered module.
///
/// Mutual-recursion rewriting runs first so self-tail-calls inside a
/// recursion group stay eligible for the loop rewrite afterwards.
pub fn optimize_module(module: IrModule) -> IrModule {
    let IrModule { body, exports } = module;
    let body = rewrite_mutual_recursion(body);
    let body: Vec<IrNode> = body.into_iter().map(rewrite_self_recursion).collect();
    debug!(statements = body.len(), "optimized module");
    IrModule { body, exports }
}
