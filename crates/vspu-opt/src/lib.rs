//! Optimization passes for the VSPU kernel compiler.
//!
//! Provides the [`OptimizationPass`] / [`OptimizationStep`] abstractions,
//! the named registry of built-in passes with a default ordered set, and the
//! [`Optimizer`] driver that runs each method of a module through the
//! configured passes.
//!
//! Passes can run in parallel for different methods, so they must not read
//! or write any state outside the module context, method, and configuration
//! they are handed. Within one method the configured passes run strictly in
//! order; later passes depend on the invariants earlier ones establish
//! (read-after-write splitting must precede reordering, or there are no
//! placeholders worth filling).

mod bus_setup;
mod combine;
mod combine_literals;
mod combine_rotations;
mod config;
mod eliminate;
mod hoist;
mod reorder;
mod split;

pub use config::Config;
pub use reorder::find_replacement_candidate;

use rayon::prelude::*;
use vspu_ir::{Cursor, IrError, Method, Module};

/// Errors surfaced by the optimizer.
#[derive(Debug, thiserror::Error)]
pub enum OptError {
    /// A pass the pipeline cannot run without was left out of the
    /// configured set.
    #[error("required optimization pass '{0}' is not in the configured set")]
    MissingRequiredPass(&'static str),

    /// The IR registry detected an inconsistency; the method is in an
    /// undefined state and compilation of it must stop.
    #[error(transparent)]
    Ir(#[from] IrError),
}

/// A whole-method optimization.
pub type PassFn = fn(&Module, &mut Method, &Config) -> Result<(), OptError>;

/// A single-cursor optimization; returns the cursor the driver continues
/// from, which lets a step consume or produce a variable number of
/// instructions.
pub type StepFn = fn(&Module, &mut Method, Cursor, &Config) -> Result<Cursor, OptError>;

/// A named, ordered whole-method pass.
#[derive(Clone, Copy, Debug)]
pub struct OptimizationPass {
    pub name: &'static str,
    pub index: usize,
    /// Required passes establish invariants the rest of the compiler relies
    /// on; omitting one is a configuration error.
    pub required: bool,
    pass: PassFn,
}

impl OptimizationPass {
    pub const fn new(name: &'static str, index: usize, required: bool, pass: PassFn) -> Self {
        Self {
            name,
            index,
            required,
            pass,
        }
    }

    /// Runs the pass over one method.
    pub fn run(
        &self,
        module: &Module,
        method: &mut Method,
        config: &Config,
    ) -> Result<(), OptError> {
        (self.pass)(module, method, config)
    }
}

impl PartialEq for OptimizationPass {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.name == other.name
    }
}

impl Eq for OptimizationPass {}

impl PartialOrd for OptimizationPass {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OptimizationPass {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| self.name.cmp(other.name))
    }
}

/// A named, ordered per-instruction step, driven by the `single-steps` pass.
#[derive(Clone, Copy, Debug)]
pub struct OptimizationStep {
    pub name: &'static str,
    pub index: usize,
    step: StepFn,
}

impl OptimizationStep {
    pub const fn new(name: &'static str, index: usize, step: StepFn) -> Self {
        Self { name, index, step }
    }

    /// Runs the step at one cursor position.
    pub fn run(
        &self,
        module: &Module,
        method: &mut Method,
        cursor: Cursor,
        config: &Config,
    ) -> Result<Cursor, OptError> {
        (self.step)(module, method, cursor, config)
    }
}

impl PartialEq for OptimizationStep {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.name == other.name
    }
}

impl Eq for OptimizationStep {}

/// Relocates rotation sources with over-long live ranges into fresh
/// temporaries (accumulator constraint).
pub static HOIST_ROTATION_SOURCES: OptimizationStep =
    OptimizationStep::new("hoist-rotation-sources", 0, hoist::hoist_rotation_sources);

/// The steps driven by [`RUN_SINGLE_STEPS`], in order.
static SINGLE_STEPS: &[&OptimizationStep] = &[&HOIST_ROTATION_SOURCES];

/// Runs all single-instruction steps in one walk over the method.
/// Combining them keeps the number of iterations over the instruction
/// stream down.
fn run_single_steps(
    module: &Module,
    method: &mut Method,
    config: &Config,
) -> Result<(), OptError> {
    let mut cursor = method.begin();
    while !method.is_end_of_method(cursor) {
        for step in SINGLE_STEPS {
            cursor = step.run(module, method, cursor, config)?;
        }
        cursor = method.next_in_method(cursor);
    }
    Ok(())
}

/// Runs every single-instruction step over the whole method.
pub static RUN_SINGLE_STEPS: OptimizationPass =
    OptimizationPass::new("single-steps", 0, true, run_single_steps);

/// Combines loads of identical literal values within a small range of a
/// basic block.
pub static COMBINE_LITERAL_LOADS: OptimizationPass = OptimizationPass::new(
    "combine-literal-loads",
    1,
    false,
    combine_literals::combine_literal_loads,
);

/// Folds chained vector-lane rotations into a single rotation.
pub static COMBINE_ROTATIONS: OptimizationPass = OptimizationPass::new(
    "combine-rotations",
    2,
    false,
    combine_rotations::combine_rotations,
);

/// Drops redundant re-configurations of the memory-transfer bus.
pub static COMBINE_BUS_SETUP: OptimizationPass =
    OptimizationPass::new("combine-bus-setup", 3, false, bus_setup::combine_bus_setup);

/// Removes instructions whose results nothing reads (dead stores, moves to
/// self).
pub static ELIMINATE_DEAD_CODE: OptimizationPass =
    OptimizationPass::new("eliminate-dead-code", 4, false, eliminate::eliminate_dead_code);

/// Splits read-after-write accesses that would violate pipeline timing, so
/// reordering and register allocation have an easier job.
pub static SPLIT_READ_AFTER_WRITES: OptimizationPass = OptimizationPass::new(
    "split-read-after-writes",
    5,
    true,
    split::split_read_after_writes,
);

/// Fills delay-slot placeholders by relocating independent instructions.
pub static REORDER: OptimizationPass =
    OptimizationPass::new("reorder", 6, true, reorder::reorder_within_blocks);

/// Peephole fusion of adjacent add-pipeline and mul-pipeline instructions.
pub static COMBINE: OptimizationPass =
    OptimizationPass::new("combine", 7, false, combine::combine_pipelines);

/// Every built-in pass, in default order.
pub fn all_passes() -> [&'static OptimizationPass; 8] {
    [
        &RUN_SINGLE_STEPS,
        &COMBINE_LITERAL_LOADS,
        &COMBINE_ROTATIONS,
        &COMBINE_BUS_SETUP,
        &ELIMINATE_DEAD_CODE,
        &SPLIT_READ_AFTER_WRITES,
        &REORDER,
        &COMBINE,
    ]
}

/// Looks a built-in pass up by name.
pub fn find_pass(name: &str) -> Option<&'static OptimizationPass> {
    all_passes().into_iter().find(|p| p.name == name)
}

/// The default ordered pass set.
pub fn default_passes() -> Vec<OptimizationPass> {
    all_passes().into_iter().copied().collect()
}

/// Drives the configured passes over every method of a module.
#[derive(Debug)]
pub struct Optimizer {
    config: Config,
    passes: Vec<OptimizationPass>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::with_defaults(Config::default())
    }
}

impl Optimizer {
    /// Creates an optimizer with an explicit pass set. The set is ordered
    /// by pass index; leaving out a required pass is a configuration error,
    /// reported here rather than mid-compilation.
    pub fn new(config: Config, mut passes: Vec<OptimizationPass>) -> Result<Self, OptError> {
        passes.sort();
        passes.dedup();
        for builtin in all_passes() {
            if builtin.required && !passes.contains(builtin) {
                return Err(OptError::MissingRequiredPass(builtin.name));
            }
        }
        Ok(Self { config, passes })
    }

    /// Creates an optimizer with the default pass set.
    pub fn with_defaults(config: Config) -> Self {
        Self {
            config,
            passes: default_passes(),
        }
    }

    /// The configured passes, in execution order.
    pub fn passes(&self) -> &[OptimizationPass] {
        &self.passes
    }

    /// Adds a pass, keeping the set ordered.
    pub fn add_pass(&mut self, pass: OptimizationPass) {
        if !self.passes.contains(&pass) {
            self.passes.push(pass);
            self.passes.sort();
        }
    }

    /// Removes a pass by name. Required passes cannot be removed.
    pub fn remove_pass(&mut self, name: &str) -> Result<(), OptError> {
        if let Some(pass) = self.passes.iter().find(|p| p.name == name) {
            if pass.required {
                return Err(OptError::MissingRequiredPass(pass.name));
            }
        }
        self.passes.retain(|p| p.name != name);
        Ok(())
    }

    /// Optimizes every method of the module. Methods are processed in
    /// parallel; each worker owns exactly one method, and the module
    /// context it sees carries no methods, so confinement holds by
    /// construction. The first invariant violation aborts the run.
    pub fn optimize(&self, module: &mut Module) -> Result<(), OptError> {
        let mut methods = std::mem::take(&mut module.methods);
        let result = {
            let context: &Module = module;
            methods
                .par_iter_mut()
                .try_for_each(|method| self.optimize_method(context, method))
        };
        module.methods = methods;
        result
    }

    fn optimize_method(&self, context: &Module, method: &mut Method) -> Result<(), OptError> {
        log::debug!("optimizing method '{}'", method.name);
        for pass in &self.passes {
            log::debug!("running pass '{}' on '{}'", pass.name, method.name);
            pass.run(context, method, &self.config)?;
        }
        Ok(())
    }
}
