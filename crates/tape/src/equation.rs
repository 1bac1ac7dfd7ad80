use std::fmt;

use rewind_core::{Block, ContractError, Variable, Vector, vector};

use crate::Error;

/// A recorded step: `target = Σ block(dependencies)`.
///
/// The equation's dependencies are the union of its blocks' dependencies in
/// first-seen order. Each block keeps its own ordering; the equation maps
/// between the two.
pub struct Equation {
    target: Variable,
    blocks: Vec<Box<dyn Block>>,
    dependencies: Vec<Variable>,
    slots: Vec<Vec<usize>>,
}

impl Equation {
    /// Builds an equation from its target and blocks.
    #[must_use]
    pub fn new(target: Variable, blocks: Vec<Box<dyn Block>>) -> Self {
        let dependencies = union(&blocks);
        let slots = blocks
            .iter()
            .map(|block| {
                block
                    .dependencies()
                    .iter()
                    .map(|dep| position(&dependencies, dep))
                    .collect()
            })
            .collect();

        Self {
            target,
            blocks,
            dependencies,
            slots,
        }
    }

    /// Builds an equation with a single block.
    #[must_use]
    pub fn single(target: Variable, block: impl Block + 'static) -> Self {
        Self::new(target, vec![Box::new(block)])
    }

    #[must_use]
    pub fn target(&self) -> &Variable {
        &self.target
    }

    #[must_use]
    pub fn blocks(&self) -> &[Box<dyn Block>] {
        &self.blocks
    }

    /// The distinct variables read by any block.
    #[must_use]
    pub fn dependencies(&self) -> &[Variable] {
        &self.dependencies
    }

    /// Evaluates the target from dependency values ordered like
    /// [`Equation::dependencies`].
    ///
    /// # Errors
    ///
    /// Returns an error if the value count is wrong, a block fails, or the
    /// block outputs have different lengths.
    pub fn evaluate(&self, values: &[&Vector]) -> Result<Vector, Error> {
        self.check_values(values)?;
        if self.blocks.is_empty() {
            return Err(ContractError::EmptyEquation(self.target.clone()).into());
        }

        let mut total: Option<Vector> = None;
        for (index, block) in self.blocks.iter().enumerate() {
            let inputs = self.block_values(index, values);
            let output = block
                .evaluate(&inputs)
                .map_err(|err| Error::from_block(block.as_ref(), err))?;
            match total.as_mut() {
                Some(acc) => vector::add_assign(acc, &output)?,
                None => total = Some(output),
            }
        }
        total.ok_or_else(|| ContractError::EmptyEquation(self.target.clone()).into())
    }

    /// Selects the values block `index` reads, in its own order.
    pub(crate) fn block_values<'v>(&self, index: usize, values: &[&'v Vector]) -> Vec<&'v Vector> {
        self.slots[index].iter().map(|&slot| values[slot]).collect()
    }

    /// The variables block `index` reads, each listed once.
    pub(crate) fn block_variables(&self, index: usize) -> Vec<&Variable> {
        let mut seen: Vec<&Variable> = Vec::new();
        for dep in self.blocks[index].dependencies() {
            if !seen.contains(&dep) {
                seen.push(dep);
            }
        }
        seen
    }

    pub(crate) fn check_values(&self, values: &[&Vector]) -> Result<(), ContractError> {
        if values.len() == self.dependencies.len() {
            Ok(())
        } else {
            Err(ContractError::ArityMismatch {
                block: self.target.to_string(),
                expected: self.dependencies.len(),
                found: values.len(),
            })
        }
    }
}

impl fmt::Debug for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let blocks: Vec<&str> = self.blocks.iter().map(|b| b.name()).collect();
        f.debug_struct("Equation")
            .field("target", &self.target)
            .field("blocks", &blocks)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Collects the distinct dependencies of `blocks` in first-seen order.
pub(crate) fn union(blocks: &[Box<dyn Block>]) -> Vec<Variable> {
    let mut deps: Vec<Variable> = Vec::new();
    for dep in blocks.iter().flat_map(|b| b.dependencies()) {
        if !deps.contains(dep) {
            deps.push(dep.clone());
        }
    }
    deps
}

fn position(deps: &[Variable], dep: &Variable) -> usize {
    deps.iter()
        .position(|d| d == dep)
        .unwrap_or_else(|| unreachable!("`{dep}` comes from the union of block dependencies"))
}
