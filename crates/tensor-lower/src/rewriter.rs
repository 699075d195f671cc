use thiserror::Error;

use crate::{
    index::{FunctionIndexError, FunctionIndices, InstId},
    spec::{CoreOp, Function, Instruction, Operand, Operation, TensorLiteral, ValueId, ValueType},
};

/// Errors raised by structural edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error(transparent)]
    Index(#[from] FunctionIndexError),
    #[error("instruction {inst:?} is not part of the function")]
    UnknownInstruction { inst: InstId },
    #[error("cannot erase %{value:?}: value still has {uses} use(s)")]
    LiveUses { value: ValueId, uses: usize },
}

/// Marks a point in the rewriter's insertion journal; see [`ProgramRewriter::rollback_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Mutable IR editor with stable instruction identifiers and SSA accounting.
pub struct ProgramRewriter<'a> {
    pub func: &'a mut Function,
    indices: FunctionIndices,
    journal: Vec<InstId>,
}

impl<'a> ProgramRewriter<'a> {
    /// Creates a rewriter for the provided function, indexing its body.
    pub fn new(func: &'a mut Function) -> Result<Self, FunctionIndexError> {
        let indices = FunctionIndices::build(func)?;
        Ok(Self {
            func,
            indices,
            journal: Vec::new(),
        })
    }

    /// Returns the operation referenced by `inst`.
    pub fn op(&self, inst: InstId) -> &Operation {
        &self.instruction(inst).op
    }

    /// Returns the operands for the given instruction.
    pub fn operands(&self, inst: InstId) -> &[Operand] {
        &self.instruction(inst).operands
    }

    /// Returns the SSA value consumed at operand position `index`, if it is a value.
    pub fn operand_value(&self, inst: InstId, index: usize) -> Option<ValueId> {
        self.operands(inst).get(index).map(Operand::value)
    }

    /// Returns the SSA value produced by the instruction.
    pub fn value_of(&self, inst: InstId) -> ValueId {
        self.indices
            .value_of(inst)
            .expect("instruction must have a value")
    }

    /// Returns the type recorded for the value.
    pub fn type_of(&self, value: ValueId) -> Option<&ValueType> {
        self.indices.type_of(value)
    }

    /// Returns the instruction defining the provided value.
    pub fn inst_of(&self, value: ValueId) -> Option<InstId> {
        self.indices.inst_of(value)
    }

    /// Returns the operation defining `value`, or `None` for parameters.
    pub fn defining_op(&self, value: ValueId) -> Option<&Operation> {
        self.inst_of(value).map(|inst| self.op(inst))
    }

    /// Returns the recorded users for the value.
    pub fn users_of(&self, value: ValueId) -> &[InstId] {
        self.indices.users_of(value)
    }

    pub fn contains(&self, inst: InstId) -> bool {
        self.indices.contains(inst)
    }

    /// Returns the current version counter for an instruction.
    pub fn version(&self, inst: InstId) -> Option<u32> {
        self.indices.version(inst)
    }

    pub fn insts_in_order(&self) -> Vec<InstId> {
        self.indices.ordered_inst_ids()
    }

    pub fn is_function_result(&self, value: ValueId) -> bool {
        self.func.result_ids.contains(&value)
    }

    /// Replaces all uses of `from` with `to`.
    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) -> Result<(), RewriteError> {
        if from == to {
            return Ok(());
        }
        let mut consumers = self.indices.users_of(from).to_vec();
        consumers.dedup();
        for inst in consumers {
            let pos = self.position(inst)?;
            let instruction = &mut self.func.body[pos];
            for operand in &mut instruction.operands {
                if operand.value() == from {
                    *operand = Operand::Value(to);
                }
            }
            self.indices.update_operand_use(inst, from, to)?;
        }
        Ok(())
    }

    /// Replaces uses of `from` with `to`, including function results.
    pub fn replace_value_and_results(
        &mut self,
        from: ValueId,
        to: ValueId,
    ) -> Result<(), RewriteError> {
        self.replace_all_uses(from, to)?;
        for result in &mut self.func.result_ids {
            if *result == from {
                *result = to;
            }
        }
        Ok(())
    }

    /// Redirects every use of `inst`'s value to `replacement`, then erases `inst`.
    pub fn replace_op(&mut self, inst: InstId, replacement: ValueId) -> Result<(), RewriteError> {
        let value = self.value_of(inst);
        self.replace_value_and_results(value, replacement)?;
        self.erase_inst(inst)
    }

    /// Erases the instruction identified by `inst`.
    pub fn erase_inst(&mut self, inst: InstId) -> Result<(), RewriteError> {
        let value = self
            .indices
            .value_of(inst)
            .ok_or(RewriteError::UnknownInstruction { inst })?;
        let uses = self.indices.users_of(value).len();
        if uses != 0 {
            return Err(RewriteError::LiveUses { value, uses });
        }
        let pos = self.position(inst)?;
        let instruction = self.func.body.remove(pos);
        self.indices.remove_instruction(inst, &instruction);
        Ok(())
    }

    /// Inserts a new instruction before `at`, returning its identifiers.
    pub fn insert_before(
        &mut self,
        at: InstId,
        op: Operation,
        operands: Vec<Operand>,
        output: ValueType,
    ) -> Result<(InstId, ValueId), RewriteError> {
        let pos = self.position(at)?;
        self.insert_at_pos(pos, op, operands, output)
    }

    /// Materialises a literal by inserting a core `constant` before `at`.
    pub fn materialize_constant(
        &mut self,
        at: InstId,
        literal: TensorLiteral,
    ) -> Result<(InstId, ValueId), RewriteError> {
        let output = ValueType::Tensor(literal.spec.clone());
        self.insert_before(at, Operation::Core(CoreOp::Constant(literal)), Vec::new(), output)
    }

    /// Records the current insertion journal position.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    /// Instructions inserted since `checkpoint` that are still live, in insertion order.
    pub fn inserted_since(&self, checkpoint: Checkpoint) -> Vec<InstId> {
        self.journal[checkpoint.0.min(self.journal.len())..]
            .iter()
            .copied()
            .filter(|inst| self.contains(*inst))
            .collect()
    }

    /// Erases every instruction inserted after `checkpoint`, newest first.
    ///
    /// Only insertions are journaled: a rewrite must not redirect uses of pre-existing
    /// values before it knows it will succeed.
    pub fn rollback_to(&mut self, checkpoint: Checkpoint) -> Result<usize, RewriteError> {
        let mut erased = 0usize;
        while self.journal.len() > checkpoint.0 {
            let Some(inst) = self.journal.pop() else {
                break;
            };
            if self.contains(inst) {
                self.erase_inst(inst)?;
                erased += 1;
            }
        }
        Ok(erased)
    }

    /// Verifies basic SSA invariants after mutations.
    pub fn verify(&self) -> bool {
        FunctionIndices::build(self.func).is_ok()
    }

    fn instruction(&self, inst: InstId) -> &Instruction {
        let pos = self
            .indices
            .position(inst)
            .expect("instruction id must be valid");
        &self.func.body[pos]
    }

    fn position(&self, inst: InstId) -> Result<usize, RewriteError> {
        self.indices
            .position(inst)
            .ok_or(RewriteError::UnknownInstruction { inst })
    }

    fn insert_at_pos(
        &mut self,
        pos: usize,
        op: Operation,
        operands: Vec<Operand>,
        output: ValueType,
    ) -> Result<(InstId, ValueId), RewriteError> {
        let inst_id = self.indices.allocate_inst();
        let value_id = self.indices.allocate_value();
        let instruction = Instruction {
            id: value_id,
            op,
            operands,
            output,
        };
        self.indices.insert_instruction(inst_id, pos, &instruction)?;
        self.func.body.insert(pos, instruction);
        self.journal.push(inst_id);
        Ok((inst_id, value_id))
    }
}
