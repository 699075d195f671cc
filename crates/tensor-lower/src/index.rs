use std::collections::{hash_map::Entry, HashMap};

use smallvec::SmallVec;
use thiserror::Error;

use crate::spec::{Function, Instruction, Operand, ValueId, ValueType};

/// Stable handle for an instruction; it survives insertions and erasures around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct InstId(pub u32);

#[derive(Debug, Clone, Copy)]
struct InstSlot {
    pos: usize,
    value: ValueId,
    /// Bumped whenever the instruction's operands or its users change.
    version: u32,
}

#[derive(Debug, Clone)]
struct ValueInfo {
    ty: ValueType,
    /// `None` for function parameters.
    producer: Option<InstId>,
    /// One entry per operand slot reading the value.
    users: SmallVec<[InstId; 4]>,
}

/// Def/use bookkeeping for one function body, kept in sync by [`crate::rewriter::ProgramRewriter`].
#[derive(Debug, Clone)]
pub struct FunctionIndices {
    insts: HashMap<InstId, InstSlot>,
    values: HashMap<ValueId, ValueInfo>,
    next_value: u32,
    next_inst: u32,
}

impl FunctionIndices {
    /// Indexes `function`, rejecting duplicate definitions and uses that precede their definition.
    pub fn build(function: &Function) -> Result<Self, FunctionIndexError> {
        if function.parameter_ids.len() != function.parameters.len() {
            return Err(FunctionIndexError::SignatureMismatch {
                ids: function.parameter_ids.len(),
                types: function.parameters.len(),
            });
        }

        let mut indices = FunctionIndices {
            insts: HashMap::with_capacity(function.body.len()),
            values: HashMap::with_capacity(function.parameters.len() + function.body.len()),
            next_value: 0,
            next_inst: 0,
        };
        for (param, ty) in function.parameter_ids.iter().zip(&function.parameters) {
            indices.define(*param, ty.clone(), None)?;
        }
        for (pos, instruction) in function.body.iter().enumerate() {
            let inst = indices.allocate_inst();
            indices.link_operands(inst, instruction)?;
            indices.define(instruction.id, instruction.output.clone(), Some(inst))?;
            indices.insts.insert(
                inst,
                InstSlot {
                    pos,
                    value: instruction.id,
                    version: 0,
                },
            );
        }
        if let Some(missing) = function
            .result_ids
            .iter()
            .find(|result| !indices.values.contains_key(result))
        {
            return Err(FunctionIndexError::MissingValueDefinition { value: *missing });
        }

        indices.next_value = indices
            .values
            .keys()
            .map(|value| value.0 + 1)
            .max()
            .unwrap_or(0);
        Ok(indices)
    }

    pub fn position(&self, inst: InstId) -> Option<usize> {
        self.insts.get(&inst).map(|slot| slot.pos)
    }

    /// Value produced by `inst`.
    pub fn value_of(&self, inst: InstId) -> Option<ValueId> {
        self.insts.get(&inst).map(|slot| slot.value)
    }

    /// Producer of `value`; `None` for parameters and unknown values.
    pub fn inst_of(&self, value: ValueId) -> Option<InstId> {
        self.values.get(&value).and_then(|info| info.producer)
    }

    pub fn is_parameter(&self, value: ValueId) -> bool {
        self.values
            .get(&value)
            .is_some_and(|info| info.producer.is_none())
    }

    pub fn type_of(&self, value: ValueId) -> Option<&ValueType> {
        self.values.get(&value).map(|info| &info.ty)
    }

    pub fn users_of(&self, value: ValueId) -> &[InstId] {
        self.values
            .get(&value)
            .map(|info| info.users.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, inst: InstId) -> bool {
        self.insts.contains_key(&inst)
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Change counter the greedy driver keys its failure cache on.
    pub fn version(&self, inst: InstId) -> Option<u32> {
        self.insts.get(&inst).map(|slot| slot.version)
    }

    pub fn bump_version(&mut self, inst: InstId) {
        if let Some(slot) = self.insts.get_mut(&inst) {
            slot.version = slot.version.wrapping_add(1);
        }
    }

    pub fn ordered_inst_ids(&self) -> Vec<InstId> {
        let mut order = self
            .insts
            .iter()
            .map(|(inst, slot)| (slot.pos, *inst))
            .collect::<Vec<_>>();
        order.sort_unstable();
        order.into_iter().map(|(_, inst)| inst).collect()
    }

    pub(crate) fn allocate_inst(&mut self) -> InstId {
        let inst = InstId(self.next_inst);
        self.next_inst += 1;
        inst
    }

    pub(crate) fn allocate_value(&mut self) -> ValueId {
        let value = ValueId(self.next_value);
        self.next_value += 1;
        value
    }

    /// Records `instruction` as `inst` at body position `pos`, shifting later positions.
    pub(crate) fn insert_instruction(
        &mut self,
        inst: InstId,
        pos: usize,
        instruction: &Instruction,
    ) -> Result<(), FunctionIndexError> {
        if self.values.contains_key(&instruction.id) {
            return Err(FunctionIndexError::DuplicateValue {
                value: instruction.id,
            });
        }
        self.link_operands(inst, instruction)?;
        self.define(instruction.id, instruction.output.clone(), Some(inst))?;
        for slot in self.insts.values_mut().filter(|slot| slot.pos >= pos) {
            slot.pos += 1;
        }
        self.insts.insert(
            inst,
            InstSlot {
                pos,
                value: instruction.id,
                version: 0,
            },
        );
        Ok(())
    }

    /// Forgets `inst` and its value. Producers of its operands lose a user, which bumps their
    /// version so patterns that failed on them are retried.
    pub(crate) fn remove_instruction(&mut self, inst: InstId, instruction: &Instruction) {
        if let Some(slot) = self.insts.remove(&inst) {
            for other in self.insts.values_mut().filter(|other| other.pos > slot.pos) {
                other.pos -= 1;
            }
            self.values.remove(&slot.value);
        }
        for operand in instruction.operands.iter().map(Operand::value) {
            let producer = match self.values.get_mut(&operand) {
                Some(info) => {
                    info.users.retain(|user| *user != inst);
                    info.producer
                }
                None => continue,
            };
            if let Some(producer) = producer {
                self.bump_version(producer);
            }
        }
    }

    /// Moves `inst` from the user list of `from` to that of `to` and bumps its version.
    pub(crate) fn update_operand_use(
        &mut self,
        inst: InstId,
        from: ValueId,
        to: ValueId,
    ) -> Result<(), FunctionIndexError> {
        let target = self
            .values
            .get_mut(&to)
            .ok_or(FunctionIndexError::MissingValueDefinition { value: to })?;
        if !target.users.contains(&inst) {
            target.users.push(inst);
        }
        if let Some(source) = self.values.get_mut(&from) {
            source.users.retain(|user| *user != inst);
        }
        self.bump_version(inst);
        Ok(())
    }

    fn define(
        &mut self,
        value: ValueId,
        ty: ValueType,
        producer: Option<InstId>,
    ) -> Result<(), FunctionIndexError> {
        match self.values.entry(value) {
            Entry::Occupied(_) => Err(FunctionIndexError::DuplicateValue { value }),
            Entry::Vacant(slot) => {
                slot.insert(ValueInfo {
                    ty,
                    producer,
                    users: SmallVec::new(),
                });
                Ok(())
            }
        }
    }

    /// Registers `inst` as a user of each operand; nothing is recorded if one is undefined.
    fn link_operands(
        &mut self,
        inst: InstId,
        instruction: &Instruction,
    ) -> Result<(), FunctionIndexError> {
        if let Some(missing) = instruction
            .operands
            .iter()
            .map(Operand::value)
            .find(|value| !self.values.contains_key(value))
        {
            return Err(FunctionIndexError::MissingValueDefinition { value: missing });
        }
        for operand in instruction.operands.iter().map(Operand::value) {
            if let Some(info) = self.values.get_mut(&operand) {
                info.users.push(inst);
            }
        }
        Ok(())
    }
}

/// Errors surfaced when building SSA indices for a function.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FunctionIndexError {
    #[error("duplicate value definition for %{value:?}")]
    DuplicateValue { value: ValueId },
    #[error("value %{value:?} is used but never defined")]
    MissingValueDefinition { value: ValueId },
    #[error("function declares {ids} parameter ids but {types} parameter types")]
    SignatureMismatch { ids: usize, types: usize },
}
