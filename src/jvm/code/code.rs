use crate::jvm::class_file;
use crate::jvm::class_file::{BytecodeIndex, ConstantsPool};
use crate::jvm::code::{BranchInstruction, Instruction, SynLabel, TryCatch};
use crate::jvm::{Error, RefType};
use crate::util::Offset;
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;

/// Element of a method body
///
/// Labels are interleaved with instructions (rather than being attached to basic blocks) so that
/// passes over the code can tell exactly what lies between two labels.
#[derive(Clone, PartialEq, Debug)]
pub enum CodeItem {
    Label(SynLabel),
    Instruction(Instruction),
    Branch(BranchInstruction<SynLabel>),
}

/// Semantic representation of a stack-form method body
#[derive(Clone, PartialEq, Debug)]
pub struct CfCode {
    /// Maximum size of locals through the method
    pub max_locals: Offset,

    /// Maximum size of stack through the method
    pub max_stack: Offset,

    /// Labels and instructions, in code order
    pub items: Vec<CodeItem>,

    /// Exception table, in priority order
    pub try_catches: Vec<TryCatch>,
}

impl CfCode {
    /// Position in `items` of every label
    pub fn label_positions(&self) -> HashMap<SynLabel, usize> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| match item {
                CodeItem::Label(lbl) => Some((*lbl, idx)),
                _ => None,
            })
            .collect()
    }

    /// Is `second` placed immediately after `first` (or is it the same label)?
    ///
    /// No instruction and no other label may sit between the two.
    pub fn labels_adjacent(
        positions: &HashMap<SynLabel, usize>,
        first: SynLabel,
        second: SynLabel,
    ) -> bool {
        if first == second {
            return true;
        }
        match (positions.get(&first), positions.get(&second)) {
            (Some(first), Some(second)) => first + 1 == *second,
            _ => false,
        }
    }

    /// Labels that are the target of a jump or are used by the exception table
    pub fn referenced_labels(&self) -> HashSet<SynLabel> {
        let mut referenced = HashSet::new();
        for item in &self.items {
            if let CodeItem::Branch(branch) = item {
                referenced.extend(branch.jump_targets().into_iter().copied());
            }
        }
        for try_catch in &self.try_catches {
            referenced.insert(try_catch.start);
            referenced.insert(try_catch.end);
            referenced.extend(try_catch.targets.iter().copied());
        }
        referenced
    }

    /// Instructions only (skipping labels)
    pub fn instruction_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| !matches!(item, CodeItem::Label(_)))
            .count()
    }

    /// Encode the code into the `Code` attribute format
    ///
    /// Regular instructions are encoded first (this fixes their size, since `ldc` vs. `ldc_w`
    /// depends on constant pool indices). Then branch offsets get laid out and resolved.
    pub fn serialize_code(&self, constants_pool: &mut ConstantsPool) -> Result<class_file::Code, Error> {
        let max_locals = u16::try_from(self.max_locals.0)
            .map_err(|_| Error::MethodCodeMaxLocalsOverflow(self.max_locals))?;
        let max_stack = u16::try_from(self.max_stack.0)
            .map_err(|_| Error::MethodCodeMaxStackOverflow(self.max_stack))?;

        enum Encoded<'a> {
            Label(SynLabel),
            Bytes(Vec<u8>),
            Branch(&'a BranchInstruction<SynLabel>),
        }

        let mut encoded: Vec<Encoded> = vec![];
        for item in &self.items {
            encoded.push(match item {
                CodeItem::Label(lbl) => Encoded::Label(*lbl),
                CodeItem::Instruction(insn) => {
                    let mut bytes = vec![];
                    insn.encode(constants_pool, &mut bytes)?;
                    Encoded::Bytes(bytes)
                }
                CodeItem::Branch(branch) => Encoded::Branch(branch),
            });
        }

        // Lay out the code to find label offsets
        let mut label_offsets: HashMap<SynLabel, usize> = HashMap::new();
        let mut offset = 0;
        for item in &encoded {
            match item {
                Encoded::Label(lbl) => {
                    label_offsets.insert(*lbl, offset);
                }
                Encoded::Bytes(bytes) => offset += bytes.len(),
                Encoded::Branch(branch) => offset += branch.encoded_width(offset),
            }
        }
        if u16::try_from(offset).is_err() {
            return Err(Error::MethodCodeOverflow(Offset(offset)));
        }

        let lookup = |lbl: &SynLabel| -> Result<usize, Error> {
            label_offsets
                .get(lbl)
                .copied()
                .ok_or_else(|| Error::MethodCodeNotFinished {
                    pending_block: None,
                    unplaced_labels: vec![*lbl],
                })
        };

        // Emit the code array
        let mut code_array = vec![];
        for item in &encoded {
            match item {
                Encoded::Label(_) => (),
                Encoded::Bytes(bytes) => code_array.extend_from_slice(bytes),
                Encoded::Branch(branch) => {
                    let here = code_array.len();
                    let resolved = branch.map_labels(|lbl| {
                        let relative = lookup(lbl)? as i32 - here as i32;
                        let is_switch = matches!(
                            branch,
                            BranchInstruction::TableSwitch { .. }
                                | BranchInstruction::LookupSwitch { .. }
                        );
                        if !is_switch && i16::try_from(relative).is_err() {
                            return Err(Error::JumpOffsetOverflow {
                                from: Offset(here),
                                to: *lbl,
                            });
                        }
                        Ok(relative)
                    })?;
                    resolved.encode(here, &mut code_array)?;
                }
            }
        }

        // Exception table, with one entry per handler
        let mut exception_table = vec![];
        for try_catch in &self.try_catches {
            let start_pc = lookup(&try_catch.start)?;
            let end_pc = lookup(&try_catch.end)?;
            if start_pc >= end_pc {
                continue;
            }
            for (guard, target) in try_catch.handlers() {
                let catch_type = match guard {
                    None => None,
                    Some(class) => Some(constants_pool.get_class(&RefType::Object(class.clone()))?),
                };
                exception_table.push(class_file::ExceptionHandler {
                    start_pc: BytecodeIndex(start_pc as u16),
                    end_pc: BytecodeIndex(end_pc as u16),
                    handler_pc: BytecodeIndex(lookup(target)? as u16),
                    catch_type,
                });
            }
        }

        Ok(class_file::Code {
            max_stack,
            max_locals,
            code_array: class_file::BytecodeArray(code_array),
            exception_table,
            attributes: vec![],
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{LabelGenerator, OrdComparison, SynLabelGenerator};

    #[test]
    fn backward_and_forward_jumps() {
        let mut labels = SynLabelGenerator::new(SynLabel::START);
        let top = labels.fresh_label();
        let done = labels.fresh_label();
        let code = CfCode {
            max_locals: Offset(1),
            max_stack: Offset(1),
            items: vec![
                CodeItem::Label(top),
                CodeItem::Instruction(Instruction::ILoad(0)),
                CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, done)),
                CodeItem::Instruction(Instruction::IInc(0, -1)),
                CodeItem::Branch(BranchInstruction::Goto(top)),
                CodeItem::Label(done),
                CodeItem::Branch(BranchInstruction::Return),
            ],
            try_catches: vec![],
        };
        let mut pool = ConstantsPool::new();
        let encoded = code.serialize_code(&mut pool).unwrap();
        assert_eq!(
            encoded.code_array.0,
            vec![
                0x1a, // iload_0
                0x99, 0x00, 0x09, // ifeq +9
                0x84, 0x00, 0xff, // iinc 0 -1
                0xa7, 0xff, 0xf9, // goto -7
                0xb1, // return
            ]
        );
    }

    #[test]
    fn label_adjacency() {
        let mut labels = SynLabelGenerator::new(SynLabel::START);
        let (a, b, c) = (labels.fresh_label(), labels.fresh_label(), labels.fresh_label());
        let code = CfCode {
            max_locals: Offset(0),
            max_stack: Offset(0),
            items: vec![
                CodeItem::Label(a),
                CodeItem::Label(b),
                CodeItem::Instruction(Instruction::Nop),
                CodeItem::Label(c),
            ],
            try_catches: vec![],
        };
        let positions = code.label_positions();
        assert!(CfCode::labels_adjacent(&positions, a, b));
        assert!(CfCode::labels_adjacent(&positions, c, c));
        assert!(!CfCode::labels_adjacent(&positions, b, c));
        assert!(!CfCode::labels_adjacent(&positions, b, a));
    }

    #[test]
    fn empty_ranges_are_not_encoded() {
        let mut labels = SynLabelGenerator::new(SynLabel::START);
        let (a, b, h) = (labels.fresh_label(), labels.fresh_label(), labels.fresh_label());
        let code = CfCode {
            max_locals: Offset(0),
            max_stack: Offset(1),
            items: vec![
                CodeItem::Label(a),
                CodeItem::Label(b),
                CodeItem::Branch(BranchInstruction::Return),
                CodeItem::Label(h),
                CodeItem::Branch(BranchInstruction::AThrow),
            ],
            try_catches: vec![TryCatch::catching(a, b, None, h)],
        };
        let encoded = code.serialize_code(&mut ConstantsPool::new()).unwrap();
        assert!(encoded.exception_table.is_empty());
    }
}
