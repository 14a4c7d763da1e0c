//! Stack code to register code, with one register per local and per stack slot
//!
//! The register frame is laid out so that the mapping is the inverse of the one used when
//! lowering register code:
//!
//! ```text
//! [ locals past the parameters | stack slots | scratch | parameters ]
//! ```
//!
//! Stack types at every instruction come from running the verifier's frame simulation over the
//! method to a fixed point.

use crate::convert::BackendFault;
use crate::dex::{
    Address, BinaryOp, CatchHandler, CompareKind, ConstValue, DexCode, DexInstruction, IfTest,
    InvokeKind, MemberType, NumericType, Register, TryItem, UnaryOp, ValueType,
};
use crate::jvm::code::{
    BranchInstruction, CfCode, CodeItem, CompareMode, EqComparison, Instruction, InvokeType,
    OrdComparison, ShiftType, SynLabel,
};
use crate::jvm::verifier::{Frame, VerificationType};
use crate::jvm::{BinaryName, ConstantData, FieldType, RefType};
use crate::model::ProgramMethod;
use crate::unreachable_fault;
use crate::util::Offset;
use std::collections::{HashMap, HashSet};

/// Registers available for shuffling values around (enough for the widest `dup2_x2`)
const SCRATCH_REGISTERS: usize = 4;

struct RegisterLayout {
    ins: usize,
    stack_base: usize,
    scratch_base: usize,
    parameter_base: usize,
    registers_size: u16,
}

impl RegisterLayout {
    fn new(max_locals: usize, max_stack: usize, ins: usize) -> Result<RegisterLayout, BackendFault> {
        let stack_base = max_locals - ins;
        let scratch_base = stack_base + max_stack;
        let parameter_base = scratch_base + SCRATCH_REGISTERS;
        let registers_size = u16::try_from(parameter_base + ins).map_err(|_| {
            BackendFault::Invalid(format!(
                "{} registers needed",
                parameter_base + ins
            ))
        })?;
        Ok(RegisterLayout {
            ins,
            stack_base,
            scratch_base,
            parameter_base,
            registers_size,
        })
    }

    fn register(&self, index: usize) -> Result<Register, BackendFault> {
        if index < self.registers_size as usize {
            Ok(Register(index as u16))
        } else {
            Err(BackendFault::Invalid(format!(
                "register {} is outside of the frame",
                index
            )))
        }
    }

    fn local(&self, local: u16) -> Result<Register, BackendFault> {
        let local = local as usize;
        if local < self.ins {
            self.register(self.parameter_base + local)
        } else {
            self.register(local - self.ins)
        }
    }

    fn stack(&self, offset: Offset) -> Result<Register, BackendFault> {
        if offset.0 < self.scratch_base - self.stack_base {
            self.register(self.stack_base + offset.0)
        } else {
            Err(BackendFault::Invalid(format!(
                "stack slot {} exceeds the maximum stack",
                offset.0
            )))
        }
    }

    fn scratch(&self, slot: usize) -> Result<Register, BackendFault> {
        if slot < SCRATCH_REGISTERS {
            self.register(self.scratch_base + slot)
        } else {
            Err(unreachable_fault!("SimpleBackend", "scratch"))
        }
    }
}

/// Branch whose targets are still labels
#[derive(Clone)]
enum PendingBranch {
    Goto,
    If {
        test: IfTest,
        value_type: ValueType,
        left: Register,
        right: Register,
    },
    IfZero {
        test: IfTest,
        value_type: ValueType,
        src: Register,
    },
    PackedSwitch {
        value: Register,
        first_key: i32,
    },
    SparseSwitch {
        value: Register,
        keys: Vec<i32>,
    },
}

impl PendingBranch {
    fn resolve(self, mut targets: Vec<Address>) -> Result<DexInstruction, BackendFault> {
        let single = |targets: &mut Vec<Address>| {
            targets
                .pop()
                .ok_or_else(|| unreachable_fault!("SimpleBackend", "resolve"))
        };
        Ok(match self {
            PendingBranch::Goto => DexInstruction::Goto(single(&mut targets)?),
            PendingBranch::If {
                test,
                value_type,
                left,
                right,
            } => DexInstruction::If {
                test,
                value_type,
                left,
                right,
                target: single(&mut targets)?,
            },
            PendingBranch::IfZero {
                test,
                value_type,
                src,
            } => DexInstruction::IfZero {
                test,
                value_type,
                src,
                target: single(&mut targets)?,
            },
            PendingBranch::PackedSwitch { value, first_key } => DexInstruction::PackedSwitch {
                value,
                first_key,
                targets,
            },
            PendingBranch::SparseSwitch { value, keys } => DexInstruction::SparseSwitch {
                value,
                targets: keys.into_iter().zip(targets).collect(),
            },
        })
    }
}

enum Pending {
    Ready(DexInstruction),
    Branch(PendingBranch, Vec<SynLabel>),
}

struct RegisterBuilder<'a> {
    this_class: &'a BinaryName,
    layout: RegisterLayout,
    emitted: Vec<Pending>,
    label_addresses: HashMap<SynLabel, Address>,
    outs_size: u16,
}

/// Build register code equivalent to some stack code
pub fn build_register_code(
    class: &BinaryName,
    method: &ProgramMethod,
    code: &CfCode,
) -> Result<DexCode, BackendFault> {
    let ins = method.parameter_slots();
    let max_locals = code.max_locals.0.max(ins);
    let layout = RegisterLayout::new(max_locals, code.max_stack.0, ins)?;
    let frames = simulate_frames(class, method, code)?;

    let handlers: HashSet<SynLabel> = code
        .try_catches
        .iter()
        .flat_map(|try_catch| try_catch.targets.iter().copied())
        .collect();

    let mut builder = RegisterBuilder {
        this_class: class,
        layout,
        emitted: vec![],
        label_addresses: HashMap::new(),
        outs_size: 0,
    };

    for (idx, item) in code.items.iter().enumerate() {
        let before = match &frames[idx] {
            Some(frame) => frame,
            None => {
                if let CodeItem::Label(label) = item {
                    builder.place_label(*label);
                }
                continue;
            }
        };
        match item {
            CodeItem::Label(label) => {
                builder.place_label(*label);
                if handlers.contains(label) {
                    let dest = builder.layout.stack(Offset(0))?;
                    builder.push(DexInstruction::MoveException { dest });
                }
            }
            CodeItem::Instruction(insn) => {
                let mut after = before.clone();
                after
                    .verify_instruction(insn, idx, class)
                    .map_err(|kind| invalid_code(method, class, insn, kind))?;
                builder.instruction(insn, before, &after)?;
            }
            CodeItem::Branch(branch) => builder.branch(branch, before)?,
        }
    }

    builder.finish(code, ins as u16)
}

impl<'a> RegisterBuilder<'a> {
    fn place_label(&mut self, label: SynLabel) {
        self.label_addresses.insert(label, self.emitted.len() as Address);
    }

    fn push(&mut self, insn: DexInstruction) {
        self.emitted.push(Pending::Ready(insn));
    }

    /// Register holding the `from_top`-th value from the top of the stack (`0` is the top)
    fn operand(
        &self,
        frame: &Frame,
        from_top: usize,
    ) -> Result<(Register, ValueType), BackendFault> {
        let (offset, typ) = frame
            .stack
            .iter()
            .rev()
            .nth(from_top)
            .ok_or_else(|| unreachable_fault!("SimpleBackend", "operand"))?;
        Ok((self.layout.stack(offset)?, value_type(typ)?))
    }

    fn operand_register(&self, frame: &Frame, from_top: usize) -> Result<Register, BackendFault> {
        self.operand(frame, from_top).map(|(register, _)| register)
    }

    /// Register receiving the value pushed by an instruction
    fn result(&self, after: &Frame) -> Result<Register, BackendFault> {
        self.operand_register(after, 0)
    }

    fn instruction(
        &mut self,
        insn: &Instruction,
        before: &Frame,
        after: &Frame,
    ) -> Result<(), BackendFault> {
        use Instruction::*;

        let constant = |value: ConstValue| -> Result<DexInstruction, BackendFault> {
            Ok(DexInstruction::Const {
                dest: self.result(after)?,
                value,
            })
        };

        let dex_insn = match insn {
            Nop => DexInstruction::Nop,
            AConstNull => constant(ConstValue::Null)?,
            IConstM1 => constant(ConstValue::Int(-1))?,
            IConst0 => constant(ConstValue::Int(0))?,
            IConst1 => constant(ConstValue::Int(1))?,
            IConst2 => constant(ConstValue::Int(2))?,
            IConst3 => constant(ConstValue::Int(3))?,
            IConst4 => constant(ConstValue::Int(4))?,
            IConst5 => constant(ConstValue::Int(5))?,
            LConst0 => constant(ConstValue::Long(0))?,
            LConst1 => constant(ConstValue::Long(1))?,
            FConst0 => constant(ConstValue::Float(0.0))?,
            FConst1 => constant(ConstValue::Float(1.0))?,
            FConst2 => constant(ConstValue::Float(2.0))?,
            DConst0 => constant(ConstValue::Double(0.0))?,
            DConst1 => constant(ConstValue::Double(1.0))?,
            BiPush(byte) => constant(ConstValue::Int(*byte as i32))?,
            SiPush(short) => constant(ConstValue::Int(*short as i32))?,
            Ldc(data) | Ldc2(data) => constant(match data {
                ConstantData::String(string) => ConstValue::String(string.clone()),
                ConstantData::Class(ref_type) => ConstValue::Class(ref_type.clone()),
                ConstantData::Integer(int) => ConstValue::Int(*int),
                ConstantData::Float(float) => ConstValue::Float(*float),
                ConstantData::Long(long) => ConstValue::Long(*long),
                ConstantData::Double(double) => ConstValue::Double(*double),
            })?,

            ILoad(local) | LLoad(local) | FLoad(local) | DLoad(local) | ALoad(local) => {
                let (dest, value_type) = self.operand(after, 0)?;
                DexInstruction::Move {
                    value_type,
                    dest,
                    src: self.layout.local(*local)?,
                }
            }
            IStore(local) | LStore(local) | FStore(local) | DStore(local) | AStore(local) => {
                let (src, value_type) = self.operand(before, 0)?;
                DexInstruction::Move {
                    value_type,
                    dest: self.layout.local(*local)?,
                    src,
                }
            }

            IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => {
                DexInstruction::ArrayGet {
                    member: array_member(insn)?,
                    dest: self.result(after)?,
                    array: self.operand_register(before, 1)?,
                    index: self.operand_register(before, 0)?,
                }
            }
            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => {
                DexInstruction::ArrayPut {
                    member: array_member(insn)?,
                    src: self.operand_register(before, 0)?,
                    array: self.operand_register(before, 2)?,
                    index: self.operand_register(before, 1)?,
                }
            }

            Pop | Pop2 => return Ok(()),
            Dup | DupX1 | DupX2 | Dup2 | Dup2X1 | Dup2X2 | Swap => {
                return self.shuffle(insn, before, after)
            }

            IAdd | LAdd | FAdd | DAdd | ISub | LSub | FSub | DSub | IMul | LMul | FMul | DMul
            | IDiv | LDiv | FDiv | DDiv | IRem | LRem | FRem | DRem | ISh(_) | LSh(_) | IAnd
            | LAnd | IOr | LOr | IXor | LXor => {
                let (op, operand_type) = binary_op(insn)?;
                DexInstruction::Binary {
                    op,
                    operand_type,
                    dest: self.result(after)?,
                    left: self.operand_register(before, 1)?,
                    right: self.operand_register(before, 0)?,
                }
            }

            INeg | LNeg | FNeg | DNeg | I2L | I2F | I2D | L2I | L2F | L2D | F2I | F2L | F2D
            | D2I | D2L | D2F | I2B | I2C | I2S => DexInstruction::Unary {
                op: unary_op(insn)?,
                dest: self.result(after)?,
                src: self.operand_register(before, 0)?,
            },

            IInc(local, by) => {
                let register = self.layout.local(*local)?;
                DexInstruction::BinaryLiteral {
                    op: BinaryOp::Add,
                    dest: register,
                    src: register,
                    literal: *by as i32,
                }
            }

            LCmp | FCmp(_) | DCmp(_) => {
                let kind = match insn {
                    LCmp => CompareKind::Long,
                    FCmp(CompareMode::L) => CompareKind::LessFloat,
                    FCmp(CompareMode::G) => CompareKind::GreaterFloat,
                    DCmp(CompareMode::L) => CompareKind::LessDouble,
                    _ => CompareKind::GreaterDouble,
                };
                DexInstruction::Compare {
                    kind,
                    dest: self.result(after)?,
                    left: self.operand_register(before, 1)?,
                    right: self.operand_register(before, 0)?,
                }
            }

            GetStatic(field) => DexInstruction::StaticGet {
                field: field.clone(),
                dest: self.result(after)?,
            },
            PutStatic(field) => DexInstruction::StaticPut {
                field: field.clone(),
                src: self.operand_register(before, 0)?,
            },
            GetField(field) => DexInstruction::InstanceGet {
                field: field.clone(),
                dest: self.result(after)?,
                object: self.operand_register(before, 0)?,
            },
            PutField(field) => DexInstruction::InstancePut {
                field: field.clone(),
                src: self.operand_register(before, 0)?,
                object: self.operand_register(before, 1)?,
            },

            Invoke(invoke_type, method) => {
                let has_receiver = *invoke_type != InvokeType::Static;
                let arg_slots = method.descriptor.parameter_length(has_receiver);
                let depth = before.stack.offset_len().0;
                let first = depth
                    .checked_sub(arg_slots)
                    .ok_or_else(|| unreachable_fault!("SimpleBackend", "invoke"))?;
                let args = (first..depth)
                    .map(|slot| self.layout.stack(Offset(slot)))
                    .collect::<Result<Vec<_>, _>>()?;
                self.outs_size = self.outs_size.max(args.len() as u16);

                let kind = match invoke_type {
                    InvokeType::Virtual => InvokeKind::Virtual,
                    InvokeType::Static => InvokeKind::Static,
                    InvokeType::Interface => InvokeKind::Interface,
                    InvokeType::Special
                        if method.name.is_initializer() || &method.class == self.this_class =>
                    {
                        InvokeKind::Direct
                    }
                    InvokeType::Special => InvokeKind::Super,
                };
                self.push(DexInstruction::Invoke {
                    kind,
                    method: method.clone(),
                    args,
                });
                match &method.descriptor.return_type {
                    None => return Ok(()),
                    Some(return_type) => DexInstruction::MoveResult {
                        value_type: ValueType::from_field_type(return_type),
                        dest: self.layout.stack(Offset(first))?,
                    },
                }
            }

            New(class) => DexInstruction::NewInstance {
                dest: self.result(after)?,
                class: class.clone(),
            },
            NewArray(base_type) => DexInstruction::NewArray {
                dest: self.result(after)?,
                size: self.operand_register(before, 0)?,
                array_type: RefType::array(FieldType::Base(*base_type)),
            },
            ANewArray(ref_type) => DexInstruction::NewArray {
                dest: self.result(after)?,
                size: self.operand_register(before, 0)?,
                array_type: RefType::array(FieldType::Ref(ref_type.clone())),
            },
            ArrayLength => DexInstruction::ArrayLength {
                dest: self.result(after)?,
                array: self.operand_register(before, 0)?,
            },
            CheckCast(ref_type) => DexInstruction::CheckCast {
                object: self.operand_register(before, 0)?,
                ref_type: ref_type.clone(),
            },
            InstanceOf(ref_type) => DexInstruction::InstanceOf {
                dest: self.result(after)?,
                object: self.operand_register(before, 0)?,
                ref_type: ref_type.clone(),
            },
            MonitorEnter => DexInstruction::MonitorEnter(self.operand_register(before, 0)?),
            MonitorExit => DexInstruction::MonitorExit(self.operand_register(before, 0)?),
        };
        self.push(dex_insn);
        Ok(())
    }

    /// Stack manipulation becomes moves through the scratch registers
    ///
    /// Every value in the affected part of the stack is first copied out to scratch, then copied
    /// back to where it ends up.
    fn shuffle(
        &mut self,
        insn: &Instruction,
        before: &Frame,
        after: &Frame,
    ) -> Result<(), BackendFault> {
        // Slots consumed, then for each produced slot the consumed slot it comes from
        let (consumed, pattern): (usize, &[usize]) = match insn {
            Instruction::Dup => (1, &[0, 0]),
            Instruction::DupX1 => (2, &[1, 0, 1]),
            Instruction::DupX2 => (3, &[2, 0, 1, 2]),
            Instruction::Dup2 => (2, &[0, 1, 0, 1]),
            Instruction::Dup2X1 => (3, &[1, 2, 0, 1, 2]),
            Instruction::Dup2X2 => (4, &[2, 3, 0, 1, 2, 3]),
            Instruction::Swap => (2, &[1, 0]),
            _ => return Err(unreachable_fault!("SimpleBackend", "shuffle")),
        };
        let base = before
            .stack
            .offset_len()
            .0
            .checked_sub(consumed)
            .ok_or_else(|| unreachable_fault!("SimpleBackend", "shuffle"))?;

        for (offset, typ) in before.stack.iter().filter(|(offset, _)| offset.0 >= base) {
            let insn = DexInstruction::Move {
                value_type: value_type(typ)?,
                dest: self.layout.scratch(offset.0 - base)?,
                src: self.layout.stack(offset)?,
            };
            self.push(insn);
        }
        for (offset, typ) in after.stack.iter().filter(|(offset, _)| offset.0 >= base) {
            let from = pattern
                .get(offset.0 - base)
                .ok_or_else(|| unreachable_fault!("SimpleBackend", "shuffle"))?;
            let insn = DexInstruction::Move {
                value_type: value_type(typ)?,
                dest: self.layout.stack(offset)?,
                src: self.layout.scratch(*from)?,
            };
            self.push(insn);
        }
        Ok(())
    }

    fn branch(
        &mut self,
        branch: &BranchInstruction<SynLabel>,
        before: &Frame,
    ) -> Result<(), BackendFault> {
        let pending = match branch {
            BranchInstruction::If(comparison, target) => Pending::Branch(
                PendingBranch::IfZero {
                    test: if_test(*comparison),
                    value_type: ValueType::Int,
                    src: self.operand_register(before, 0)?,
                },
                vec![*target],
            ),
            BranchInstruction::IfICmp(comparison, target) => Pending::Branch(
                PendingBranch::If {
                    test: if_test(*comparison),
                    value_type: ValueType::Int,
                    left: self.operand_register(before, 1)?,
                    right: self.operand_register(before, 0)?,
                },
                vec![*target],
            ),
            BranchInstruction::IfACmp(comparison, target) => Pending::Branch(
                PendingBranch::If {
                    test: eq_test(*comparison),
                    value_type: ValueType::Object,
                    left: self.operand_register(before, 1)?,
                    right: self.operand_register(before, 0)?,
                },
                vec![*target],
            ),
            BranchInstruction::IfNull(comparison, target) => Pending::Branch(
                PendingBranch::IfZero {
                    test: eq_test(*comparison),
                    value_type: ValueType::Object,
                    src: self.operand_register(before, 0)?,
                },
                vec![*target],
            ),
            BranchInstruction::Goto(target) => {
                Pending::Branch(PendingBranch::Goto, vec![*target])
            }
            BranchInstruction::TableSwitch {
                default,
                low,
                targets,
            } => {
                let value = self.operand_register(before, 0)?;
                self.emitted.push(Pending::Branch(
                    PendingBranch::PackedSwitch {
                        value,
                        first_key: *low,
                    },
                    targets.clone(),
                ));
                Pending::Branch(PendingBranch::Goto, vec![*default])
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                let value = self.operand_register(before, 0)?;
                self.emitted.push(Pending::Branch(
                    PendingBranch::SparseSwitch {
                        value,
                        keys: targets.iter().map(|(key, _)| *key).collect(),
                    },
                    targets.iter().map(|(_, target)| *target).collect(),
                ));
                Pending::Branch(PendingBranch::Goto, vec![*default])
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn => {
                let (src, value_type) = self.operand(before, 0)?;
                Pending::Ready(DexInstruction::Return { value_type, src })
            }
            BranchInstruction::Return => Pending::Ready(DexInstruction::ReturnVoid),
            BranchInstruction::AThrow => {
                Pending::Ready(DexInstruction::Throw(self.operand_register(before, 0)?))
            }
        };
        self.emitted.push(pending);
        Ok(())
    }

    fn address_of(&self, label: &SynLabel) -> Result<Address, BackendFault> {
        self.label_addresses
            .get(label)
            .copied()
            .ok_or_else(|| BackendFault::Invalid(format!("label {:?} is never placed", label)))
    }

    fn finish(self, code: &CfCode, ins: u16) -> Result<DexCode, BackendFault> {
        let mut instructions = Vec::with_capacity(self.emitted.len());
        for pending in &self.emitted {
            let insn = match pending {
                Pending::Ready(insn) => insn.clone(),
                Pending::Branch(branch, labels) => {
                    let targets = labels
                        .iter()
                        .map(|label| self.address_of(label))
                        .collect::<Result<Vec<_>, _>>()?;
                    branch.clone().resolve(targets)?
                }
            };
            instructions.push(insn);
        }

        let mut tries = vec![];
        for try_catch in &code.try_catches {
            let start = self.address_of(&try_catch.start)?;
            let end = self.address_of(&try_catch.end)?;
            if start >= end {
                continue;
            }
            let handlers = try_catch
                .handlers()
                .map(|(guard, target)| {
                    Ok(CatchHandler {
                        catch_type: guard.clone(),
                        target: self.address_of(target)?,
                    })
                })
                .collect::<Result<Vec<_>, BackendFault>>()?;
            tries.push(TryItem {
                start,
                end,
                handlers,
            });
        }

        let mut dex = DexCode::new(self.layout.registers_size, ins, instructions);
        dex.outs_size = self.outs_size;
        dex.tries = tries;
        Ok(dex)
    }
}

/// Frame before every reachable item of the code (`None` for unreachable items)
fn simulate_frames(
    class: &BinaryName,
    method: &ProgramMethod,
    code: &CfCode,
) -> Result<Vec<Option<Frame>>, BackendFault> {
    let len = code.items.len();
    let mut frames: Vec<Option<Frame>> = vec![None; len];
    if len == 0 {
        return Ok(frames);
    }

    let positions = code.label_positions();
    let position = |label: &SynLabel| -> Result<usize, BackendFault> {
        positions
            .get(label)
            .copied()
            .ok_or_else(|| BackendFault::Invalid(format!("label {:?} is never placed", label)))
    };
    let mut ranges = vec![];
    for try_catch in &code.try_catches {
        let start = position(&try_catch.start)?;
        let end = position(&try_catch.end)?;
        let handlers = try_catch
            .handlers()
            .map(|(guard, target)| Ok((guard.clone(), position(target)?)))
            .collect::<Result<Vec<_>, BackendFault>>()?;
        ranges.push((start, end, handlers));
    }

    frames[0] = Some(Frame::method_entry(
        class,
        &method.name,
        &method.descriptor,
        method.is_static(),
    ));
    let mut worklist = vec![0];

    let propagate = |frames: &mut Vec<Option<Frame>>,
                         worklist: &mut Vec<usize>,
                         idx: usize,
                         frame: Frame|
     -> Result<(), BackendFault> {
        let slot = frames.get_mut(idx).ok_or_else(|| {
            BackendFault::Invalid(format!("{} falls off the end of its code", method.name))
        })?;
        match slot {
            None => {
                *slot = Some(frame);
                worklist.push(idx);
            }
            Some(existing) => {
                let changed = existing.merge(&frame).map_err(|kind| {
                    BackendFault::Invalid(format!("incompatible frames: {:?}", kind))
                })?;
                if changed {
                    worklist.push(idx);
                }
            }
        }
        Ok(())
    };

    while let Some(idx) = worklist.pop() {
        let mut frame = match &frames[idx] {
            Some(frame) => frame.clone(),
            None => continue,
        };

        if !matches!(code.items[idx], CodeItem::Label(_)) {
            for (start, end, handlers) in &ranges {
                if *start <= idx && idx < *end {
                    for (guard, target) in handlers {
                        let handler_frame = frame.handler_frame(guard);
                        propagate(&mut frames, &mut worklist, *target, handler_frame)?;
                    }
                }
            }
        }

        match &code.items[idx] {
            CodeItem::Label(_) => propagate(&mut frames, &mut worklist, idx + 1, frame)?,
            CodeItem::Instruction(insn) => {
                frame
                    .verify_instruction(insn, idx, class)
                    .map_err(|kind| invalid_code(method, class, insn, kind))?;
                propagate(&mut frames, &mut worklist, idx + 1, frame)?;
            }
            CodeItem::Branch(branch) => {
                frame
                    .verify_branch_instruction(branch, &method.descriptor.return_type)
                    .map_err(|kind| invalid_code(method, class, branch, kind))?;
                for target in branch.jump_targets() {
                    let target = position(target)?;
                    propagate(&mut frames, &mut worklist, target, frame.clone())?;
                }
                if branch.falls_through() {
                    propagate(&mut frames, &mut worklist, idx + 1, frame)?;
                }
            }
        }
    }
    Ok(frames)
}

fn invalid_code<I: std::fmt::Debug, K: std::fmt::Debug>(
    method: &ProgramMethod,
    class: &BinaryName,
    insn: &I,
    kind: K,
) -> BackendFault {
    BackendFault::Invalid(format!(
        "{}: cannot type `{:?}`: {:?}",
        method.identity(class),
        insn,
        kind
    ))
}

fn value_type(typ: &VerificationType) -> Result<ValueType, BackendFault> {
    Ok(match typ {
        VerificationType::Integer => ValueType::Int,
        VerificationType::Float => ValueType::Float,
        VerificationType::Long => ValueType::Long,
        VerificationType::Double => ValueType::Double,
        VerificationType::Top => return Err(unreachable_fault!("SimpleBackend", "value_type")),
        _ => ValueType::Object,
    })
}

fn array_member(insn: &Instruction) -> Result<MemberType, BackendFault> {
    use Instruction::*;
    Ok(match insn {
        IALoad | IAStore => MemberType::Int,
        LALoad | LAStore => MemberType::Long,
        FALoad | FAStore => MemberType::Float,
        DALoad | DAStore => MemberType::Double,
        AALoad | AAStore => MemberType::Object,
        BALoad | BAStore => MemberType::BooleanOrByte,
        CALoad | CAStore => MemberType::Char,
        SALoad | SAStore => MemberType::Short,
        _ => return Err(unreachable_fault!("SimpleBackend", "array_member")),
    })
}

fn binary_op(insn: &Instruction) -> Result<(BinaryOp, NumericType), BackendFault> {
    use Instruction::*;
    use NumericType::{Double, Float, Int, Long};
    Ok(match insn {
        IAdd => (BinaryOp::Add, Int),
        LAdd => (BinaryOp::Add, Long),
        FAdd => (BinaryOp::Add, Float),
        DAdd => (BinaryOp::Add, Double),
        ISub => (BinaryOp::Sub, Int),
        LSub => (BinaryOp::Sub, Long),
        FSub => (BinaryOp::Sub, Float),
        DSub => (BinaryOp::Sub, Double),
        IMul => (BinaryOp::Mul, Int),
        LMul => (BinaryOp::Mul, Long),
        FMul => (BinaryOp::Mul, Float),
        DMul => (BinaryOp::Mul, Double),
        IDiv => (BinaryOp::Div, Int),
        LDiv => (BinaryOp::Div, Long),
        FDiv => (BinaryOp::Div, Float),
        DDiv => (BinaryOp::Div, Double),
        IRem => (BinaryOp::Rem, Int),
        LRem => (BinaryOp::Rem, Long),
        FRem => (BinaryOp::Rem, Float),
        DRem => (BinaryOp::Rem, Double),
        IAnd => (BinaryOp::And, Int),
        LAnd => (BinaryOp::And, Long),
        IOr => (BinaryOp::Or, Int),
        LOr => (BinaryOp::Or, Long),
        IXor => (BinaryOp::Xor, Int),
        LXor => (BinaryOp::Xor, Long),
        ISh(shift) => (shift_op(*shift), Int),
        LSh(shift) => (shift_op(*shift), Long),
        _ => return Err(unreachable_fault!("SimpleBackend", "binary_op")),
    })
}

fn shift_op(shift: ShiftType) -> BinaryOp {
    match shift {
        ShiftType::Left => BinaryOp::Shl,
        ShiftType::ArithmeticRight => BinaryOp::Shr,
        ShiftType::LogicalRight => BinaryOp::Ushr,
    }
}

fn unary_op(insn: &Instruction) -> Result<UnaryOp, BackendFault> {
    use Instruction::*;
    Ok(match insn {
        INeg => UnaryOp::NegInt,
        LNeg => UnaryOp::NegLong,
        FNeg => UnaryOp::NegFloat,
        DNeg => UnaryOp::NegDouble,
        I2L => UnaryOp::IntToLong,
        I2F => UnaryOp::IntToFloat,
        I2D => UnaryOp::IntToDouble,
        L2I => UnaryOp::LongToInt,
        L2F => UnaryOp::LongToFloat,
        L2D => UnaryOp::LongToDouble,
        F2I => UnaryOp::FloatToInt,
        F2L => UnaryOp::FloatToLong,
        F2D => UnaryOp::FloatToDouble,
        D2I => UnaryOp::DoubleToInt,
        D2L => UnaryOp::DoubleToLong,
        D2F => UnaryOp::DoubleToFloat,
        I2B => UnaryOp::IntToByte,
        I2C => UnaryOp::IntToChar,
        I2S => UnaryOp::IntToShort,
        _ => return Err(unreachable_fault!("SimpleBackend", "unary_op")),
    })
}

fn if_test(comparison: OrdComparison) -> IfTest {
    match comparison {
        OrdComparison::EQ => IfTest::Eq,
        OrdComparison::NE => IfTest::Ne,
        OrdComparison::LT => IfTest::Lt,
        OrdComparison::GE => IfTest::Ge,
        OrdComparison::GT => IfTest::Gt,
        OrdComparison::LE => IfTest::Le,
    }
}

fn eq_test(comparison: EqComparison) -> IfTest {
    match comparison {
        EqComparison::EQ => IfTest::Eq,
        EqComparison::NE => IfTest::Ne,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName};

    fn static_method(descriptor: &str) -> ProgramMethod {
        ProgramMethod::new(
            UnqualifiedName::from_str("test").unwrap(),
            MethodDescriptor::parse(descriptor).unwrap(),
            MethodAccessFlags::STATIC,
        )
    }

    fn stack_code(max_locals: usize, max_stack: usize, items: Vec<CodeItem>) -> CfCode {
        CfCode {
            max_locals: Offset(max_locals),
            max_stack: Offset(max_stack),
            items,
            try_catches: vec![],
        }
    }

    #[test]
    fn parameters_go_last() {
        let class = BinaryName::from_str("me/Test").unwrap();
        let code = stack_code(
            2,
            2,
            vec![
                CodeItem::Label(SynLabel::START),
                CodeItem::Instruction(Instruction::ILoad(0)),
                CodeItem::Instruction(Instruction::ILoad(1)),
                CodeItem::Instruction(Instruction::IAdd),
                CodeItem::Branch(BranchInstruction::IReturn),
            ],
        );
        let dex = build_register_code(&class, &static_method("(II)I"), &code).unwrap();

        assert_eq!(dex.registers_size, 8);
        assert_eq!(dex.ins_size, 2);
        assert_eq!(
            dex.instructions,
            vec![
                DexInstruction::Move {
                    value_type: ValueType::Int,
                    dest: Register(0),
                    src: Register(6),
                },
                DexInstruction::Move {
                    value_type: ValueType::Int,
                    dest: Register(1),
                    src: Register(7),
                },
                DexInstruction::Binary {
                    op: BinaryOp::Add,
                    operand_type: NumericType::Int,
                    dest: Register(0),
                    left: Register(0),
                    right: Register(1),
                },
                DexInstruction::Return {
                    value_type: ValueType::Int,
                    src: Register(0),
                },
            ]
        );
    }

    #[test]
    fn swaps_go_through_scratch() {
        let class = BinaryName::from_str("me/Test").unwrap();
        let code = stack_code(
            0,
            5,
            vec![
                CodeItem::Label(SynLabel::START),
                CodeItem::Instruction(Instruction::IConst1),
                CodeItem::Instruction(Instruction::LConst0),
                CodeItem::Instruction(Instruction::Dup2X1),
                CodeItem::Instruction(Instruction::Pop2),
                CodeItem::Instruction(Instruction::Pop),
                CodeItem::Instruction(Instruction::Pop2),
                CodeItem::Branch(BranchInstruction::Return),
            ],
        );
        let dex = build_register_code(&class, &static_method("()V"), &code).unwrap();

        // stack slots are v0..v4 (three slots plus the two pushed by `dup2_x1`), scratch v5..v8
        let mv = |value_type, dest, src| DexInstruction::Move {
            value_type,
            dest: Register(dest),
            src: Register(src),
        };
        assert_eq!(
            &dex.instructions[2..],
            &[
                mv(ValueType::Int, 5, 0),
                mv(ValueType::Long, 6, 1),
                mv(ValueType::Long, 0, 6),
                mv(ValueType::Int, 2, 5),
                mv(ValueType::Long, 3, 6),
                DexInstruction::ReturnVoid,
            ][..]
        );
    }

    #[test]
    fn branches_resolve_to_addresses() {
        let class = BinaryName::from_str("me/Test").unwrap();
        let done = SynLabel::START.next();
        let code = stack_code(
            1,
            1,
            vec![
                CodeItem::Label(SynLabel::START),
                CodeItem::Instruction(Instruction::ILoad(0)),
                CodeItem::Branch(BranchInstruction::If(OrdComparison::EQ, done)),
                CodeItem::Instruction(Instruction::IInc(0, 2)),
                CodeItem::Label(done),
                CodeItem::Branch(BranchInstruction::Return),
            ],
        );
        let dex = build_register_code(&class, &static_method("(I)V"), &code).unwrap();
        assert_eq!(
            dex.instructions[1],
            DexInstruction::IfZero {
                test: IfTest::Eq,
                value_type: ValueType::Int,
                src: Register(0),
                target: 3,
            }
        );
        assert_eq!(dex.instructions[3], DexInstruction::ReturnVoid);
    }

    #[test]
    fn ill_typed_code_is_rejected() {
        let class = BinaryName::from_str("me/Test").unwrap();
        let code = stack_code(
            1,
            1,
            vec![
                CodeItem::Label(SynLabel::START),
                CodeItem::Instruction(Instruction::FLoad(0)),
                CodeItem::Branch(BranchInstruction::Return),
            ],
        );
        assert!(matches!(
            build_register_code(&class, &static_method("(I)V"), &code),
            Err(BackendFault::Invalid(_))
        ));
    }
}
