use crate::dex::{
    Address, ArrayDataPayload, DexCode, DexInstruction, Register, TryItem, ValueType,
};
use crate::jvm::code::{CfCode, CodeBuilder, CodeBuilderExts, Instruction, SynLabel, TryCatch};
use crate::jvm::verifier::VerificationType;
use crate::jvm::{BinaryName, FieldType, Name};
use crate::lower::{array_fill, InstructionTranslator, LoweringError, LoweringSink, RegisterSource};
use crate::model::ProgramMethod;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// State of the lowering of one method body
///
/// Registers are mapped onto locals so that the incoming arguments (the last `ins_size`
/// registers) land where the JVM expects parameters, and every other register comes after them.
pub struct MethodLowering<'a> {
    code: CodeBuilder,
    dex: &'a DexCode,
    return_type: Option<FieldType>,

    /// Label of every instruction starting a basic block
    labels: HashMap<Address, SynLabel>,
}

impl<'a> MethodLowering<'a> {
    /// Code builder for the method, for pushing instructions directly
    pub fn code(&mut self) -> &mut CodeBuilder {
        &mut self.code
    }

    /// Register-form body being lowered
    pub fn dex_code(&self) -> &DexCode {
        self.dex
    }

    pub fn return_type(&self) -> &Option<FieldType> {
        &self.return_type
    }

    /// Label of an instruction starting a basic block
    pub fn label(&self, address: Address) -> Result<SynLabel, LoweringError> {
        self.labels
            .get(&address)
            .copied()
            .ok_or(LoweringError::InvalidAddress(address))
    }

    /// Local variable holding a register
    pub fn local_index(&self, register: Register) -> Result<u16, LoweringError> {
        let first_parameter = self.dex.first_parameter_register();
        let index = if register.0 >= first_parameter {
            Some(register.0 - first_parameter)
        } else {
            register.0.checked_add(self.dex.ins_size)
        };
        index.ok_or(LoweringError::InvalidRegister {
            register,
            registers_size: self.dex.registers_size,
        })
    }

    /// Pop the top of the stack into a register (or register pair)
    pub fn store_register(
        &mut self,
        register: Register,
        value_type: ValueType,
    ) -> Result<(), LoweringError> {
        let local = self.local_index(register)?;
        self.code.set_local(local, &value_type.as_field_type())?;
        Ok(())
    }
}

impl<'a> LoweringSink for MethodLowering<'a> {
    fn append_instruction(&mut self, insn: Instruction) -> Result<(), LoweringError> {
        self.code.push_instruction(insn)?;
        Ok(())
    }

    fn resolve_payload(&self, offset: u32) -> Result<ArrayDataPayload, LoweringError> {
        let payload = self
            .dex
            .array_payload(offset)
            .ok_or(LoweringError::MissingPayload { offset })??;
        Ok(payload)
    }
}

impl<'a> RegisterSource for MethodLowering<'a> {
    fn load_register(
        &mut self,
        register: Register,
        value_type: ValueType,
    ) -> Result<(), LoweringError> {
        let local = self.local_index(register)?;
        self.code.get_local(local, &value_type.as_field_type())?;
        Ok(())
    }

    fn register_type(&self, register: Register) -> Option<VerificationType> {
        let local = self.local_index(register).ok()?;
        self.code.current_frame()?.local(local).cloned()
    }
}

/// Lower a register-form method body into stack code
///
/// Basic blocks are built breadth-first from the entry, so every block (except the targets of
/// backwards jumps) is started once its frame is known. Each instruction covered by a try range
/// gets its own exception table entry: merging adjacent entries is left to a later pass.
pub fn lower_method(
    class: &BinaryName,
    method: &ProgramMethod,
    dex: &DexCode,
    translator: &dyn InstructionTranslator,
) -> Result<CfCode, LoweringError> {
    let expected_ins = method.parameter_slots();
    if dex.ins_size as usize != expected_ins || dex.ins_size > dex.registers_size {
        return Err(LoweringError::ParameterCount {
            ins_size: dex.ins_size,
            expected: expected_ins,
        });
    }
    if dex.instructions.is_empty() {
        return Err(LoweringError::InvalidAddress(0));
    }
    validate_registers(dex)?;
    validate_tries(dex)?;

    let instructions = &dex.instructions;
    let handler_addresses: HashSet<Address> = dex
        .tries
        .iter()
        .flat_map(|try_item| try_item.handlers.iter().map(|handler| handler.target))
        .collect();
    let leaders = find_leaders(dex, &handler_addresses);

    let mut code = CodeBuilder::new(
        class.clone(),
        &method.name,
        &method.descriptor,
        method.is_static(),
        SynLabel::START,
    );
    let mut labels = HashMap::new();
    for leader in &leaders {
        let label = if *leader == 0 {
            SynLabel::START
        } else {
            code.fresh_label()
        };
        labels.insert(*leader, label);
    }
    let layout: Vec<SynLabel> = leaders.iter().map(|leader| labels[leader]).collect();

    let mut lowering = MethodLowering {
        code,
        dex,
        return_type: method.descriptor.return_type.clone(),
        labels,
    };

    let mut worklist: VecDeque<Address> = VecDeque::new();
    let mut visited: HashSet<Address> = HashSet::new();
    worklist.push_back(0);

    while let Some(block_start) = worklist.pop_front() {
        if !visited.insert(block_start) {
            continue;
        }
        let block_label = lowering.label(block_start)?;
        lowering.code.start_block(block_label)?;

        // Handlers start with the exception on the stack
        if handler_addresses.contains(&block_start)
            && !matches!(
                instructions[block_start as usize],
                DexInstruction::MoveException { .. }
            )
        {
            lowering.code.pop()?;
        }

        let mut address = block_start;
        loop {
            let insn = &instructions[address as usize];
            let try_item = dex.try_covering(address);

            lower_instruction(&mut lowering, translator, address, insn, try_item)?;

            let next = address + 1;
            if insn.has_result()
                && !matches!(
                    instructions.get(next as usize),
                    Some(DexInstruction::MoveResult { .. })
                )
            {
                lowering.code.pop()?;
            }

            worklist.extend(insn.branch_targets());
            if let Some(try_item) = try_item {
                worklist.extend(try_item.handlers.iter().map(|handler| handler.target));
            }

            if !insn.falls_through() {
                break;
            }
            if next as usize >= instructions.len() {
                return Err(LoweringError::InvalidAddress(next));
            }
            if leaders.contains(&next) {
                let next_label = lowering.label(next)?;
                lowering.code.fall_through(next_label)?;
                worklist.push_back(next);
                break;
            }
            address = next;
        }
    }

    log::trace!(
        "lowered {}.{} ({} blocks)",
        class.as_str(),
        method.name.as_str(),
        visited.len()
    );
    Ok(lowering.code.result(&layout)?)
}

/// Lower one instruction, wrapping it in its own exception range if it is covered by a try
fn lower_instruction(
    lowering: &mut MethodLowering<'_>,
    translator: &dyn InstructionTranslator,
    address: Address,
    insn: &DexInstruction,
    try_item: Option<&TryItem>,
) -> Result<(), LoweringError> {
    let try_item = match try_item {
        Some(try_item) if *insn != DexInstruction::Nop => try_item,
        _ => return dispatch(lowering, translator, address, insn),
    };

    let mut guards = vec![];
    let mut targets = vec![];
    for handler in &try_item.handlers {
        guards.push(handler.catch_type.clone());
        targets.push(lowering.label(handler.target)?);
    }

    let start = lowering.code.fresh_label();
    lowering.code.place_label(start)?;
    for (guard, target) in guards.iter().zip(&targets) {
        lowering.code.add_exception_edge(*target, guard)?;
    }

    dispatch(lowering, translator, address, insn)?;

    for (guard, target) in guards.iter().zip(&targets) {
        lowering.code.add_exception_edge(*target, guard)?;
    }
    let end = lowering.code.fresh_label();
    lowering.code.place_label(end)?;
    lowering
        .code
        .add_try_catch(TryCatch::new(start, end, guards, targets));
    Ok(())
}

/// Route the bulk array instructions to their expansions and everything else to the translator
fn dispatch(
    lowering: &mut MethodLowering<'_>,
    translator: &dyn InstructionTranslator,
    address: Address,
    insn: &DexInstruction,
) -> Result<(), LoweringError> {
    match insn {
        DexInstruction::FilledNewArray {
            array_type,
            registers,
        } => array_fill::lower_filled_new_array(lowering, array_type, registers),
        DexInstruction::FilledNewArrayRange {
            array_type,
            start,
            count,
        } => array_fill::lower_filled_new_array_range(lowering, array_type, *start, *count),
        DexInstruction::FillArrayData {
            array,
            payload_offset,
        } => array_fill::lower_fill_array_data(lowering, *array, *payload_offset),
        _ => translator.translate(lowering, address, insn),
    }
}

/// Addresses starting basic blocks (sorted)
fn find_leaders(dex: &DexCode, handler_addresses: &HashSet<Address>) -> BTreeSet<Address> {
    let len = dex.instructions.len() as Address;
    let mut leaders = BTreeSet::new();
    leaders.insert(0);
    for (address, insn) in dex.instructions.iter().enumerate() {
        let address = address as Address;
        leaders.extend(insn.branch_targets().into_iter().filter(|target| *target < len));
        if insn.ends_block() && address + 1 < len {
            leaders.insert(address + 1);
        }
    }
    leaders.extend(handler_addresses.iter().copied());
    leaders
}

/// Every register (including the second half of wide values) must be in the frame
pub(crate) fn validate_registers(dex: &DexCode) -> Result<(), LoweringError> {
    for insn in &dex.instructions {
        for (register, width) in insn.registers() {
            let last = register.0 as usize + width - 1;
            if last >= dex.registers_size as usize {
                return Err(LoweringError::InvalidRegister {
                    register,
                    registers_size: dex.registers_size,
                });
            }
        }
    }
    Ok(())
}

/// Branches must land on an instruction of the method
pub(crate) fn validate_branch_targets(dex: &DexCode) -> Result<(), LoweringError> {
    let len = dex.instructions.len() as Address;
    for insn in &dex.instructions {
        if let Some(target) = insn.branch_targets().into_iter().find(|target| *target >= len) {
            return Err(LoweringError::InvalidAddress(target));
        }
    }
    Ok(())
}

/// Try ranges and their handlers must be inside the method
pub(crate) fn validate_tries(dex: &DexCode) -> Result<(), LoweringError> {
    let len = dex.instructions.len() as Address;
    for try_item in &dex.tries {
        if try_item.start > try_item.end || try_item.end > len {
            return Err(LoweringError::InvalidAddress(try_item.end));
        }
        for handler in &try_item.handlers {
            if handler.target >= len {
                return Err(LoweringError::InvalidAddress(handler.target));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dex::{
        BinaryOp, CatchHandler, ConstValue, IfTest, InvokeKind, MemberType, NumericType,
    };
    use crate::jvm::code::{BranchInstruction, CodeItem, OrdComparison};
    use crate::jvm::{
        BaseType, MethodAccessFlags, MethodDescriptor, MethodRef, Name, ParseDescriptor,
        UnqualifiedName,
    };
    use crate::lower::StandardTranslator;
    use crate::model::MethodCode;

    fn static_method(descriptor: &str) -> ProgramMethod {
        ProgramMethod::new(
            UnqualifiedName::from_str("test").unwrap(),
            MethodDescriptor::parse(descriptor).unwrap(),
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        )
    }

    fn lower(descriptor: &str, dex: &DexCode) -> Result<CfCode, LoweringError> {
        let class = BinaryName::from_str("me/Test").unwrap();
        let method = static_method(descriptor).with_code(MethodCode::Register(dex.clone()));
        lower_method(&class, &method, dex, &StandardTranslator)
    }

    fn straight_line(code: &CfCode) -> Vec<Instruction> {
        code.items
            .iter()
            .filter_map(|item| match item {
                CodeItem::Instruction(insn) => Some(insn.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parameters_map_to_leading_locals() {
        let dex = DexCode::new(
            3,
            2,
            vec![
                DexInstruction::Binary {
                    op: BinaryOp::Add,
                    operand_type: NumericType::Int,
                    dest: Register(0),
                    left: Register(1),
                    right: Register(2),
                },
                DexInstruction::Return {
                    value_type: ValueType::Int,
                    src: Register(0),
                },
            ],
        );
        let code = lower("(II)I", &dex).unwrap();

        use Instruction::*;
        assert_eq!(
            code.items,
            vec![
                CodeItem::Label(SynLabel::START),
                CodeItem::Instruction(ILoad(0)),
                CodeItem::Instruction(ILoad(1)),
                CodeItem::Instruction(IAdd),
                CodeItem::Instruction(IStore(2)),
                CodeItem::Instruction(ILoad(2)),
                CodeItem::Branch(BranchInstruction::IReturn),
            ]
        );
        assert_eq!(code.max_locals.0, 3);
        assert_eq!(code.max_stack.0, 2);
    }

    #[test]
    fn loops_and_branches() {
        let dex = DexCode::new(
            1,
            1,
            vec![
                DexInstruction::IfZero {
                    test: IfTest::Le,
                    value_type: ValueType::Int,
                    src: Register(0),
                    target: 3,
                },
                DexInstruction::BinaryLiteral {
                    op: BinaryOp::Add,
                    dest: Register(0),
                    src: Register(0),
                    literal: -1,
                },
                DexInstruction::Goto(0),
                DexInstruction::ReturnVoid,
            ],
        );
        let code = lower("(I)V", &dex).unwrap();

        use Instruction::*;
        assert_eq!(
            straight_line(&code),
            vec![ILoad(0), ILoad(0), IConstM1, IAdd, IStore(0)]
        );
        assert!(code.items.iter().any(|item| matches!(
            item,
            CodeItem::Branch(BranchInstruction::Goto(target)) if *target == SynLabel::START
        )));
        assert!(code.items.iter().any(|item| matches!(
            item,
            CodeItem::Branch(BranchInstruction::If(OrdComparison::LE, _))
        )));
        assert_eq!(
            code.items.last(),
            Some(&CodeItem::Branch(BranchInstruction::Return))
        );
    }

    #[test]
    fn covered_instructions_get_ranges() {
        let callee = MethodRef {
            class: BinaryName::from_str("me/Test").unwrap(),
            name: UnqualifiedName::from_str("callee").unwrap(),
            descriptor: MethodDescriptor::parse("()V").unwrap(),
            is_interface: false,
        };
        let invoke = DexInstruction::Invoke {
            kind: InvokeKind::Static,
            method: callee,
            args: vec![],
        };
        let mut dex = DexCode::new(
            1,
            0,
            vec![
                invoke.clone(),
                invoke,
                DexInstruction::ReturnVoid,
                DexInstruction::MoveException { dest: Register(0) },
                DexInstruction::Throw(Register(0)),
            ],
        );
        dex.tries.push(TryItem {
            start: 0,
            end: 2,
            handlers: vec![CatchHandler {
                catch_type: None,
                target: 3,
            }],
        });
        let code = lower("()V", &dex).unwrap();

        assert_eq!(code.try_catches.len(), 2);
        assert!(code.try_catches[0].same_handlers(&code.try_catches[1]));
        assert_eq!(code.try_catches[0].guards, vec![None]);

        let positions = code.label_positions();
        assert!(CfCode::labels_adjacent(
            &positions,
            code.try_catches[0].end,
            code.try_catches[1].start
        ));
        assert!(straight_line(&code).contains(&Instruction::AStore(0)));
    }

    #[test]
    fn unused_results_are_popped() {
        let callee = MethodRef {
            class: BinaryName::from_str("me/Test").unwrap(),
            name: UnqualifiedName::from_str("callee").unwrap(),
            descriptor: MethodDescriptor::parse("()J").unwrap(),
            is_interface: false,
        };
        let dex = DexCode::new(
            0,
            0,
            vec![
                DexInstruction::Invoke {
                    kind: InvokeKind::Static,
                    method: callee,
                    args: vec![],
                },
                DexInstruction::ReturnVoid,
            ],
        );
        let code = lower("()V", &dex).unwrap();
        assert_eq!(straight_line(&code).last(), Some(&Instruction::Pop2));
    }

    #[test]
    fn filled_array_feeds_move_result() {
        let dex = DexCode::new(
            3,
            2,
            vec![
                DexInstruction::FilledNewArray {
                    array_type: String::from("[I"),
                    registers: vec![Register(1), Register(2)],
                },
                DexInstruction::MoveResult {
                    value_type: ValueType::Object,
                    dest: Register(0),
                },
                DexInstruction::ArrayGet {
                    member: MemberType::Int,
                    dest: Register(1),
                    array: Register(0),
                    index: Register(2),
                },
                DexInstruction::Return {
                    value_type: ValueType::Object,
                    src: Register(0),
                },
            ],
        );
        let code = lower("(II)[I", &dex).unwrap();

        use Instruction::*;
        assert_eq!(
            straight_line(&code),
            vec![
                ILoad(1),
                ILoad(0),
                IConst2,
                NewArray(BaseType::Int),
                Dup,
                Dup2X1,
                Pop2,
                IConst0,
                Swap,
                IAStore,
                Dup,
                Dup2X1,
                Pop2,
                IConst1,
                Swap,
                IAStore,
                AStore(2),
                ALoad(2),
                ILoad(1),
                IALoad,
                IStore(0),
                ALoad(2),
            ]
        );
    }

    #[test]
    fn malformed_bodies() {
        let out_of_range = DexCode::new(
            1,
            0,
            vec![DexInstruction::Move {
                value_type: ValueType::Long,
                dest: Register(0),
                src: Register(0),
            }],
        );
        assert!(matches!(
            lower("()V", &out_of_range),
            Err(LoweringError::InvalidRegister {
                register: Register(0),
                registers_size: 1
            })
        ));

        let falls_off = DexCode::new(
            1,
            0,
            vec![DexInstruction::Const {
                dest: Register(0),
                value: ConstValue::Int(1),
            }],
        );
        assert!(matches!(
            lower("()V", &falls_off),
            Err(LoweringError::InvalidAddress(1))
        ));

        assert!(matches!(
            lower("(J)V", &DexCode::new(1, 1, vec![DexInstruction::ReturnVoid])),
            Err(LoweringError::ParameterCount {
                ins_size: 1,
                expected: 2
            })
        ));

        let custom = DexCode::new(
            0,
            0,
            vec![DexInstruction::InvokeCustom {
                call_site: String::from("site0"),
                args: vec![],
            }],
        );
        assert!(matches!(
            lower("()V", &custom),
            Err(LoweringError::UnsupportedInstruction { address: 0, .. })
        ));
    }

    #[test]
    fn mistyped_register_read_is_rejected() {
        let dex = DexCode::new(
            1,
            1,
            vec![DexInstruction::Return {
                value_type: ValueType::Int,
                src: Register(0),
            }],
        );
        assert!(matches!(
            lower("(F)I", &dex),
            Err(LoweringError::Bytecode(_))
        ));
    }
}
