use super::*;
use crate::jvm::code::{BranchInstruction, Instruction, InvokeType};
use crate::jvm::{
    BaseType, BinaryName, ConstantData, FieldType, MethodDescriptor, RefType, UnqualifiedName,
    VerifierErrorKind,
};
use crate::util::{Offset, OffsetVec, Width};

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Besides just being able to tell what types are in which local variable (which is what
/// instruction selection keys off of), tracking frames lets us validate that the bytecode being
/// created is well-formed.
///
/// Locals are indexed by slot: a `long` or `double` in local `n` is followed by `Top` in `n + 1`.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables in scope
    pub locals: Vec<VerificationType>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType>,
}

impl Frame {
    /// Initial frame of a method (where the locals are just the parameters, including `this`)
    pub fn method_entry(
        this_class: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
        is_static: bool,
    ) -> Frame {
        let mut frame = Frame::default();
        if !is_static {
            frame.locals.push(if *name == UnqualifiedName::INIT {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(RefType::Object(this_class.clone()))
            });
        }
        for parameter in &descriptor.parameters {
            let offset = frame.locals.len();
            frame.set_local(offset, VerificationType::from(parameter));
        }
        frame
    }

    /// Entry frame of an exception handler covering code where the locals are as in this frame
    pub fn handler_frame(&self, caught: &Option<BinaryName>) -> Frame {
        let caught = caught.clone().unwrap_or(BinaryName::THROWABLE);
        let mut stack = OffsetVec::new();
        stack.push(VerificationType::Object(RefType::Object(caught)));
        Frame {
            locals: self.locals.clone(),
            stack,
        }
    }

    /// Type of a local variable
    pub fn local(&self, index: u16) -> Option<&VerificationType> {
        self.locals.get(index as usize)
    }

    /// Overwrite the type of a local variable, growing the locals if needed
    pub fn set_local(&mut self, index: usize, typ: VerificationType) {
        let width = typ.width();
        if self.locals.len() < index + width {
            self.locals.resize(index + width, VerificationType::Top);
        }

        // Overwriting the second half of a wide value kills the wide value
        if index > 0 && self.locals[index - 1].width() == 2 {
            self.locals[index - 1] = VerificationType::Top;
        }
        // Overwriting the first half of a wide value leaves a dangling second half
        if width == 1 && self.locals[index].width() == 2 && index + 1 < self.locals.len() {
            self.locals[index + 1] = VerificationType::Top;
        }

        self.locals[index] = typ;
        if width == 2 {
            self.locals[index + 1] = VerificationType::Top;
        }
    }

    /// Merge another frame reaching the same point into this one
    ///
    /// Returns whether this frame changed. Stacks have to agree in shape; locals that disagree
    /// become unusable.
    pub fn merge(&mut self, other: &Frame) -> Result<bool, VerifierErrorKind> {
        if self.stack.len() != other.stack.len() {
            return Err(VerifierErrorKind::InvalidWidth(other.stack.offset_len().0));
        }
        let mut merged_stack = OffsetVec::new();
        for ((_, t1), (_, t2)) in self.stack.iter().zip(other.stack.iter()) {
            let merged = t1.merge(t2);
            if merged == VerificationType::Top {
                return Err(VerifierErrorKind::IncompatibleTypes(t1.clone(), t2.clone()));
            }
            merged_stack.push(merged);
        }

        let len = self.locals.len().min(other.locals.len());
        let merged_locals: Vec<VerificationType> = (0..len)
            .map(|idx| self.locals[idx].merge(&other.locals[idx]))
            .collect();

        let merged = Frame {
            locals: merged_locals,
            stack: merged_stack,
        };
        let changed = merged != *self;
        *self = merged;
        Ok(changed)
    }

    /// Update the frame to reflect the effects of the given (non-branching) instruction
    ///
    /// `site` is a method-unique number for the instruction, used to tell apart objects created
    /// by different `new` instructions.
    pub fn verify_instruction(
        &mut self,
        insn: &Instruction,
        site: usize,
        this_class: &BinaryName,
    ) -> Result<(), VerifierErrorKind> {
        verify_instruction(self, insn, site, this_class)
    }

    /// Update the frame to reflect the effects of the given branching instruction
    pub fn verify_branch_instruction<Lbl>(
        &mut self,
        insn: &BranchInstruction<Lbl>,
        this_method_return_type: &Option<FieldType>,
    ) -> Result<(), VerifierErrorKind> {
        verify_branch_instruction(self, this_method_return_type, insn)
    }

    /// Update the maximum locals and stack
    ///
    /// Only has an effect if the size of the locals or the size of the stack is greater than the
    /// previous maximum values.
    pub fn update_maximums(&self, max_locals: &mut Offset, max_stack: &mut Offset) {
        max_locals.0 = max_locals.0.max(self.locals.len());
        max_stack.0 = max_stack.0.max(self.stack.offset_len().0);
    }
}

type VType = VerificationType;

fn verify_instruction(
    frame: &mut Frame,
    insn: &Instruction,
    site: usize,
    this_class: &BinaryName,
) -> Result<(), VerifierErrorKind> {
    use Instruction::*;
    use VerificationType::*;

    match insn {
        Nop => (),
        AConstNull => {
            frame.stack.push(Null);
        }
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
            frame.stack.push(Integer);
        }
        LConst0 | LConst1 => {
            frame.stack.push(Long);
        }
        FConst0 | FConst1 | FConst2 => {
            frame.stack.push(Float);
        }
        DConst0 | DConst1 => {
            frame.stack.push(Double);
        }
        BiPush(_) | SiPush(_) => {
            frame.stack.push(Integer);
        }
        Ldc(constant) => {
            frame.stack.push(match constant {
                ConstantData::String(_) => Object(RefType::STRING),
                ConstantData::Class(_) => Object(RefType::CLASS),
                ConstantData::Integer(_) => Integer,
                ConstantData::Float(_) => Float,
                ConstantData::Long(_) | ConstantData::Double(_) => {
                    return Err(VerifierErrorKind::InvalidWidth(2))
                }
            });
        }
        Ldc2(constant) => {
            frame.stack.push(match constant {
                ConstantData::Long(_) => Long,
                ConstantData::Double(_) => Double,
                _ => return Err(VerifierErrorKind::InvalidWidth(1)),
            });
        }

        ILoad(idx) => load(frame, *idx, Integer)?,
        LLoad(idx) => load(frame, *idx, Long)?,
        FLoad(idx) => load(frame, *idx, Float)?,
        DLoad(idx) => load(frame, *idx, Double)?,
        ALoad(idx) => {
            let typ = frame
                .local(*idx)
                .cloned()
                .ok_or(VerifierErrorKind::InvalidIndex)?;
            if !typ.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            frame.stack.push(typ);
        }

        IALoad => array_load(frame, &[BaseType::Int], Integer)?,
        LALoad => array_load(frame, &[BaseType::Long], Long)?,
        FALoad => array_load(frame, &[BaseType::Float], Float)?,
        DALoad => array_load(frame, &[BaseType::Double], Double)?,
        BALoad => array_load(frame, &[BaseType::Byte, BaseType::Boolean], Integer)?,
        CALoad => array_load(frame, &[BaseType::Char], Integer)?,
        SALoad => array_load(frame, &[BaseType::Short], Integer)?,
        AALoad => {
            pop_expecting_type(&mut frame.stack, Integer)?;
            let member = match pop(&mut frame.stack)? {
                Null => Null,
                Object(array_type) => match array_type.array_member_type() {
                    Some(FieldType::Ref(member)) => Object(member),
                    _ => return Err(VerifierErrorKind::NotArrayType),
                },
                _ => return Err(VerifierErrorKind::NotArrayType),
            };
            frame.stack.push(member);
        }

        IStore(idx) => store(frame, *idx, Integer)?,
        LStore(idx) => store(frame, *idx, Long)?,
        FStore(idx) => store(frame, *idx, Float)?,
        DStore(idx) => store(frame, *idx, Double)?,
        AStore(idx) => {
            let typ = pop(&mut frame.stack)?;
            if !typ.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            frame.set_local(*idx as usize, typ);
        }

        IAStore => array_store(frame, &[BaseType::Int], Integer)?,
        LAStore => array_store(frame, &[BaseType::Long], Long)?,
        FAStore => array_store(frame, &[BaseType::Float], Float)?,
        DAStore => array_store(frame, &[BaseType::Double], Double)?,
        BAStore => array_store(frame, &[BaseType::Byte, BaseType::Boolean], Integer)?,
        CAStore => array_store(frame, &[BaseType::Char], Integer)?,
        SAStore => array_store(frame, &[BaseType::Short], Integer)?,
        AAStore => {
            let value = pop(&mut frame.stack)?;
            if !value.is_initialized_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            pop_expecting_type(&mut frame.stack, Integer)?;
            match pop(&mut frame.stack)? {
                Null => (),
                Object(array_type) => match array_type.array_member_type() {
                    Some(FieldType::Ref(_)) => (),
                    _ => return Err(VerifierErrorKind::NotArrayType),
                },
                _ => return Err(VerifierErrorKind::NotArrayType),
            }
        }

        Pop => {
            pop_expecting_width(&mut frame.stack, 1)?;
        }

        Pop2 => {
            let arg1 = pop(&mut frame.stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    pop_expecting_width(&mut frame.stack, 1)?;
                }

                // Form 2
                2 => (),

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup => {
            let arg1 = pop_expecting_width(&mut frame.stack, 1)?;
            push_all(&mut frame.stack, [&arg1, &arg1]);
        }

        DupX1 => {
            let arg1 = pop_expecting_width(&mut frame.stack, 1)?;
            let arg2 = pop_expecting_width(&mut frame.stack, 1)?;
            push_all(&mut frame.stack, [&arg1, &arg2, &arg1]);
        }

        DupX2 => {
            let arg1 = pop_expecting_width(&mut frame.stack, 1)?;
            let arg2 = pop(&mut frame.stack)?;
            match arg2.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(&mut frame.stack, 1)?;
                    push_all(&mut frame.stack, [&arg1, &arg3, &arg2, &arg1]);
                }

                // Form 2
                2 => push_all(&mut frame.stack, [&arg1, &arg2, &arg1]),

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2 => {
            let arg1 = pop(&mut frame.stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_expecting_width(&mut frame.stack, 1)?;
                    push_all(&mut frame.stack, [&arg2, &arg1, &arg2, &arg1]);
                }

                // Form 2
                2 => push_all(&mut frame.stack, [&arg1, &arg1]),

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X1 => {
            let arg1 = pop(&mut frame.stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_expecting_width(&mut frame.stack, 1)?;
                    let arg3 = pop_expecting_width(&mut frame.stack, 1)?;
                    push_all(&mut frame.stack, [&arg2, &arg1, &arg3, &arg2, &arg1]);
                }

                // Form 2
                2 => {
                    let arg2 = pop_expecting_width(&mut frame.stack, 1)?;
                    push_all(&mut frame.stack, [&arg1, &arg2, &arg1]);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X2 => {
            let arg1 = pop(&mut frame.stack)?;
            match arg1.width() {
                1 => {
                    let arg2 = pop_expecting_width(&mut frame.stack, 1)?;
                    let arg3 = pop(&mut frame.stack)?;
                    match arg3.width() {
                        // Form 1
                        1 => {
                            let arg4 = pop_expecting_width(&mut frame.stack, 1)?;
                            push_all(
                                &mut frame.stack,
                                [&arg2, &arg1, &arg4, &arg3, &arg2, &arg1],
                            );
                        }

                        // Form 3
                        2 => push_all(&mut frame.stack, [&arg2, &arg1, &arg3, &arg2, &arg1]),

                        other => return Err(VerifierErrorKind::InvalidWidth(other)),
                    }
                }

                2 => {
                    let arg2 = pop(&mut frame.stack)?;
                    match arg2.width() {
                        // Form 2
                        1 => {
                            let arg3 = pop_expecting_width(&mut frame.stack, 1)?;
                            push_all(&mut frame.stack, [&arg1, &arg3, &arg2, &arg1]);
                        }

                        // Form 4
                        2 => push_all(&mut frame.stack, [&arg1, &arg2, &arg1]),

                        other => return Err(VerifierErrorKind::InvalidWidth(other)),
                    }
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Swap => {
            let arg1 = pop_expecting_width(&mut frame.stack, 1)?;
            let arg2 = pop_expecting_width(&mut frame.stack, 1)?;
            push_all(&mut frame.stack, [&arg1, &arg2]);
        }

        IAdd | ISub | IDiv | IMul | IRem | IAnd | IOr | IXor | ISh(_) => {
            binary(&mut frame.stack, Integer, Integer)?
        }
        LAdd | LSub | LDiv | LMul | LRem | LAnd | LOr | LXor => {
            binary(&mut frame.stack, Long, Long)?
        }
        FAdd | FSub | FDiv | FMul | FRem => binary(&mut frame.stack, Float, Float)?,
        DAdd | DSub | DDiv | DMul | DRem => binary(&mut frame.stack, Double, Double)?,
        LSh(_) => {
            pop_expecting_type(&mut frame.stack, Integer)?;
            unary(&mut frame.stack, Long, Long)?;
        }

        INeg | I2B | I2C | I2S => unary(&mut frame.stack, Integer, Integer)?,
        LNeg => unary(&mut frame.stack, Long, Long)?,
        FNeg => unary(&mut frame.stack, Float, Float)?,
        DNeg => unary(&mut frame.stack, Double, Double)?,
        I2L => unary(&mut frame.stack, Integer, Long)?,
        I2F => unary(&mut frame.stack, Integer, Float)?,
        I2D => unary(&mut frame.stack, Integer, Double)?,
        L2I => unary(&mut frame.stack, Long, Integer)?,
        L2F => unary(&mut frame.stack, Long, Float)?,
        L2D => unary(&mut frame.stack, Long, Double)?,
        F2I => unary(&mut frame.stack, Float, Integer)?,
        F2L => unary(&mut frame.stack, Float, Long)?,
        F2D => unary(&mut frame.stack, Float, Double)?,
        D2I => unary(&mut frame.stack, Double, Integer)?,
        D2L => unary(&mut frame.stack, Double, Long)?,
        D2F => unary(&mut frame.stack, Double, Float)?,

        IInc(idx, _) => {
            if frame.local(*idx) != Some(&Integer) {
                return Err(VerifierErrorKind::InvalidType);
            }
        }

        LCmp => binary(&mut frame.stack, Long, Integer)?,
        FCmp(_) => binary(&mut frame.stack, Float, Integer)?,
        DCmp(_) => binary(&mut frame.stack, Double, Integer)?,

        GetStatic(field) => {
            frame.stack.push(VType::from(&field.descriptor));
        }
        PutStatic(field) => {
            pop_assignable(&mut frame.stack, &VType::from(&field.descriptor))?;
        }
        GetField(field) => {
            pop_receiver(&mut frame.stack, true)?;
            frame.stack.push(VType::from(&field.descriptor));
        }
        PutField(field) => {
            pop_assignable(&mut frame.stack, &VType::from(&field.descriptor))?;
            pop_receiver(&mut frame.stack, true)?;
        }

        Invoke(invoke_type, method) => {
            let desc = &method.descriptor;
            for expected_arg_type in desc.parameters.iter().rev() {
                let found = pop(&mut frame.stack)?;
                let expected = VType::from(expected_arg_type);
                if !VerificationType::is_assignable(&found, &expected) {
                    log::debug!(
                        "Incompatible argument types: found {:?} but expected {:?} (for {})",
                        found,
                        expected,
                        method,
                    );
                    return Err(VerifierErrorKind::IncompatibleTypes(found, expected));
                }
            }

            let is_init = method.name == UnqualifiedName::INIT;
            match (invoke_type, is_init) {
                (InvokeType::Special, true) => {
                    let uninitialized = pop(&mut frame.stack)?;
                    let initialized = match &uninitialized {
                        UninitializedThis => Object(RefType::Object(this_class.clone())),
                        Uninitialized(uninit) => Object(RefType::Object(uninit.class.clone())),
                        _ => return Err(VerifierErrorKind::InvalidType),
                    };
                    if desc.return_type.is_some() {
                        return Err(VerifierErrorKind::InvalidType);
                    }
                    replace_uninitialized(frame, &uninitialized, &initialized);
                }
                (InvokeType::Static, _) => (),
                (_, true) => return Err(VerifierErrorKind::InvalidType),
                (_, false) => pop_receiver(&mut frame.stack, false)?,
            }

            if let Some(return_type) = &desc.return_type {
                frame.stack.push(VType::from(return_type));
            }
        }

        New(class) => {
            frame.stack.push(Uninitialized(UninitializedRefType {
                class: class.clone(),
                site,
            }));
        }
        NewArray(base_type) => {
            pop_expecting_type(&mut frame.stack, Integer)?;
            frame
                .stack
                .push(Object(RefType::array(FieldType::Base(*base_type))));
        }
        ANewArray(ref_type) => {
            pop_expecting_type(&mut frame.stack, Integer)?;
            frame
                .stack
                .push(Object(RefType::array(FieldType::Ref(ref_type.clone()))));
        }
        ArrayLength => {
            match pop(&mut frame.stack)? {
                Null => (),
                Object(array_type) if array_type.is_array() => (),
                _ => return Err(VerifierErrorKind::NotArrayType),
            }
            frame.stack.push(Integer);
        }

        CheckCast(ref_type) => {
            if !pop(&mut frame.stack)?.is_initialized_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            frame.stack.push(Object(ref_type.clone()));
        }
        InstanceOf(_) => {
            if !pop(&mut frame.stack)?.is_initialized_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            frame.stack.push(Integer);
        }
        MonitorEnter | MonitorExit => {
            if !pop(&mut frame.stack)?.is_initialized_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
    }

    Ok(())
}

fn verify_branch_instruction<Lbl>(
    frame: &mut Frame,
    this_method_return_type: &Option<FieldType>,
    insn: &BranchInstruction<Lbl>,
) -> Result<(), VerifierErrorKind> {
    use BranchInstruction::*;
    use VerificationType::*;

    let stack = &mut frame.stack;
    match insn {
        If(_, _) => pop_expecting_type(stack, Integer)?,
        IfICmp(_, _) => {
            pop_expecting_type(stack, Integer)?;
            pop_expecting_type(stack, Integer)?;
        }
        IfACmp(_, _) => {
            let atype_1 = pop(stack)?;
            let atype_2 = pop(stack)?;
            if !atype_1.is_reference() || !atype_2.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        IfNull(_, _) => {
            if !pop(stack)?.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        Goto(_) => (),
        TableSwitch { .. } | LookupSwitch { .. } => pop_expecting_type(stack, Integer)?,
        IReturn => {
            pop_expecting_type(stack, Integer)?;
            match this_method_return_type {
                Some(FieldType::Base(
                    BaseType::Int
                    | BaseType::Char
                    | BaseType::Short
                    | BaseType::Byte
                    | BaseType::Boolean,
                )) => (),
                _ => return Err(VerifierErrorKind::InvalidType),
            }
        }
        LReturn => {
            pop_expecting_type(stack, Long)?;
            if *this_method_return_type != Some(FieldType::long()) {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        FReturn => {
            pop_expecting_type(stack, Float)?;
            if *this_method_return_type != Some(FieldType::float()) {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        DReturn => {
            pop_expecting_type(stack, Double)?;
            if *this_method_return_type != Some(FieldType::double()) {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        AReturn => {
            let atype = pop(stack)?;
            let is_compatible_return = match this_method_return_type {
                Some(ret_type @ FieldType::Ref(_)) => {
                    VerificationType::is_assignable(&atype, &VType::from(ret_type))
                }
                _ => false,
            };
            if !is_compatible_return {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        Return => {
            if this_method_return_type.is_some() {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        AThrow => {
            let atype = pop(stack)?;
            match atype {
                Null | Object(RefType::Object(_)) => (),
                _ => return Err(VerifierErrorKind::InvalidType),
            }
            stack.clear();
            stack.push(atype);
        }
    }

    Ok(())
}

/// Once `<init>` is called, every copy of the uninitialized value becomes initialized
fn replace_uninitialized(frame: &mut Frame, uninitialized: &VType, initialized: &VType) {
    let stack: OffsetVec<VType> = frame
        .stack
        .iter()
        .map(|(_, typ)| {
            if typ == uninitialized {
                initialized.clone()
            } else {
                typ.clone()
            }
        })
        .collect();
    frame.stack = stack;
    for local in frame.locals.iter_mut() {
        if *local == *uninitialized {
            *local = initialized.clone();
        }
    }
}

fn load(frame: &mut Frame, idx: u16, expected: VType) -> Result<(), VerifierErrorKind> {
    match frame.local(idx) {
        None => Err(VerifierErrorKind::InvalidIndex),
        Some(found) if *found == expected => {
            frame.stack.push(expected);
            Ok(())
        }
        Some(_) => Err(VerifierErrorKind::InvalidType),
    }
}

fn store(frame: &mut Frame, idx: u16, expected: VType) -> Result<(), VerifierErrorKind> {
    pop_expecting_type(&mut frame.stack, expected.clone())?;
    frame.set_local(idx as usize, expected);
    Ok(())
}

/// Check that the array on the stack has one of the given element types
fn pop_primitive_array(
    stack: &mut OffsetVec<VType>,
    element_types: &[BaseType],
) -> Result<(), VerifierErrorKind> {
    match pop(stack)? {
        VerificationType::Null => Ok(()),
        VerificationType::Object(RefType::PrimitiveArray(arr))
            if arr.additional_dimensions == 0 && element_types.contains(&arr.element_type) =>
        {
            Ok(())
        }
        VerificationType::Object(_) => Err(VerifierErrorKind::InvalidType),
        _ => Err(VerifierErrorKind::NotArrayType),
    }
}

fn array_load(
    frame: &mut Frame,
    element_types: &[BaseType],
    loaded: VType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting_type(&mut frame.stack, VerificationType::Integer)?;
    pop_primitive_array(&mut frame.stack, element_types)?;
    frame.stack.push(loaded);
    Ok(())
}

fn array_store(
    frame: &mut Frame,
    element_types: &[BaseType],
    stored: VType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting_type(&mut frame.stack, stored)?;
    pop_expecting_type(&mut frame.stack, VerificationType::Integer)?;
    pop_primitive_array(&mut frame.stack, element_types)
}

fn unary(
    stack: &mut OffsetVec<VType>,
    argument: VType,
    result: VType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting_type(stack, argument)?;
    stack.push(result);
    Ok(())
}

fn binary(
    stack: &mut OffsetVec<VType>,
    arguments: VType,
    result: VType,
) -> Result<(), VerifierErrorKind> {
    pop_expecting_type(stack, arguments.clone())?;
    pop_expecting_type(stack, arguments)?;
    stack.push(result);
    Ok(())
}

fn push_all<const N: usize>(stack: &mut OffsetVec<VType>, types: [&VType; N]) {
    for typ in types {
        stack.push(typ.clone());
    }
}

fn pop_receiver(
    stack: &mut OffsetVec<VType>,
    allow_uninitialized_this: bool,
) -> Result<(), VerifierErrorKind> {
    match pop(stack)? {
        VerificationType::Null | VerificationType::Object(_) => Ok(()),
        VerificationType::UninitializedThis if allow_uninitialized_this => Ok(()),
        _ => Err(VerifierErrorKind::InvalidType),
    }
}

fn pop_assignable(stack: &mut OffsetVec<VType>, expected: &VType) -> Result<(), VerifierErrorKind> {
    let found = pop(stack)?;
    if VerificationType::is_assignable(&found, expected) {
        Ok(())
    } else {
        Err(VerifierErrorKind::IncompatibleTypes(found, expected.clone()))
    }
}

fn pop(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    stack.pop().ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_expecting_width(
    stack: &mut OffsetVec<VType>,
    expected_width: usize,
) -> Result<VType, VerifierErrorKind> {
    let typ = pop(stack)?;
    let found_width = typ.width();
    if found_width == expected_width {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidWidth(found_width))
    }
}

fn pop_expecting_type(
    stack: &mut OffsetVec<VType>,
    expected_type: VType,
) -> Result<(), VerifierErrorKind> {
    let typ = pop(stack)?;
    if typ == expected_type {
        Ok(())
    } else {
        Err(VerifierErrorKind::IncompatibleTypes(typ, expected_type))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::Instruction::*;
    use crate::jvm::{MethodRef, Name, ParseDescriptor};
    use VerificationType::*;

    fn new_frame<const N: usize, const M: usize>(locals: [VType; N], stack: [VType; M]) -> Frame {
        Frame {
            locals: locals.into_iter().collect(),
            stack: stack.into_iter().collect(),
        }
    }

    fn this_class() -> BinaryName {
        BinaryName::from_str("MyClass").unwrap()
    }

    #[test]
    fn arithmetic() {
        let binops = [
            (Integer, vec![IAdd, ISub, IDiv, IMul, IRem, IAnd, IOr, IXor]),
            (Long, vec![LAdd, LSub, LDiv, LMul, LRem, LAnd, LOr, LXor]),
            (Float, vec![FAdd, FSub, FDiv, FMul, FRem]),
            (Double, vec![DAdd, DSub, DDiv, DMul, DRem]),
        ];

        for (good_typ, instructions) in binops {
            for instruction in instructions {
                for typ in [Integer, Long, Float, Double, Null, UninitializedThis] {
                    let mut frame_in = new_frame([], [typ.clone(), typ.clone()]);
                    let result = frame_in.verify_instruction(&instruction, 0, &this_class());
                    if typ == good_typ {
                        assert!(result.is_ok(), "Verification of {:?}", instruction);
                        assert_eq!(frame_in, new_frame([], [typ]));
                    } else {
                        assert!(result.is_err(), "Verification of {:?}", instruction);
                    }
                }

                // Try with a stack that is too small
                let mut frame_in = new_frame([], [good_typ.clone()]);
                assert!(matches!(
                    frame_in.verify_instruction(&instruction, 0, &this_class()),
                    Err(VerifierErrorKind::EmptyStack),
                ));
            }
        }
    }

    #[test]
    fn dup_forms_respect_widths() {
        // `dup_x2` form 2: value2 is a category 2 value
        let mut frame = new_frame([], [Long, Integer]);
        frame.verify_instruction(&DupX2, 0, &this_class()).unwrap();
        assert_eq!(frame, new_frame([], [Integer, Long, Integer]));

        // `dup2_x2` form 4: both values are category 2
        let mut frame = new_frame([], [Double, Long]);
        frame.verify_instruction(&Dup2X2, 0, &this_class()).unwrap();
        assert_eq!(frame, new_frame([], [Long, Double, Long]));

        // `dup` can't split a wide value
        let mut frame = new_frame([], [Long]);
        assert!(matches!(
            frame.verify_instruction(&Dup, 0, &this_class()),
            Err(VerifierErrorKind::InvalidWidth(2))
        ));
    }

    #[test]
    fn byte_and_boolean_arrays_share_stores() {
        for element in [FieldType::byte(), FieldType::boolean()] {
            let array = Object(RefType::array(element));
            let mut frame = new_frame([], [array, Integer, Integer]);
            frame.verify_instruction(&BAStore, 0, &this_class()).unwrap();
            assert!(frame.stack.is_empty());
        }

        let mut frame = new_frame([], [Object(RefType::array(FieldType::int())), Integer, Integer]);
        assert!(frame.verify_instruction(&BAStore, 0, &this_class()).is_err());
    }

    #[test]
    fn wide_locals() {
        let mut frame = new_frame([], [Long]);
        frame.verify_instruction(&LStore(1), 0, &this_class()).unwrap();
        assert_eq!(frame.locals, vec![Top, Long, Top]);

        // Clobbering the second half of the long kills it
        let mut frame2 = frame.clone();
        frame2.stack.push(Integer);
        frame2.verify_instruction(&IStore(2), 0, &this_class()).unwrap();
        assert_eq!(frame2.locals, vec![Top, Top, Integer]);
        assert!(frame2.verify_instruction(&LLoad(1), 0, &this_class()).is_err());
    }

    #[test]
    fn constructor_initializes_all_copies() {
        let point = BinaryName::from_str("me/Point").unwrap();
        let init = MethodRef {
            class: point.clone(),
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor::parse("(I)V").unwrap(),
            is_interface: false,
        };
        let mut frame = new_frame([], []);
        frame.verify_instruction(&New(point.clone()), 3, &this_class()).unwrap();
        frame.verify_instruction(&Dup, 4, &this_class()).unwrap();
        frame.verify_instruction(&IConst1, 5, &this_class()).unwrap();
        frame
            .verify_instruction(&Invoke(InvokeType::Special, init), 6, &this_class())
            .unwrap();
        assert_eq!(frame, new_frame([], [Object(RefType::Object(point))]));
    }

    #[test]
    fn merging_frames() {
        let mut frame = new_frame([Integer, Float], [Null]);
        let other = new_frame([Integer, Integer, Long, Top], [Object(RefType::STRING)]);
        assert!(frame.merge(&other).unwrap());
        assert_eq!(frame, new_frame([Integer, Top], [Object(RefType::STRING)]));
        assert!(!frame.merge(&frame.clone()).unwrap());

        let mut short_stack = new_frame([], []);
        assert!(short_stack.merge(&other).is_err());
    }
}
