//! Shared helpers for the integration tests: builders for small programs and an interpreter for
//! the straight-line subset of stack code that lowering produces for them.

#![allow(dead_code)]

use dex_translator::dex::DexCode;
use dex_translator::jvm::code::{
    BranchInstruction, CfCode, CodeItem, EqComparison, Instruction, OrdComparison, SynLabel,
};
use dex_translator::jvm::{
    BaseType, BinaryName, ClassAccessFlags, ConstantData, MethodAccessFlags, MethodDescriptor,
    Name, ParseDescriptor, UnqualifiedName,
};
use dex_translator::lower::{lower_method, LoweringError, StandardTranslator};
use dex_translator::model::{MethodCode, ProgramClass, ProgramMethod};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const TEST_CLASS: &str = "me/Test";

pub fn class_name(name: &str) -> BinaryName {
    BinaryName::from_str(name).unwrap()
}

/// Public static method with a register-form body
pub fn static_method(name: &str, descriptor: &str, dex: DexCode) -> ProgramMethod {
    ProgramMethod::new(
        UnqualifiedName::from_str(name).unwrap(),
        MethodDescriptor::parse(descriptor).unwrap(),
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
    )
    .with_code(MethodCode::Register(dex))
}

pub fn class_with(name: &str, methods: Vec<ProgramMethod>) -> ProgramClass {
    let mut class = ProgramClass::new(
        class_name(name),
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
    );
    class.methods = methods;
    class
}

/// Lower a register-form body as a static method of [`TEST_CLASS`]
pub fn lower(descriptor: &str, dex: &DexCode) -> Result<CfCode, LoweringError> {
    let method = static_method("test", descriptor, dex.clone());
    lower_method(&class_name(TEST_CLASS), &method, dex, &StandardTranslator)
}

/// Runtime value, as seen by the interpreter
///
/// Wide values take up two slots (on the stack and in locals): the value itself followed by
/// `Top`. Array elements are stored one value per element.
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Array(Rc<RefCell<Vec<Value>>>),
    Top,
}

impl Value {
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn as_int(&self) -> i32 {
        match self {
            Value::Int(int) => *int,
            other => panic!("expected an int, got {:?}", other),
        }
    }

    pub fn array_elements(&self) -> Vec<Value> {
        match self {
            Value::Array(elements) => elements.borrow().clone(),
            other => panic!("expected an array, got {:?}", other),
        }
    }

    fn default_for(base_type: BaseType) -> Value {
        match base_type {
            BaseType::Long => Value::Long(0),
            BaseType::Float => Value::Float(0.0),
            BaseType::Double => Value::Double(0.0),
            _ => Value::Int(0),
        }
    }
}

/// How a run of the interpreter ended
#[derive(Clone, PartialEq, Debug)]
pub enum Outcome {
    Returned(Option<Value>),
    Threw(Value),
}

impl Outcome {
    pub fn returned(self) -> Value {
        match self {
            Outcome::Returned(Some(value)) => value,
            other => panic!("expected a returned value, got {:?}", other),
        }
    }
}

/// Bound on the number of executed items, so a bad jump can't hang a test
const STEP_LIMIT: usize = 100_000;

struct Machine {
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Machine {
    fn push(&mut self, value: Value) {
        let wide = value.is_wide();
        self.stack.push(value);
        if wide {
            self.stack.push(Value::Top);
        }
    }

    fn pop(&mut self) -> Value {
        let top = self.stack.pop().expect("stack underflow");
        if top == Value::Top {
            let value = self.stack.pop().expect("stack underflow");
            assert!(value.is_wide(), "unpaired second slot");
            value
        } else {
            top
        }
    }

    fn pop_int(&mut self) -> i32 {
        self.pop().as_int()
    }

    fn pop_long(&mut self) -> i64 {
        match self.pop() {
            Value::Long(long) => long,
            other => panic!("expected a long, got {:?}", other),
        }
    }

    fn load(&mut self, index: u16) {
        let value = self.locals[index as usize].clone();
        assert_ne!(value, Value::Top, "read of unset local {}", index);
        self.push(value);
    }

    fn store(&mut self, index: u16) {
        let value = self.pop();
        let index = index as usize;
        if value.is_wide() {
            self.locals[index + 1] = Value::Top;
        }
        self.locals[index] = value;
    }

    /// Copy the top `count` slots and insert the copy `depth` slots further down
    fn dup(&mut self, count: usize, depth: usize) {
        let len = self.stack.len();
        let copied: Vec<Value> = self.stack[len - count..].to_vec();
        let at = len - count - depth;
        for (offset, value) in copied.into_iter().enumerate() {
            self.stack.insert(at + offset, value);
        }
    }

    fn array_load(&mut self) -> Value {
        let index = self.pop_int() as usize;
        match self.pop() {
            Value::Array(elements) => elements.borrow()[index].clone(),
            other => panic!("expected an array, got {:?}", other),
        }
    }

    fn array_store(&mut self, convert: impl Fn(Value) -> Value) {
        let value = self.pop();
        let index = self.pop_int() as usize;
        match self.pop() {
            Value::Array(elements) => elements.borrow_mut()[index] = convert(value),
            other => panic!("expected an array, got {:?}", other),
        }
    }

    fn int_binary(&mut self, op: impl Fn(i32, i32) -> i32) {
        let right = self.pop_int();
        let left = self.pop_int();
        self.push(Value::Int(op(left, right)));
    }

    fn long_binary(&mut self, op: impl Fn(i64, i64) -> i64) {
        let right = self.pop_long();
        let left = self.pop_long();
        self.push(Value::Long(op(left, right)));
    }

    fn step(&mut self, insn: &Instruction) {
        use Instruction::*;
        match insn {
            Nop => (),
            AConstNull => self.push(Value::Null),
            IConstM1 => self.push(Value::Int(-1)),
            IConst0 => self.push(Value::Int(0)),
            IConst1 => self.push(Value::Int(1)),
            IConst2 => self.push(Value::Int(2)),
            IConst3 => self.push(Value::Int(3)),
            IConst4 => self.push(Value::Int(4)),
            IConst5 => self.push(Value::Int(5)),
            LConst0 => self.push(Value::Long(0)),
            LConst1 => self.push(Value::Long(1)),
            FConst0 => self.push(Value::Float(0.0)),
            FConst1 => self.push(Value::Float(1.0)),
            FConst2 => self.push(Value::Float(2.0)),
            DConst0 => self.push(Value::Double(0.0)),
            DConst1 => self.push(Value::Double(1.0)),
            BiPush(byte) => self.push(Value::Int(*byte as i32)),
            SiPush(short) => self.push(Value::Int(*short as i32)),
            Ldc(constant) | Ldc2(constant) => self.push(match constant {
                ConstantData::Integer(int) => Value::Int(*int),
                ConstantData::Float(float) => Value::Float(*float),
                ConstantData::Long(long) => Value::Long(*long),
                ConstantData::Double(double) => Value::Double(*double),
                other => panic!("unsupported constant {:?}", other),
            }),
            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) => self.load(*idx),
            IStore(idx) | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) => {
                self.store(*idx)
            }
            IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => {
                let element = self.array_load();
                self.push(element);
            }
            IAStore | LAStore | FAStore | DAStore | AAStore => self.array_store(|value| value),
            BAStore => self.array_store(|value| Value::Int(value.as_int() as i8 as i32)),
            CAStore => self.array_store(|value| Value::Int(value.as_int() as u16 as i32)),
            SAStore => self.array_store(|value| Value::Int(value.as_int() as i16 as i32)),
            NewArray(base_type) => {
                let length = self.pop_int();
                assert!(length >= 0, "negative array size");
                let elements = vec![Value::default_for(*base_type); length as usize];
                self.push(Value::Array(Rc::new(RefCell::new(elements))));
            }
            ANewArray(_) => {
                let length = self.pop_int();
                assert!(length >= 0, "negative array size");
                let elements = vec![Value::Null; length as usize];
                self.push(Value::Array(Rc::new(RefCell::new(elements))));
            }
            ArrayLength => {
                let length = self.pop().array_elements().len();
                self.push(Value::Int(length as i32));
            }
            Pop => {
                self.stack.pop();
            }
            Pop2 => {
                self.stack.pop();
                self.stack.pop();
            }
            Dup => self.dup(1, 0),
            DupX1 => self.dup(1, 1),
            DupX2 => self.dup(1, 2),
            Dup2 => self.dup(2, 0),
            Dup2X1 => self.dup(2, 1),
            Dup2X2 => self.dup(2, 2),
            Swap => {
                let len = self.stack.len();
                self.stack.swap(len - 1, len - 2);
            }
            IAdd => self.int_binary(i32::wrapping_add),
            ISub => self.int_binary(i32::wrapping_sub),
            IMul => self.int_binary(i32::wrapping_mul),
            IAnd => self.int_binary(|l, r| l & r),
            IOr => self.int_binary(|l, r| l | r),
            IXor => self.int_binary(|l, r| l ^ r),
            LAdd => self.long_binary(i64::wrapping_add),
            LSub => self.long_binary(i64::wrapping_sub),
            LMul => self.long_binary(i64::wrapping_mul),
            INeg => {
                let value = self.pop_int();
                self.push(Value::Int(value.wrapping_neg()));
            }
            IInc(idx, delta) => {
                let value = self.locals[*idx as usize].as_int();
                self.locals[*idx as usize] = Value::Int(value.wrapping_add(*delta as i32));
            }
            I2L => {
                let value = self.pop_int();
                self.push(Value::Long(value as i64));
            }
            I2F => {
                let value = self.pop_int();
                self.push(Value::Float(value as f32));
            }
            I2D => {
                let value = self.pop_int();
                self.push(Value::Double(value as f64));
            }
            L2I => {
                let value = self.pop_long();
                self.push(Value::Int(value as i32));
            }
            I2B => {
                let value = self.pop_int();
                self.push(Value::Int(value as i8 as i32));
            }
            I2C => {
                let value = self.pop_int();
                self.push(Value::Int(value as u16 as i32));
            }
            I2S => {
                let value = self.pop_int();
                self.push(Value::Int(value as i16 as i32));
            }
            other => panic!("interpreter does not support {:?}", other),
        }
    }
}

fn ord_holds(comparison: OrdComparison, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering;
    match comparison {
        OrdComparison::EQ => ordering == Ordering::Equal,
        OrdComparison::NE => ordering != Ordering::Equal,
        OrdComparison::LT => ordering == Ordering::Less,
        OrdComparison::LE => ordering != Ordering::Greater,
        OrdComparison::GT => ordering == Ordering::Greater,
        OrdComparison::GE => ordering != Ordering::Less,
    }
}

/// Run a method body on some arguments (one value per parameter)
///
/// Exceptions are not dispatched to handlers: `athrow` just ends the run.
pub fn interpret(code: &CfCode, args: &[Value]) -> Outcome {
    let mut machine = Machine {
        locals: vec![Value::Top; code.max_locals.0],
        stack: vec![],
    };
    let mut slot = 0;
    for arg in args {
        machine.locals[slot] = arg.clone();
        slot += if arg.is_wide() { 2 } else { 1 };
    }

    let positions: HashMap<SynLabel, usize> = code.label_positions();
    let jump = |label: &SynLabel| -> usize { positions[label] };

    let mut pc = 0;
    for _ in 0..STEP_LIMIT {
        let item = code.items.get(pc).expect("fell off the end of the code");
        pc += 1;
        match item {
            CodeItem::Label(_) => (),
            CodeItem::Instruction(insn) => machine.step(insn),
            CodeItem::Branch(branch) => match branch {
                BranchInstruction::If(comparison, target) => {
                    let value = machine.pop_int();
                    if ord_holds(*comparison, value.cmp(&0)) {
                        pc = jump(target);
                    }
                }
                BranchInstruction::IfICmp(comparison, target) => {
                    let right = machine.pop_int();
                    let left = machine.pop_int();
                    if ord_holds(*comparison, left.cmp(&right)) {
                        pc = jump(target);
                    }
                }
                BranchInstruction::IfNull(comparison, target) => {
                    let is_null = machine.pop() == Value::Null;
                    if is_null == (*comparison == EqComparison::EQ) {
                        pc = jump(target);
                    }
                }
                BranchInstruction::Goto(target) => pc = jump(target),
                BranchInstruction::TableSwitch {
                    default,
                    low,
                    targets,
                } => {
                    let value = machine.pop_int();
                    let target = value
                        .checked_sub(*low)
                        .and_then(|index| usize::try_from(index).ok())
                        .and_then(|index| targets.get(index))
                        .unwrap_or(default);
                    pc = jump(target);
                }
                BranchInstruction::LookupSwitch { default, targets } => {
                    let value = machine.pop_int();
                    let target = targets
                        .iter()
                        .find(|(key, _)| *key == value)
                        .map(|(_, target)| target)
                        .unwrap_or(default);
                    pc = jump(target);
                }
                BranchInstruction::Return => return Outcome::Returned(None),
                BranchInstruction::IReturn
                | BranchInstruction::LReturn
                | BranchInstruction::FReturn
                | BranchInstruction::DReturn
                | BranchInstruction::AReturn => {
                    return Outcome::Returned(Some(machine.pop()));
                }
                BranchInstruction::AThrow => return Outcome::Threw(machine.pop()),
                other => panic!("interpreter does not support {:?}", other),
            },
        }
    }
    panic!("step limit exceeded")
}
