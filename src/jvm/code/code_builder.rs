use crate::jvm::code::{
    BranchInstruction, CfCode, CodeItem, Instruction, LabelGenerator, SynLabel, SynLabelGenerator,
    TryCatch,
};
use crate::jvm::verifier::Frame;
use crate::jvm::{BinaryName, Error, FieldType, MethodDescriptor, UnqualifiedName};
use crate::util::Offset;
use std::collections::{HashMap, HashSet};

/// This provides a very slightly simplified interface for building up method bodies. It does
/// internal bookeeping to track frames, labels, reachability, etc.
///
/// ### Blocks
///
/// Code is built one basic block at a time, but blocks do not need to be built in the order they
/// end up in the method. A block can only be started once some other block has jumped to it (or
/// fallen through into it, or registered it as an exception handler), since that is the only way
/// of knowing its initial frame. Once all the blocks are built, [`CodeBuilder::result`] lays them
/// out in the requested order, adding `goto`s wherever a fallthrough edge got separated from its
/// target.
///
/// ### Constructing verification frames
///
/// Whenever a second edge reaches a label, the frames are merged. Stacks must agree in shape but
/// locals that disagree are just marked unusable. Instruction selection for a block only ever
/// sees the frame known at the time the block is started, so blocks should be started in an order
/// where most of their predecessors are already built (eg. a worklist from the entry).
///
/// ### Tracking reachability
///
/// Instructions pushed while there is no open block (eg. after an unconditional jump and before
/// the next block is started) are dead and get silently dropped.
pub struct CodeBuilder {
    /// Class containing the method
    this_class: BinaryName,

    /// Return type of the method
    return_type: Option<FieldType>,

    /// Known entry frames of labels (whether placed or not)
    frames: HashMap<SynLabel, Frame>,

    /// Labels that have been placed (either starting a block or inside one)
    placed_labels: HashSet<SynLabel>,

    /// Labels which have been referenced by jumps or exception ranges
    referenced_labels: HashSet<SynLabel>,

    /// Closed blocks
    blocks: HashMap<SynLabel, BasicBlock>,

    /// Order in which blocks got closed
    closed_order: Vec<SynLabel>,

    /// Block currently under construction (label is not in `blocks`)
    current_block: Option<CurrentBlock>,

    label_generator: SynLabelGenerator,
    try_catches: Vec<TryCatch>,
    max_locals: Offset,
    max_stack: Offset,

    /// Number of instructions pushed so far
    instruction_count: usize,
}

/// Closed block of code
struct BasicBlock {
    /// Labels and instructions (not including the block label itself)
    items: Vec<CodeItem>,

    /// Block that is reached by falling off the end of this block
    fall_through: Option<SynLabel>,
}

/// Just like `BasicBlock`, but not closed off yet
struct CurrentBlock {
    label: SynLabel,

    /// Tracks the state of the frame at the end of `items`
    latest_frame: Frame,

    /// Accumulated instructions
    items: Vec<CodeItem>,
}

impl CodeBuilder {
    /// Create a builder for a new method
    ///
    /// The entry label is registered with the method's initial frame (so the first thing to do is
    /// usually `start_block(entry)`). The caller is responsible for making sure `entry` is
    /// distinct from any label returned by `fresh_label`.
    pub fn new(
        this_class: BinaryName,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
        is_static: bool,
        entry: SynLabel,
    ) -> CodeBuilder {
        let entry_frame = Frame::method_entry(&this_class, name, descriptor, is_static);
        let max_locals = Offset(entry_frame.locals.len());

        let mut frames = HashMap::new();
        frames.insert(entry, entry_frame);
        let mut referenced_labels = HashSet::new();
        referenced_labels.insert(entry);

        CodeBuilder {
            this_class,
            return_type: descriptor.return_type.clone(),
            frames,
            placed_labels: HashSet::new(),
            referenced_labels,
            blocks: HashMap::new(),
            closed_order: vec![],
            current_block: None,
            label_generator: SynLabelGenerator::new(entry.next()),
            try_catches: vec![],
            max_locals,
            max_stack: Offset(0),
            instruction_count: 0,
        }
    }

    /// Turn the builder into the method code
    ///
    /// Blocks are laid out following `layout`, then any other block in the order they were
    /// closed. Labels in `layout` that were never started as blocks are skipped.
    pub fn result(mut self, layout: &[SynLabel]) -> Result<CfCode, Error> {
        let unplaced_labels: Vec<SynLabel> = self
            .referenced_labels
            .iter()
            .filter(|lbl| !self.placed_labels.contains(lbl))
            .copied()
            .collect();
        if self.current_block.is_some() || !unplaced_labels.is_empty() {
            return Err(Error::MethodCodeNotFinished {
                pending_block: self.current_block.as_ref().map(|block| block.label),
                unplaced_labels,
            });
        }

        let mut order: Vec<SynLabel> = vec![];
        let mut seen: HashSet<SynLabel> = HashSet::new();
        for label in layout.iter().chain(self.closed_order.iter()) {
            if self.blocks.contains_key(label) && seen.insert(*label) {
                order.push(*label);
            }
        }

        let mut items = vec![];
        for (idx, label) in order.iter().enumerate() {
            let block = match self.blocks.remove(label) {
                Some(block) => block,
                None => continue,
            };
            items.push(CodeItem::Label(*label));
            items.extend(block.items);
            if let Some(target) = block.fall_through {
                if order.get(idx + 1) != Some(&target) {
                    items.push(CodeItem::Branch(BranchInstruction::Goto(target)));
                }
            }
        }

        Ok(CfCode {
            max_locals: self.max_locals,
            max_stack: self.max_stack,
            items,
            try_catches: self.try_catches,
        })
    }

    /// Query the known frame for a label that has been referred to (and possibly even placed)
    pub fn lookup_frame(&self, label: SynLabel) -> Option<&Frame> {
        self.frames.get(&label)
    }

    /// Merge a frame reaching some label into what is already known about the label
    fn merge_frame_into(&mut self, label: SynLabel, incoming: Frame) -> Result<(), Error> {
        self.referenced_labels.insert(label);
        match self.frames.get_mut(&label) {
            Some(existing) => {
                let before = existing.clone();
                existing
                    .merge(&incoming)
                    .map(|_| ())
                    .map_err(|_| Error::IncompatibleFrames(label, before, incoming))
            }
            None => {
                self.frames.insert(label, incoming);
                Ok(())
            }
        }
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> SynLabel {
        self.label_generator.fresh_label()
    }

    /// Class containing the method being built
    pub fn this_class(&self) -> &BinaryName {
        &self.this_class
    }

    /// Is there an open block (meaning pushed instructions are reachable)?
    pub fn is_reachable(&self) -> bool {
        self.current_block.is_some()
    }

    /// Get the current frame
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current_block
            .as_ref()
            .map(|current_block| &current_block.latest_frame)
    }

    /// Start a new block with the given label, ending the current block (if there is one) with a
    /// fallthrough. This can fail if:
    ///
    ///   * the label was already placed
    ///   * the label was already jumped to from elsewhere, and the frames don't match
    ///   * the label was not ever been jumped to and there is no fallthrough (so we have no way of
    ///     inferring the expected frame)
    ///
    pub fn start_block(&mut self, label: SynLabel) -> Result<(), Error> {
        if self.current_block.is_some() {
            self.fall_through(label)?;
        }
        if self.placed_labels.contains(&label) {
            return Err(Error::DuplicateLabel(label));
        }
        let frame = self
            .frames
            .get(&label)
            .cloned()
            .ok_or(Error::PlacingLabelBeforeReference(label))?;

        self.placed_labels.insert(label);
        self.current_block = Some(CurrentBlock {
            label,
            latest_frame: frame,
            items: vec![],
        });
        Ok(())
    }

    /// Close the current block (if there is one) with a fallthrough into the given label
    pub fn fall_through(&mut self, label: SynLabel) -> Result<(), Error> {
        if let Some(current_block) = self.current_block.take() {
            self.merge_frame_into(label, current_block.latest_frame.clone())?;
            self.close_block(current_block, Some(label))?;
        }
        Ok(())
    }

    /// Place a label in the middle of a block
    ///
    /// If there is no open block, the label goes at the end of the block that was last closed.
    /// This is useful for marking the end of a range that finishes with a jump.
    pub fn place_label(&mut self, label: SynLabel) -> Result<(), Error> {
        if !self.placed_labels.insert(label) {
            return Err(Error::DuplicateLabel(label));
        }
        if let Some(current_block) = self.current_block.as_mut() {
            let frame = current_block.latest_frame.clone();
            current_block.items.push(CodeItem::Label(label));
            return self.merge_frame_into(label, frame);
        }
        let last_block = self
            .closed_order
            .last()
            .and_then(|last| self.blocks.get_mut(last))
            .ok_or(Error::PlacingLabelBeforeReference(label))?;
        last_block.items.push(CodeItem::Label(label));
        Ok(())
    }

    /// Push a new instruction to the current block
    pub fn push_instruction(&mut self, insn: Instruction) -> Result<(), Error> {
        if let Some(current_block) = self.current_block.as_mut() {
            self.instruction_count += 1;
            current_block
                .latest_frame
                .verify_instruction(&insn, self.instruction_count, &self.this_class)
                .map_err(|kind| Error::VerifierError {
                    instruction: format!("{:?}", insn),
                    kind,
                })?;
            current_block
                .latest_frame
                .update_maximums(&mut self.max_locals, &mut self.max_stack);

            current_block.items.push(CodeItem::Instruction(insn));
        }
        Ok(())
    }

    /// Push a new branch instruction
    ///
    /// The jump targets get the frame after the branch. If the instruction can't fall through,
    /// this also closes the current block.
    pub fn push_branch_instruction(
        &mut self,
        insn: BranchInstruction<SynLabel>,
    ) -> Result<(), Error> {
        if let Some(mut current_block) = self.current_block.take() {
            current_block
                .latest_frame
                .verify_branch_instruction(&insn, &self.return_type)
                .map_err(|kind| Error::VerifierBranchingError {
                    instruction: format!("{:?}", insn),
                    kind,
                })?;
            current_block
                .latest_frame
                .update_maximums(&mut self.max_locals, &mut self.max_stack);

            for jump_label in insn.jump_targets() {
                self.merge_frame_into(*jump_label, current_block.latest_frame.clone())?;
            }

            let falls_through = insn.falls_through();
            current_block.items.push(CodeItem::Branch(insn));
            if falls_through {
                self.current_block = Some(current_block);
            } else {
                self.close_block(current_block, None)?;
            }
        }
        Ok(())
    }

    /// Record that an exception thrown at the current point can be handled at `handler`
    ///
    /// The handler's frame gets the current locals and a stack holding just the exception.
    pub fn add_exception_edge(
        &mut self,
        handler: SynLabel,
        catch_type: &Option<BinaryName>,
    ) -> Result<(), Error> {
        let handler_frame = match self.current_block.as_ref() {
            Some(current_block) => current_block.latest_frame.handler_frame(catch_type),
            None => return Ok(()),
        };
        handler_frame.update_maximums(&mut self.max_locals, &mut self.max_stack);
        self.merge_frame_into(handler, handler_frame)
    }

    /// Add an entry to the exception table (entries are kept in the order they are added)
    pub fn add_try_catch(&mut self, try_catch: TryCatch) {
        self.referenced_labels.insert(try_catch.start);
        self.referenced_labels.insert(try_catch.end);
        self.referenced_labels
            .extend(try_catch.targets.iter().copied());
        self.try_catches.push(try_catch);
    }

    fn close_block(
        &mut self,
        current_block: CurrentBlock,
        fall_through: Option<SynLabel>,
    ) -> Result<(), Error> {
        let block = BasicBlock {
            items: current_block.items,
            fall_through,
        };
        if self.blocks.insert(current_block.label, block).is_some() {
            return Err(Error::DuplicateLabel(current_block.label));
        }
        self.closed_order.push(current_block.label);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::OrdComparison;
    use crate::jvm::verifier::VerificationType;
    use crate::jvm::{Name, ParseDescriptor};

    fn builder(descriptor: &str) -> CodeBuilder {
        let descriptor = MethodDescriptor::parse(descriptor).unwrap();
        CodeBuilder::new(
            BinaryName::from_str("me/Test").unwrap(),
            &UnqualifiedName::from_str("test").unwrap(),
            &descriptor,
            true,
            SynLabel::START,
        )
    }

    #[test]
    fn blocks_out_of_order() {
        let mut code = builder("(I)I");
        let entry = SynLabel::START;
        let positive = code.fresh_label();

        code.start_block(entry).unwrap();
        code.push_instruction(Instruction::ILoad(0)).unwrap();
        code.push_branch_instruction(BranchInstruction::If(OrdComparison::GT, positive))
            .unwrap();
        code.push_instruction(Instruction::IConst0).unwrap();
        code.push_branch_instruction(BranchInstruction::IReturn).unwrap();

        // Dead code is ignored
        code.push_instruction(Instruction::IConst1).unwrap();

        code.start_block(positive).unwrap();
        code.push_instruction(Instruction::IConst1).unwrap();
        code.push_branch_instruction(BranchInstruction::IReturn).unwrap();

        let code = code.result(&[positive, entry]).unwrap();
        assert_eq!(code.items[0], CodeItem::Label(positive));
        assert_eq!(code.instruction_count(), 6);
        assert_eq!(code.max_stack, Offset(1));
        assert_eq!(code.max_locals, Offset(1));
    }

    #[test]
    fn separated_fallthrough_gets_goto() {
        let mut code = builder("()V");
        let entry = SynLabel::START;
        let next = code.fresh_label();

        code.start_block(entry).unwrap();
        code.push_instruction(Instruction::Nop).unwrap();
        code.fall_through(next).unwrap();
        code.start_block(next).unwrap();
        code.push_branch_instruction(BranchInstruction::Return).unwrap();

        let code = code.result(&[next, entry]).unwrap();
        assert_eq!(
            code.items,
            vec![
                CodeItem::Label(next),
                CodeItem::Branch(BranchInstruction::Return),
                CodeItem::Label(entry),
                CodeItem::Instruction(Instruction::Nop),
                CodeItem::Branch(BranchInstruction::Goto(next)),
            ]
        );
    }

    #[test]
    fn merges_disagreeing_locals() {
        let mut code = builder("()V");
        let entry = SynLabel::START;
        let join = code.fresh_label();

        code.start_block(entry).unwrap();
        code.push_instruction(Instruction::IConst0).unwrap();
        code.push_instruction(Instruction::IStore(0)).unwrap();
        code.push_branch_instruction(BranchInstruction::Goto(join))
            .unwrap();
        assert!(!code.is_reachable());

        // Unreachable, but still allowed to place a trailing label
        let trailing = code.fresh_label();
        code.place_label(trailing).unwrap();

        let other = code.fresh_label();
        code.frames.insert(other, code.frames[&entry].clone());
        code.referenced_labels.insert(other);
        code.start_block(other).unwrap();
        code.push_instruction(Instruction::FConst0).unwrap();
        code.push_instruction(Instruction::FStore(0)).unwrap();
        code.fall_through(join).unwrap();

        assert_eq!(code.lookup_frame(join).unwrap().locals, vec![VerificationType::Top]);
    }

    #[test]
    fn unplaced_labels_are_errors() {
        let mut code = builder("()V");
        let nowhere = code.fresh_label();
        code.start_block(SynLabel::START).unwrap();
        code.push_branch_instruction(BranchInstruction::Goto(nowhere))
            .unwrap();
        assert!(matches!(
            code.result(&[]),
            Err(Error::MethodCodeNotFinished { unplaced_labels, .. }) if unplaced_labels == vec![nowhere]
        ));
    }

    #[test]
    fn blocks_need_a_known_frame() {
        let mut code = builder("()V");
        let orphan = code.fresh_label();
        assert!(matches!(
            code.start_block(orphan),
            Err(Error::PlacingLabelBeforeReference(lbl)) if lbl == orphan
        ));
    }
}
