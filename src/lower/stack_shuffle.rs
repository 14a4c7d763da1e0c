use crate::jvm::code::Instruction;

/// Instructions moving the value on top of the stack (taking up `right_width` slots) underneath
/// the value just below it (taking up `left_width` slots)
///
/// ```text
/// [..., left, right] -> [..., right, left]
/// ```
///
/// Only widths 1 and 2 exist on the JVM; anything else is a bug in the caller.
pub fn relocate(right_width: usize, left_width: usize) -> Vec<Instruction> {
    match (right_width, left_width) {
        (1, 1) => vec![Instruction::Swap],
        (1, 2) => vec![Instruction::DupX2, Instruction::Pop],
        (2, 1) => vec![Instruction::Dup2X1, Instruction::Pop2],
        (2, 2) => vec![Instruction::Dup2X2, Instruction::Pop2],
        _ => panic!(
            "cannot relocate a {} slot value under a {} slot value",
            right_width, left_width
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Run stack instructions over a stack of named slots (wide values are two equal slots)
    fn shuffle(mut stack: Vec<&'static str>, insns: &[Instruction]) -> Vec<&'static str> {
        for insn in insns {
            let len = stack.len();
            match insn {
                Instruction::Swap => stack.swap(len - 1, len - 2),
                Instruction::Pop => {
                    stack.pop();
                }
                Instruction::Pop2 => {
                    stack.truncate(len - 2);
                }
                Instruction::DupX2 => {
                    let top = stack[len - 1];
                    stack.insert(len - 3, top);
                }
                Instruction::Dup2X1 => {
                    let top = stack[len - 2..].to_vec();
                    stack.splice(len - 3..len - 3, top);
                }
                Instruction::Dup2X2 => {
                    let top = stack[len - 2..].to_vec();
                    stack.splice(len - 4..len - 4, top);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        stack
    }

    #[test]
    fn all_width_combinations() {
        assert_eq!(
            shuffle(vec!["x", "a", "b"], &relocate(1, 1)),
            vec!["x", "b", "a"]
        );
        assert_eq!(
            shuffle(vec!["x", "a", "a", "b"], &relocate(1, 2)),
            vec!["x", "b", "a", "a"]
        );
        assert_eq!(
            shuffle(vec!["x", "a", "b", "b"], &relocate(2, 1)),
            vec!["x", "b", "b", "a"]
        );
        assert_eq!(
            shuffle(vec!["x", "a", "a", "b", "b"], &relocate(2, 2)),
            vec!["x", "b", "b", "a", "a"]
        );
    }

    #[test]
    #[should_panic]
    fn unsupported_width() {
        relocate(3, 1);
    }
}
