use crate::jvm::code::{CfCode, SynLabel, TryCatch};
use std::collections::HashMap;

/// Collapse adjacent exception ranges that dispatch to the same handlers
///
/// Two consecutive entries of the exception table are merged when their guards and handler
/// targets are identical and the first range ends exactly where the second begins (either the
/// same label, or labels with nothing between them). The table is scanned from the end so that a
/// merge never shifts an entry which has yet to be visited. Returns the number of merges.
pub fn merge_adjacent_try_catches(code: &mut CfCode) -> usize {
    if code.try_catches.len() < 2 {
        return 0;
    }

    let positions = code.label_positions();
    let mut merged = 0;
    let mut idx = code.try_catches.len() - 1;
    while idx > 0 {
        let first = idx - 1;
        if mergeable(
            &positions,
            &code.try_catches[first],
            &code.try_catches[idx],
        ) {
            let second = code.try_catches.remove(idx);
            code.try_catches[first].end = second.end;
            merged += 1;
        }
        idx -= 1;
    }
    merged
}

fn mergeable(positions: &HashMap<SynLabel, usize>, first: &TryCatch, second: &TryCatch) -> bool {
    first.same_handlers(second) && CfCode::labels_adjacent(positions, first.end, second.start)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{CodeItem, Instruction, LabelGenerator, SynLabelGenerator};
    use crate::jvm::{BinaryName, Name};
    use crate::util::Offset;

    /// Code with labels `l[0]`, `l[1]`, ... each followed by a `nop`, and a handler label after
    fn code_with_labels(count: usize) -> (CfCode, Vec<SynLabel>, SynLabel) {
        let mut generator = SynLabelGenerator::new(SynLabel::START);
        let labels: Vec<SynLabel> = (0..count).map(|_| generator.fresh_label()).collect();
        let handler = generator.fresh_label();
        let mut items = vec![];
        for label in &labels {
            items.push(CodeItem::Label(*label));
            items.push(CodeItem::Instruction(Instruction::Nop));
        }
        items.push(CodeItem::Label(handler));
        let code = CfCode {
            max_locals: Offset(0),
            max_stack: Offset(1),
            items,
            try_catches: vec![],
        };
        (code, labels, handler)
    }

    /// Which instructions each handler protects (by item index, labels don't count)
    fn coverage(code: &CfCode) -> Vec<(SynLabel, Vec<usize>)> {
        let positions = code.label_positions();
        let mut covered = vec![];
        for try_catch in &code.try_catches {
            let start = positions[&try_catch.start];
            let end = positions[&try_catch.end];
            for target in &try_catch.targets {
                let instructions = (start..end)
                    .filter(|idx| !matches!(code.items[*idx], CodeItem::Label(_)))
                    .collect::<Vec<_>>();
                covered.push((*target, instructions));
            }
        }
        let mut by_handler: HashMap<SynLabel, Vec<usize>> = HashMap::new();
        for (target, range) in covered {
            by_handler.entry(target).or_default().extend(range);
        }
        let mut flattened: Vec<(SynLabel, Vec<usize>)> = by_handler.into_iter().collect();
        for (_, range) in flattened.iter_mut() {
            range.sort_unstable();
        }
        flattened.sort_by_key(|(label, _)| format!("{:?}", label));
        flattened
    }

    #[test]
    fn shared_boundary_merges() {
        let (mut code, l, handler) = code_with_labels(3);
        code.try_catches = vec![
            TryCatch::catching(l[0], l[1], None, handler),
            TryCatch::catching(l[1], l[2], None, handler),
        ];
        assert_eq!(merge_adjacent_try_catches(&mut code), 1);
        assert_eq!(
            code.try_catches,
            vec![TryCatch::catching(l[0], l[2], None, handler)]
        );
    }

    #[test]
    fn adjacent_labels_merge() {
        let (mut code, l, handler) = code_with_labels(2);
        let mut generator = SynLabelGenerator::new(handler.next());
        let end = generator.fresh_label();
        let start = generator.fresh_label();
        let end2 = generator.fresh_label();
        // l0 nop end start nop end2
        code.items = vec![
            CodeItem::Label(l[0]),
            CodeItem::Instruction(Instruction::Nop),
            CodeItem::Label(end),
            CodeItem::Label(start),
            CodeItem::Instruction(Instruction::Nop),
            CodeItem::Label(end2),
            CodeItem::Label(handler),
        ];
        code.try_catches = vec![
            TryCatch::catching(l[0], end, None, handler),
            TryCatch::catching(start, end2, None, handler),
        ];
        let before = coverage(&code);
        assert_eq!(merge_adjacent_try_catches(&mut code), 1);
        assert_eq!(
            code.try_catches,
            vec![TryCatch::catching(l[0], end2, None, handler)]
        );
        assert_eq!(coverage(&code), before);
    }

    #[test]
    fn gaps_and_different_handlers_stay() {
        let (mut code, l, handler) = code_with_labels(4);
        let npe = Some(BinaryName::from_str("java/lang/NullPointerException").unwrap());
        code.try_catches = vec![
            TryCatch::catching(l[0], l[1], None, handler),
            TryCatch::catching(l[2], l[3], None, handler),
            TryCatch::catching(l[3], l[3], npe, handler),
        ];
        let before = code.try_catches.clone();
        assert_eq!(merge_adjacent_try_catches(&mut code), 0);
        assert_eq!(code.try_catches, before);
    }

    #[test]
    fn long_runs_collapse_and_merging_is_idempotent() {
        let (mut code, l, handler) = code_with_labels(6);
        let other = l[5];
        code.try_catches = vec![
            TryCatch::catching(l[0], l[1], None, handler),
            TryCatch::catching(l[1], l[2], None, handler),
            TryCatch::catching(l[2], l[3], None, other),
            TryCatch::catching(l[3], l[4], None, handler),
            TryCatch::catching(l[4], l[5], None, handler),
        ];
        let before = coverage(&code);

        assert_eq!(merge_adjacent_try_catches(&mut code), 2);
        assert_eq!(
            code.try_catches,
            vec![
                TryCatch::catching(l[0], l[2], None, handler),
                TryCatch::catching(l[2], l[3], None, other),
                TryCatch::catching(l[3], l[5], None, handler),
            ]
        );
        assert_eq!(coverage(&code), before);

        let once = code.clone();
        assert_eq!(merge_adjacent_try_catches(&mut code), 0);
        assert_eq!(code, once);
    }
}
