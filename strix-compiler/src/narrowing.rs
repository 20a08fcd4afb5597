use std::collections::HashMap;

use tracing::trace;

use crate::generics::TypeContext;
use crate::types::TypeId;

pub type LocalTypes = HashMap<String, TypeId>;

/// How a statement or block leaves control flow. Ordered so that the
/// strongest kind wins when combining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TerminalKind {
    #[default]
    NonTerminal,
    BreakOrContinue,
    Return,
}

impl TerminalKind {
    pub fn is_terminal(self) -> bool {
        self != TerminalKind::NonTerminal
    }
}

/// The refinement a condition implies for the names it tests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NarrowingEffect {
    #[default]
    NoEffect,
    /// `name` is `inst` when the condition holds and `rev` when it does not;
    /// `prev` is what it was before the test.
    IsInstance {
        name: String,
        prev: TypeId,
        inst: TypeId,
        rev: TypeId,
    },
    And(Vec<NarrowingEffect>),
    Or(Vec<NarrowingEffect>),
}

impl NarrowingEffect {
    pub fn is_instance(name: impl Into<String>, prev: TypeId, inst: TypeId, rev: TypeId) -> Self {
        NarrowingEffect::IsInstance {
            name: name.into(),
            prev,
            inst,
            rev,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NarrowingEffect::NoEffect)
    }

    pub fn apply(&self, locals: &mut LocalTypes) {
        match self {
            NarrowingEffect::NoEffect | NarrowingEffect::Or(_) => {}
            NarrowingEffect::IsInstance { name, inst, .. } => {
                trace!(name = name.as_str(), inst = inst.0, "narrowed");
                locals.insert(name.clone(), *inst);
            }
            NarrowingEffect::And(effects) => {
                for effect in effects {
                    effect.apply(locals);
                }
            }
        }
    }

    pub fn undo(&self, locals: &mut LocalTypes) {
        match self {
            NarrowingEffect::NoEffect | NarrowingEffect::Or(_) => {}
            NarrowingEffect::IsInstance { name, prev, .. } => {
                locals.insert(name.clone(), *prev);
            }
            NarrowingEffect::And(effects) => {
                for effect in effects.iter().rev() {
                    effect.undo(locals);
                }
            }
        }
    }

    /// The effect of the negated condition.
    pub fn reverse(&self) -> NarrowingEffect {
        match self {
            NarrowingEffect::NoEffect => NarrowingEffect::NoEffect,
            NarrowingEffect::IsInstance {
                name,
                prev,
                inst,
                rev,
            } => NarrowingEffect::IsInstance {
                name: name.clone(),
                prev: *prev,
                inst: *rev,
                rev: *inst,
            },
            // not (a and b) tells nothing about either operand alone.
            NarrowingEffect::And(_) => NarrowingEffect::NoEffect,
            NarrowingEffect::Or(effects) => {
                NarrowingEffect::And(effects.iter().map(NarrowingEffect::reverse).collect())
            }
        }
    }

    /// Combines the operand effects of `a and b and ...`.
    pub fn and(effects: Vec<NarrowingEffect>) -> NarrowingEffect {
        let mut effects: Vec<_> = effects.into_iter().filter(|e| !e.is_empty()).collect();
        match effects.len() {
            0 => NarrowingEffect::NoEffect,
            1 => effects.remove(0),
            _ => NarrowingEffect::And(effects),
        }
    }

    /// Combines the operand effects of `a or b or ...`. When every operand
    /// narrows the same name the result narrows it to the union of the
    /// branches.
    pub fn or(ctx: &mut TypeContext, effects: Vec<NarrowingEffect>) -> NarrowingEffect {
        if effects.is_empty() || effects.iter().any(NarrowingEffect::is_empty) {
            return NarrowingEffect::NoEffect;
        }
        let Some((name, prev, insts, revs)) = same_name_parts(&effects) else {
            return NarrowingEffect::Or(effects);
        };
        let inst = ctx.widen(&insts);
        // None of the alternatives held: keep what every negation leaves behind.
        let survivors: Vec<TypeId> = ctx
            .arena
            .union_members(revs[0])
            .into_iter()
            .filter(|member| revs[1..].iter().all(|rev| ctx.arena.is_subclass_of(*member, *rev)))
            .collect();
        let rev = if survivors.is_empty() {
            prev
        } else {
            ctx.widen(&survivors)
        };
        NarrowingEffect::is_instance(name, prev, inst, rev)
    }

    /// Names and narrowed types this effect would install.
    pub fn narrowed_names(&self) -> Vec<(&str, TypeId)> {
        match self {
            NarrowingEffect::IsInstance { name, inst, .. } => vec![(name.as_str(), *inst)],
            NarrowingEffect::And(effects) => {
                effects.iter().flat_map(|e| e.narrowed_names()).collect()
            }
            _ => Vec::new(),
        }
    }
}

type SameNameParts = (String, TypeId, Vec<TypeId>, Vec<TypeId>);

fn same_name_parts(effects: &[NarrowingEffect]) -> Option<SameNameParts> {
    let mut target: Option<(&str, TypeId)> = None;
    let mut insts = Vec::new();
    let mut revs = Vec::new();
    for effect in effects {
        let NarrowingEffect::IsInstance {
            name,
            prev,
            inst,
            rev,
        } = effect
        else {
            return None;
        };
        match target {
            Some((existing, _)) if existing != name => return None,
            Some(_) => {}
            None => target = Some((name, *prev)),
        }
        insts.push(*inst);
        revs.push(*rev);
    }
    let (name, prev) = target?;
    Some((name.to_string(), prev, insts, revs))
}

/// A snapshot of the local types at a branch point.
#[derive(Debug, Clone)]
pub struct LocalsBranch {
    entry: LocalTypes,
}

impl LocalsBranch {
    pub fn capture(locals: &LocalTypes) -> Self {
        Self {
            entry: locals.clone(),
        }
    }

    pub fn entry(&self) -> &LocalTypes {
        &self.entry
    }

    pub fn restore(&self, locals: &mut LocalTypes) {
        locals.clone_from(&self.entry);
    }

    /// Joins the states reached at the end of each branch. Branches that
    /// terminate do not flow past the join and are left out. A name bound in
    /// only some branches keeps its entry type alongside the branch types.
    pub fn merge(
        &self,
        ctx: &mut TypeContext,
        branches: &[(LocalTypes, TerminalKind)],
    ) -> LocalTypes {
        let live: Vec<&LocalTypes> = branches
            .iter()
            .filter(|(_, terminal)| !terminal.is_terminal())
            .map(|(locals, _)| locals)
            .collect();
        match live.as_slice() {
            [] => self.entry.clone(),
            [single] => (*single).clone(),
            _ => {
                let mut names: Vec<&String> =
                    live.iter().flat_map(|locals| locals.keys()).collect();
                names.sort();
                names.dedup();
                let mut merged = LocalTypes::new();
                for name in names {
                    let mut types: Vec<TypeId> = live
                        .iter()
                        .filter_map(|locals| locals.get(name).or_else(|| self.entry.get(name)))
                        .copied()
                        .collect();
                    types.sort();
                    types.dedup();
                    merged.insert(name.clone(), ctx.widen(&types));
                }
                merged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_swaps_branch_types() {
        let effect = NarrowingEffect::is_instance("x", TypeId::DYNAMIC, TypeId::INT, TypeId::STR);
        let mut locals = LocalTypes::new();
        effect.reverse().apply(&mut locals);
        assert_eq!(locals.get("x"), Some(&TypeId::STR));
        effect.apply(&mut locals);
        assert_eq!(locals.get("x"), Some(&TypeId::INT));
        effect.undo(&mut locals);
        assert_eq!(locals.get("x"), Some(&TypeId::DYNAMIC));
    }

    #[test]
    fn merge_joins_live_branches() {
        let mut ctx = TypeContext::new();
        let mut entry = LocalTypes::new();
        entry.insert("x".into(), TypeId::DYNAMIC);
        let branch = LocalsBranch::capture(&entry);

        let mut left = entry.clone();
        left.insert("y".into(), TypeId::INT);
        let mut right = entry.clone();
        right.insert("y".into(), TypeId::STR);
        let merged = branch.merge(
            &mut ctx,
            &[
                (left.clone(), TerminalKind::NonTerminal),
                (right, TerminalKind::NonTerminal),
            ],
        );
        let y = merged["y"];
        assert_eq!(ctx.arena.describe(y), "Union[int, str]");

        let mut returning = entry.clone();
        returning.insert("y".into(), TypeId::STR);
        let merged = branch.merge(
            &mut ctx,
            &[(left, TerminalKind::NonTerminal), (returning, TerminalKind::Return)],
        );
        assert_eq!(merged["y"], TypeId::INT);
    }

    #[test]
    fn terminal_kinds_are_ordered() {
        assert!(TerminalKind::NonTerminal < TerminalKind::BreakOrContinue);
        assert!(TerminalKind::BreakOrContinue < TerminalKind::Return);
    }
}
