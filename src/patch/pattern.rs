//! Instruction predicates used to locate patch sites.
//!
//! A pattern is a slice of [`Predicate`]s matched against a contiguous run of
//! instructions. Predicates receive the [`MemberTable`] so that token operands can be
//! compared by member name instead of raw token value; a token that does not resolve simply
//! fails to match.

use crate::{
    assembly::{InstrId, Instruction, MethodBody, OpCode},
    metadata::MemberTable,
};

/// A test applied to a single instruction.
pub type Predicate = Box<dyn Fn(&Instruction, &MemberTable) -> bool + Send + Sync>;

/// Matches any instruction with the given opcode.
#[must_use]
pub fn match_opcode(opcode: OpCode) -> Predicate {
    Box::new(move |instr, _| instr.opcode == opcode)
}

/// Matches a load of argument `index`, in any encoding.
#[must_use]
pub fn match_ldarg(index: u16) -> Predicate {
    Box::new(move |instr, _| {
        matches!(
            instr.opcode,
            OpCode::Ldarg0 | OpCode::Ldarg1 | OpCode::Ldarg2 | OpCode::Ldarg3 | OpCode::LdargS
        ) && instr.argument_index() == Some(index)
    })
}

/// Matches a load of local `index`, in any encoding.
#[must_use]
pub fn match_ldloc(index: u16) -> Predicate {
    Box::new(move |instr, _| {
        matches!(
            instr.opcode,
            OpCode::Ldloc0 | OpCode::Ldloc1 | OpCode::Ldloc2 | OpCode::Ldloc3 | OpCode::LdlocS
        ) && instr.local_index() == Some(index)
    })
}

/// Matches an integer constant push of `value`, in any encoding.
#[must_use]
pub fn match_ldc_i4(value: i32) -> Predicate {
    Box::new(move |instr, _| instr.constant_i32() == Some(value))
}

/// Matches `ldfld declaring_type::name`.
#[must_use]
pub fn match_ldfld(declaring_type: &str, name: &str) -> Predicate {
    field_access(OpCode::Ldfld, declaring_type, name)
}

/// Matches `stfld declaring_type::name`.
#[must_use]
pub fn match_stfld(declaring_type: &str, name: &str) -> Predicate {
    field_access(OpCode::Stfld, declaring_type, name)
}

/// Matches `call declaring_type::name`.
#[must_use]
pub fn match_call(declaring_type: &str, name: &str) -> Predicate {
    method_call(OpCode::Call, declaring_type, name)
}

/// Matches `callvirt declaring_type::name`.
#[must_use]
pub fn match_callvirt(declaring_type: &str, name: &str) -> Predicate {
    method_call(OpCode::Callvirt, declaring_type, name)
}

/// Matches a `callvirt` to any method whose name contains `fragment`.
#[must_use]
pub fn match_callvirt_containing(fragment: &str) -> Predicate {
    let fragment = fragment.to_string();
    Box::new(move |instr, members| {
        instr.opcode == OpCode::Callvirt
            && instr
                .token()
                .and_then(|token| members.method(token).ok())
                .is_some_and(|method| method.name().contains(&fragment))
    })
}

/// Wraps a plain closure that does not need member resolution.
pub fn matching<F>(f: F) -> Predicate
where
    F: Fn(&Instruction) -> bool + Send + Sync + 'static,
{
    Box::new(move |instr, _| f(instr))
}

fn field_access(opcode: OpCode, declaring_type: &str, name: &str) -> Predicate {
    let (declaring_type, name) = (declaring_type.to_string(), name.to_string());
    Box::new(move |instr, members| {
        instr.opcode == opcode
            && instr
                .token()
                .and_then(|token| members.field(token).ok())
                .is_some_and(|field| field.declaring_type() == declaring_type && field.name() == name)
    })
}

fn method_call(opcode: OpCode, declaring_type: &str, name: &str) -> Predicate {
    let (declaring_type, name) = (declaring_type.to_string(), name.to_string());
    Box::new(move |instr, members| {
        instr.opcode == opcode
            && instr
                .token()
                .and_then(|token| members.method(token).ok())
                .is_some_and(|method| {
                    method.declaring_type() == declaring_type && method.name() == name
                })
    })
}

/// Whether `pattern` matches the instructions starting at `start`.
pub(crate) fn matches_at(
    body: &MethodBody,
    start: usize,
    pattern: &[Predicate],
    members: &MemberTable,
) -> bool {
    let Some(window) = body.instructions().get(start..start + pattern.len()) else {
        return false;
    };
    window
        .iter()
        .zip(pattern)
        .all(|(instr, predicate)| predicate(instr, members))
}

/// First match at or after `from`, skipping a match that starts at `skip`.
pub(crate) fn find_forward(
    body: &MethodBody,
    from: usize,
    pattern: &[Predicate],
    members: &MemberTable,
    skip: Option<InstrId>,
) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > body.len() {
        return None;
    }
    (from..=body.len() - pattern.len()).find(|&start| {
        !starts_at(body, start, skip) && matches_at(body, start, pattern, members)
    })
}

/// Last match starting strictly before `before`, skipping a match that starts at `skip`.
pub(crate) fn find_backward(
    body: &MethodBody,
    before: usize,
    pattern: &[Predicate],
    members: &MemberTable,
    skip: Option<InstrId>,
) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > body.len() {
        return None;
    }
    let last = (body.len() - pattern.len()).min(before.checked_sub(1)?);
    (0..=last).rev().find(|&start| {
        !starts_at(body, start, skip) && matches_at(body, start, pattern, members)
    })
}

fn starts_at(body: &MethodBody, start: usize, skip: Option<InstrId>) -> bool {
    skip.is_some_and(|id| body.get(start).is_some_and(|instr| instr.id() == id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Operand,
        metadata::{FieldRef, MethodSig, TargetMethod, ValueType},
    };

    fn fixture() -> (MethodBody, MemberTable) {
        let members = MemberTable::new();
        let timer = members.intern_field(&FieldRef::new(
            "Celeste.Player",
            "jumpGraceTimer",
            ValueType::F32,
        ));
        let wall = members.intern_method(&TargetMethod::new(
            "Celeste.Player",
            "WallJumpCheck",
            MethodSig::instance(vec![ValueType::I32], Some(ValueType::Bool)),
        ));

        let body = MethodBody::from_instructions(vec![
            Instruction::simple(OpCode::Ldarg0),
            Instruction::new(OpCode::Ldfld, Operand::Token(timer)),
            Instruction::simple(OpCode::Pop),
            Instruction::simple(OpCode::Ldarg0),
            Instruction::simple(OpCode::LdcI4_1),
            Instruction::new(OpCode::Callvirt, Operand::Token(wall)),
            Instruction::simple(OpCode::Ret),
        ])
        .unwrap();
        (body, members)
    }

    #[test]
    fn member_predicates_resolve_tokens() {
        let (body, members) = fixture();
        let timer = match_ldfld("Celeste.Player", "jumpGraceTimer");
        let other = match_ldfld("Celeste.Player", "moveX");
        assert!(timer(body.get(1).unwrap(), &members));
        assert!(!other(body.get(1).unwrap(), &members));

        let exact = match_callvirt("Celeste.Player", "WallJumpCheck");
        let partial = match_callvirt_containing("WallJump");
        assert!(exact(body.get(5).unwrap(), &members));
        assert!(partial(body.get(5).unwrap(), &members));
        assert!(!match_call("Celeste.Player", "WallJumpCheck")(body.get(5).unwrap(), &members));
    }

    #[test]
    fn unresolved_tokens_do_not_match() {
        let members = MemberTable::new();
        let instr = Instruction::new(OpCode::Ldfld, Operand::Token(crate::metadata::Token(0x0400_0009)));
        assert!(!match_ldfld("Celeste.Player", "jumpGraceTimer")(&instr, &members));
    }

    #[test]
    fn forward_and_backward_search() {
        let (body, members) = fixture();
        let pattern = [match_ldarg(0), match_ldfld("Celeste.Player", "jumpGraceTimer")];
        assert_eq!(find_forward(&body, 0, &pattern, &members, None), Some(0));
        assert_eq!(find_forward(&body, 1, &pattern, &members, None), None);

        let load_self = [match_ldarg(0)];
        assert_eq!(find_forward(&body, 1, &load_self, &members, None), Some(3));
        assert_eq!(find_backward(&body, 3, &load_self, &members, None), Some(0));
        assert_eq!(find_backward(&body, 0, &load_self, &members, None), None);
    }

    #[test]
    fn search_skips_last_match() {
        let (body, members) = fixture();
        let load_self = [match_ldarg(0)];
        let first = body.get(0).unwrap().id();
        assert_eq!(find_forward(&body, 0, &load_self, &members, Some(first)), Some(3));
    }

    #[test]
    fn closures_and_constants() {
        let (body, members) = fixture();
        let pattern = [match_ldc_i4(1), matching(|i| i.opcode == OpCode::Callvirt)];
        assert_eq!(find_forward(&body, 0, &pattern, &members, None), Some(4));
        assert!(find_forward(&body, 0, &[], &members, None).is_none());
    }
}
