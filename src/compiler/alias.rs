//! Static alias checks
//!
//! Both checks compare names only. Shadowing is not resolved, so two distinct
//! bindings that share a name are treated as the same binding.

use rustc_hash::FxHashSet;

use super::identifiers::Identifiers;
use crate::ast::{AssignmentTarget, Expression};
use crate::value::JsString;

/// Whether `value` references any name that `target` mentions.
///
/// The target side includes the names its address computation reads (`o` in
/// `o.x = ...`), since the value may rebind them before the store.
pub fn has_alias_hazard(target: &AssignmentTarget, value: &Expression) -> bool {
    let target_names: FxHashSet<&JsString> =
        Identifiers::of_target(target).map(|u| u.name).collect();
    if target_names.is_empty() {
        return false;
    }
    Identifiers::of_expression(value).any(|u| target_names.contains(u.name))
}

/// Whether `left` and `right` may both read local variables in place.
///
/// False when a name written on either side is referenced on the other, since the
/// write could land between the read and its use.
pub fn can_use_direct_register(left: &Expression, right: &Expression) -> bool {
    let left_written = written_names(left);
    let right_written = written_names(right);
    if left_written.is_empty() && right_written.is_empty() {
        return true;
    }

    let left_conflicts = Identifiers::of_expression(left).any(|u| right_written.contains(u.name));
    let right_conflicts = Identifiers::of_expression(right).any(|u| left_written.contains(u.name));
    !(left_conflicts || right_conflicts)
}

fn written_names(expr: &Expression) -> FxHashSet<&JsString> {
    Identifiers::of_expression(expr)
        .filter(|u| u.is_write())
        .map(|u| u.name)
        .collect()
}
