//! Flattens a function's [`crate::regalloc::FrameInfo`] into the
//! label/offsets pairs `asm_printer` needs to emit `__stackMap` (spec §4.9,
//! §6 "`__stackMap`: `dq nEntries; { dq labelAddr; dq nSlots; dq offset₁; … }`").

use crate::regalloc::FrameInfo;

/// One `__stackMap` row: the call-site label whose return address this
/// entry covers, and the `rbp`-relative offsets live across it that hold a
/// reference.
pub struct Entry {
  pub label: String,
  pub offsets: Vec<i32>,
}

/// The call-site label `asm_printer` places immediately after a `call`
/// instruction, matching the one [`entries`] indexes the stack map by.
#[must_use] pub fn call_site_label(function_name: &str, call_id: u32) -> String {
  format!("{function_name}.CS{call_id}")
}

#[must_use] pub fn entries(function_name: &str, frame: &FrameInfo) -> Vec<Entry> {
  frame.stack_map.iter()
    .map(|e| Entry { label: call_site_label(function_name, e.call_id), offsets: e.offsets.clone() })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::regalloc::stack::StackMapEntry;

  #[test]
  fn label_matches_call_site_naming() {
    assert_eq!(call_site_label("main", 3), "main.CS3");
  }

  #[test]
  fn entries_carry_over_offsets() {
    let frame = FrameInfo { frame_size: 16, stack_map: vec![StackMapEntry { call_id: 0, offsets: vec![-8, -16] }] };
    let rows = entries("f", &frame);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].label, "f.CS0");
    assert_eq!(rows[0].offsets, vec![-8, -16]);
  }
}
